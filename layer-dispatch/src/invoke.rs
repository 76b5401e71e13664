//! Request submission and the missing-part retry loop.
//!
//! Per call: `Sending → Done`, or `Sending → Resending(idx) → Sending` when the
//! server reports part `idx` of the attached upload missing, or `→ Failed` on
//! any other error. At most `parts_total` re-sends are made for one call.

use crate::{ChunkedUploader, DispatchError, Route, RpcResponse, RpcTransport, UploadBackend};

// ─── RpcRequest ───────────────────────────────────────────────────────────────

/// How the payload is presented to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope<Q> {
    Direct(Q),
    /// Executed on behalf of a business connection.
    BusinessConnection { connection_id: String, query: Q },
}

/// A request plus the id that makes resubmission idempotent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcRequest<Q> {
    pub payload:        Envelope<Q>,
    pub correlation_id: i64,
}

impl<Q> RpcRequest<Q> {
    /// Wrap `query` with a fresh random correlation id.
    pub fn new(query: Q) -> Result<Self, DispatchError> {
        Ok(Self::with_correlation_id(query, crate::random_i64()?))
    }

    pub fn with_correlation_id(query: Q, correlation_id: i64) -> Self {
        Self { payload: Envelope::Direct(query), correlation_id }
    }

    pub fn query(&self) -> &Q {
        match &self.payload {
            Envelope::Direct(q) | Envelope::BusinessConnection { query: q, .. } => q,
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        match &self.payload {
            Envelope::BusinessConnection { connection_id, .. } => Some(connection_id),
            Envelope::Direct(_) => None,
        }
    }

    /// Tag the payload with `connection_id`; the correlation id is kept.
    pub fn on_behalf_of(self, connection_id: &str) -> Self {
        let query = match self.payload {
            Envelope::Direct(q) | Envelope::BusinessConnection { query: q, .. } => q,
        };
        Self {
            payload: Envelope::BusinessConnection { connection_id: connection_id.to_string(), query },
            correlation_id: self.correlation_id,
        }
    }
}

// ─── RpcInvoker ───────────────────────────────────────────────────────────────

/// Submits requests through a routed session.
pub struct RpcInvoker<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: RpcTransport + ?Sized> RpcInvoker<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Submit `request`, re-sending missing parts of `upload` as the server asks.
    ///
    /// The same request, correlation id included, is resubmitted after each
    /// re-send. A missing part is only recoverable when `upload` holds a
    /// completed file and the index is in range; otherwise the server error is
    /// returned unchanged.
    pub async fn invoke<U: UploadBackend + ?Sized>(
        &self,
        request: &RpcRequest<B::Query>,
        route:   &Route<B::Session>,
        upload:  Option<&ChunkedUploader<'_, U>>,
    ) -> Result<RpcResponse, DispatchError> {
        let mut resends: u32 = 0;
        loop {
            tracing::debug!(
                "[layer-dispatch] Submitting request {:#018x} via {route:?} (re-sends so far: {resends})",
                request.correlation_id
            );
            let err = match self.backend.invoke_raw(&route.session, request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let Some(index) = err.missing_part() else { return Err(err.into()) };
            let Some((uploader, handle)) = upload.and_then(|u| u.handle().map(|h| (u, h))) else {
                return Err(err.into());
            };
            if index >= handle.parts_total {
                return Err(err.into());
            }
            if resends >= handle.parts_total {
                return Err(DispatchError::RetryExhausted {
                    file_id:   handle.id,
                    retries:   resends,
                    last_part: index,
                });
            }

            resends += 1;
            uploader.resend_part(handle.id, index).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_keeps_correlation_id() {
        let req = RpcRequest::with_correlation_id("getMe", 77).on_behalf_of("biz-1");
        assert_eq!(req.correlation_id, 77);
        assert_eq!(req.connection_id(), Some("biz-1"));
        assert_eq!(*req.query(), "getMe");

        let rewrapped = req.on_behalf_of("biz-2");
        assert_eq!(rewrapped.payload, Envelope::BusinessConnection { connection_id: "biz-2".into(), query: "getMe" });
    }

    #[test]
    fn fresh_requests_are_direct() {
        let req = RpcRequest::new(1u8).unwrap();
        assert_eq!(req.payload, Envelope::Direct(1));
        assert_eq!(req.connection_id(), None);
    }
}
