//! Session routing.
//!
//! Most calls go through the client's default session. Calls made on behalf of
//! a business connection must instead travel through a session to the data
//! center that serves that connection, wrapped in an envelope naming it.
//!
//! [`SessionRouter`] keeps two process-wide caches for this:
//! * connection id → [`ConnectionBinding`]
//! * data-center id → pooled session
//!
//! Both are filled on first use with at most one fetch or creation in flight
//! per key. Callers that overlap a failing fetch all receive that one failure;
//! nothing failed is cached. Both are emptied by [`SessionRouter::shutdown`].

use std::sync::Arc;

use crate::cache::SingleFlight;
use crate::{ConnectionDirectory, DispatchError, RpcRequest, RpcTransport, SharedError};

// ─── ConnectionBinding ────────────────────────────────────────────────────────

/// Which data center serves a business connection.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionBinding {
    pub connection_id: String,
    pub dc_id:         i32,
}

// ─── Route ────────────────────────────────────────────────────────────────────

/// The session a call must be submitted through.
pub struct Route<S> {
    pub session: Arc<S>,
    /// Data center of a connection-bound session; `None` for the default one.
    pub dc_id:   Option<i32>,
}

impl<S> Clone for Route<S> {
    fn clone(&self) -> Self {
        Self { session: Arc::clone(&self.session), dc_id: self.dc_id }
    }
}

impl<S> std::fmt::Debug for Route<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.dc_id {
            Some(dc) => write!(f, "Route(DC{dc})"),
            None     => f.write_str("Route(default)"),
        }
    }
}

// ─── SessionRouter ────────────────────────────────────────────────────────────

/// Picks the session for each call.
pub struct SessionRouter<B: RpcTransport> {
    backend:         Arc<B>,
    default_session: Arc<B::Session>,
    bindings:        SingleFlight<String, ConnectionBinding, SharedError>,
    sessions:        SingleFlight<i32, Arc<B::Session>, SharedError>,
}

impl<B: RpcTransport + ConnectionDirectory> SessionRouter<B> {
    pub fn new(backend: Arc<B>, default_session: Arc<B::Session>) -> Self {
        Self {
            backend,
            default_session,
            bindings: SingleFlight::default(),
            sessions: SingleFlight::default(),
        }
    }

    /// Choose the session for `request`, wrapping it when `connection_id` is set.
    pub async fn route(
        &self,
        request:       RpcRequest<B::Query>,
        connection_id: Option<&str>,
    ) -> Result<(Route<B::Session>, RpcRequest<B::Query>), DispatchError> {
        let Some(connection_id) = connection_id else {
            let route = Route { session: Arc::clone(&self.default_session), dc_id: None };
            return Ok((route, request));
        };

        let binding = self.binding(connection_id).await?;
        let session = self.session(binding.dc_id).await?;
        let route = Route { session, dc_id: Some(binding.dc_id) };
        Ok((route, request.on_behalf_of(connection_id)))
    }

    /// The binding for `connection_id`, fetched on first use.
    pub async fn binding(&self, connection_id: &str) -> Result<ConnectionBinding, DispatchError> {
        self.bindings.get_or_try_init(connection_id, || async {
            let binding = self.backend.fetch_connection_binding(connection_id).await?;
            tracing::info!("[layer-dispatch] Connection {connection_id:?} is served by DC{}", binding.dc_id);
            Ok::<_, SharedError>(binding)
        }).await
        .map_err(|source| DispatchError::ConnectionResolution {
            connection_id: connection_id.to_string(),
            source,
        })
    }

    /// The pooled session for `dc_id`, created on first use.
    pub async fn session(&self, dc_id: i32) -> Result<Arc<B::Session>, DispatchError> {
        self.sessions.get_or_try_init(&dc_id, || async {
            let session = self.backend.create_session(dc_id).await?;
            tracing::info!("[layer-dispatch] Session to DC{dc_id} ready");
            Ok::<_, SharedError>(Arc::new(session))
        }).await
        .map_err(|source| DispatchError::Transport { dc_id, source })
    }

    /// The cached binding for `connection_id`, without fetching.
    pub async fn cached_binding(&self, connection_id: &str) -> Option<ConnectionBinding> {
        self.bindings.get(connection_id).await
    }

    pub fn default_session(&self) -> &Arc<B::Session> {
        &self.default_session
    }

    /// Evict a binding so the next call for it fetches a fresh one.
    pub async fn forget_connection(&self, connection_id: &str) -> Option<ConnectionBinding> {
        let evicted = self.bindings.remove(connection_id).await;
        if evicted.is_some() {
            tracing::debug!("[layer-dispatch] Forgot binding for connection {connection_id:?}");
        }
        evicted
    }

    pub async fn cached_bindings(&self) -> usize {
        self.bindings.len().await
    }

    pub async fn cached_sessions(&self) -> usize {
        self.sessions.len().await
    }

    /// Empty both caches and close every pooled session.
    ///
    /// Sessions still being created are awaited and closed as well. The default
    /// session belongs to the caller and is left open.
    pub async fn shutdown(&self) {
        self.bindings.drain().await;
        let sessions = self.sessions.drain().await;
        let count = sessions.len();
        for session in sessions {
            self.backend.close_session(&session).await;
        }
        tracing::info!("[layer-dispatch] Router shut down ({count} pooled sessions closed)");
    }
}
