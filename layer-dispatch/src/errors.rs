//! Error types for layer-dispatch.
//!
//! Every fallible operation in the dispatch pipeline returns [`DispatchError`].
//! Server-side rejections are carried verbatim as a [`ProtocolError`], which in
//! turn wraps the parsed [`RpcError`].
//!
//! A cooperatively aborted upload is **not** an error: it surfaces as
//! [`crate::UploadOutcome::Aborted`] and, at the [`crate::Dispatcher`] level, as
//! `Ok(None)`.

use std::sync::Arc;
use std::{fmt, io};

/// Boxed error returned by external collaborators (transport, directory, …).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A collaborator error handed to every caller that waited on the same fetch.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error returned by the server in response to an RPC call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `FLOOD_WAIT_30`       → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`
/// `FILE_PART_3_MISSING` → `RpcError { code: 400, name: "FILE_PART_MISSING", value: Some(3) }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with the numeric segment removed.
    pub name: String,
    /// Numeric segment extracted from the name, if any.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw server error message like `"FILE_PART_3_MISSING"`.
    ///
    /// Only the first all-digit segment is extracted; later ones stay in the name.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        let mut value = None;
        let mut segments = Vec::new();
        for segment in message.split('_') {
            if value.is_none() && !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = segment.parse::<u32>() {
                    value = Some(v);
                    continue;
                }
            }
            segments.push(segment);
        }
        Self { code, name: segments.join("_"), value }
    }

    /// Match on the error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("FLOOD_WAIT")`: exact match
    /// - `err.is("FILE_PART_*")`: starts-with match
    /// - `err.is("*_INVALID")`: ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// Returns the flood-wait duration in seconds, if this is a FLOOD_WAIT error.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value.map(|v| v as u64)
        } else {
            None
        }
    }
}

// ─── ProtocolError ────────────────────────────────────────────────────────────

/// What the server objected to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The server is missing one chunk of an uploaded file (zero-based index).
    PartMissing(u32),
    /// Any other rejection.
    Rpc(RpcError),
}

/// A server-rejected call, as reported by [`crate::RpcTransport::invoke_raw`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolError {
    pub kind:      ProtocolErrorKind,
    /// `true` when repeating the call may succeed.
    pub retryable: bool,
}

impl ProtocolError {
    /// The missing-chunk condition for part `index`.
    pub fn part_missing(index: u32) -> Self {
        Self { kind: ProtocolErrorKind::PartMissing(index), retryable: true }
    }

    /// Classify a parsed server error.
    pub fn from_rpc(err: RpcError) -> Self {
        if err.name == "FILE_PART_MISSING" {
            if let Some(index) = err.value {
                return Self::part_missing(index);
            }
        }
        let retryable = err.flood_wait_seconds().is_some() || err.code >= 500;
        Self { kind: ProtocolErrorKind::Rpc(err), retryable }
    }

    /// Index of the missing part, if this is the recoverable missing-chunk case.
    pub fn missing_part(&self) -> Option<u32> {
        match self.kind {
            ProtocolErrorKind::PartMissing(index) if self.retryable => Some(index),
            _ => None,
        }
    }

    /// See [`RpcError::is`]. A missing part matches as `FILE_PART_MISSING`.
    pub fn is(&self, pattern: &str) -> bool {
        match &self.kind {
            ProtocolErrorKind::Rpc(e) => e.is(pattern),
            ProtocolErrorKind::PartMissing(_) => {
                RpcError { code: 400, name: "FILE_PART_MISSING".into(), value: None }.is(pattern)
            }
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProtocolErrorKind::PartMissing(i) => write!(f, "RPC 400: FILE_PART_MISSING (part {i})"),
            ProtocolErrorKind::Rpc(e)         => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<RpcError> for ProtocolError {
    fn from(e: RpcError) -> Self { Self::from_rpc(e) }
}

// ─── DispatchError ────────────────────────────────────────────────────────────

/// The error type returned from every stage of the dispatch pipeline.
#[derive(Debug)]
pub enum DispatchError {
    /// Conflicting or invalid caller arguments, detected before anything is sent.
    Validation(String),
    /// A string was neither a local file, a URL, nor a decodable file reference.
    InvalidReference(String),
    /// A chunk could not be transferred.
    Upload { file_id: i64, part: u32, source: BoxError },
    /// The server kept reporting missing parts past the retry bound.
    RetryExhausted { file_id: i64, retries: u32, last_part: u32 },
    /// The connection binding could not be fetched.
    ConnectionResolution { connection_id: String, source: SharedError },
    /// A session to the given data center could not be created.
    Transport { dc_id: i32, source: SharedError },
    /// The chat identifier could not be mapped to a peer.
    PeerUnresolved { identifier: String, source: BoxError },
    /// The server rejected the call.
    Protocol(ProtocolError),
    /// Local I/O failure (reading the file being uploaded).
    Io(io::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(s)       => write!(f, "invalid arguments: {s}"),
            Self::InvalidReference(s) => write!(f, "invalid media reference: {s}"),
            Self::Upload { file_id, part, source } =>
                write!(f, "upload of part {part} (file {file_id}) failed: {source}"),
            Self::RetryExhausted { file_id, retries, last_part } =>
                write!(f, "file {file_id}: part {last_part} still missing after {retries} re-sends"),
            Self::ConnectionResolution { connection_id, source } =>
                write!(f, "cannot resolve connection {connection_id:?}: {source}"),
            Self::Transport { dc_id, source } =>
                write!(f, "cannot open session to DC{dc_id}: {source}"),
            Self::PeerUnresolved { identifier, source } =>
                write!(f, "cannot resolve peer {identifier:?}: {source}"),
            Self::Protocol(e) => write!(f, "{e}"),
            Self::Io(e)       => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upload { source, .. } | Self::PeerUnresolved { source, .. } => Some(source.as_ref()),
            Self::ConnectionResolution { source, .. } | Self::Transport { source, .. } => Some(source.as_ref()),
            Self::Protocol(e) => Some(e),
            Self::Io(e)       => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DispatchError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<ProtocolError> for DispatchError {
    fn from(e: ProtocolError) -> Self { Self::Protocol(e) }
}

impl From<RpcError> for DispatchError {
    fn from(e: RpcError) -> Self { Self::Protocol(e.into()) }
}

impl DispatchError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Protocol(e) => e.is(pattern),
            _                 => false,
        }
    }

    /// If this is a FLOOD_WAIT error, returns how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Protocol(ProtocolError { kind: ProtocolErrorKind::Rpc(e), .. }) => e.flood_wait_seconds(),
            _ => None,
        }
    }

    /// Whether the caller may reasonably repeat the whole call.
    ///
    /// The core itself never does; only the missing-chunk path is retried here.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Protocol(e) => e.retryable,
            Self::Upload { .. } | Self::Transport { .. } | Self::Io(_) => true,
            _ => false,
        }
    }
}
