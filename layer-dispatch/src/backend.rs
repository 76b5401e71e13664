//! Contracts for the collaborators the dispatcher drives.
//!
//! The wire codec, transport encryption, peer resolution and the generated
//! request schema live outside this crate. They are plugged in through the
//! traits below; a single type implementing all of them is a [`Backend`].
//!
//! Async methods return `impl Future + Send`, so implementors may simply write
//! `async fn` and the dispatcher stays usable from a multi-threaded runtime.

use std::future::Future;

use crate::{BoxError, ConnectionBinding, FilePart, ProtocolError, RpcRequest, RpcResponse};

// ─── Peers ────────────────────────────────────────────────────────────────────

/// A chat as the server addresses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Peer {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl Peer {
    /// The bare numeric id.
    pub fn id(&self) -> i64 {
        match *self {
            Self::User(id) | Self::Chat(id) | Self::Channel(id) => id,
        }
    }
}

/// A resolved, addressable peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerRef {
    pub peer:        Peer,
    pub access_hash: i64,
}

/// What the caller used to name the target chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatTarget {
    /// The logged-in account ("me" / "self").
    Me,
    Id(i64),
    /// A username or phone number.
    Username(String),
}

impl From<i64> for ChatTarget {
    fn from(id: i64) -> Self { Self::Id(id) }
}

impl From<&str> for ChatTarget {
    fn from(s: &str) -> Self {
        match s {
            "me" | "self" => Self::Me,
            other => Self::Username(other.trim_start_matches('@').to_string()),
        }
    }
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Me          => f.write_str("me"),
            Self::Id(id)      => write!(f, "{id}"),
            Self::Username(u) => write!(f, "@{u}"),
        }
    }
}

// ─── Traits ───────────────────────────────────────────────────────────────────

/// Maps a chat identifier to a peer.
pub trait PeerResolver: Send + Sync + 'static {
    fn resolve_peer(&self, target: &ChatTarget)
        -> impl Future<Output = Result<PeerRef, BoxError>> + Send;
}

/// Submits requests over an established session and opens new sessions.
pub trait RpcTransport: Send + Sync + 'static {
    /// An open transport session bound to one data center.
    type Session: Send + Sync + 'static;
    /// A request built from the generated schema.
    type Query: Clone + Send + Sync + 'static;

    fn invoke_raw(&self, session: &Self::Session, request: &RpcRequest<Self::Query>)
        -> impl Future<Output = Result<RpcResponse, ProtocolError>> + Send;

    /// Open an authorized session to `dc_id`.
    fn create_session(&self, dc_id: i32)
        -> impl Future<Output = Result<Self::Session, BoxError>> + Send;

    /// Called once per pooled session on [`crate::Dispatcher::shutdown`].
    fn close_session(&self, session: &Self::Session) -> impl Future<Output = ()> + Send {
        let _ = session;
        async {}
    }
}

/// Looks up which data center serves a business connection.
pub trait ConnectionDirectory: Send + Sync + 'static {
    fn fetch_connection_binding(&self, connection_id: &str)
        -> impl Future<Output = Result<ConnectionBinding, BoxError>> + Send;
}

/// Accepts uploaded file chunks.
pub trait UploadBackend: Send + Sync + 'static {
    fn send_chunk(&self, part: &FilePart)
        -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Everything a [`crate::Dispatcher`] needs.
pub trait Backend: PeerResolver + RpcTransport + ConnectionDirectory + UploadBackend {}

impl<T> Backend for T where T: PeerResolver + RpcTransport + ConnectionDirectory + UploadBackend {}
