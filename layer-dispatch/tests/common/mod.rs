#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use layer_dispatch::{
    BoxError, ChatTarget, ConnectionBinding, ConnectionDirectory, DispatchConfig, Dispatcher,
    FilePart, InputMedia, MessageRecord, Peer, PeerRef, PeerResolver, ProtocolError, RpcRequest,
    RpcResponse, RpcTransport, UpdateRecord, UploadBackend, UserRecord,
};

pub const ME: i64 = 1000;
pub const DEFAULT_DC: i32 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    SendMedia { peer: PeerRef, media: InputMedia },
    SendText  { peer: PeerRef, text: String },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    pub id:    usize,
    pub dc_id: i32,
}

/// In-memory backend that records everything the dispatcher does.
#[derive(Default)]
pub struct MockBackend {
    pub chunks:           Mutex<Vec<FilePart>>,
    /// (session id, request) per submission.
    pub submitted:        Mutex<Vec<(usize, RpcRequest<Query>)>>,
    /// Scripted results; an empty queue answers with an empty response.
    pub replies:          Mutex<VecDeque<Result<RpcResponse, ProtocolError>>>,
    pub bindings:         HashMap<String, i32>,
    pub binding_fetches:  AtomicUsize,
    pub fetch_delay:      Duration,
    pub failing_dcs:      Vec<i32>,
    pub session_delay:    Duration,
    /// Every `create_session` call, failed ones included.
    pub session_attempts: AtomicUsize,
    pub sessions_created: AtomicUsize,
    pub sessions_closed:  AtomicUsize,
    pub chunk_delay:      Duration,
    /// 1-based `send_chunk` call that fails.
    pub fail_on_send:     Option<usize>,
    pub chunk_calls:      AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self { Self::default() }

    pub fn binding(mut self, connection_id: &str, dc_id: i32) -> Self {
        self.bindings.insert(connection_id.to_string(), dc_id); self
    }

    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay; self
    }

    pub fn failing_dc(mut self, dc_id: i32) -> Self {
        self.failing_dcs.push(dc_id); self
    }

    pub fn session_delay(mut self, delay: Duration) -> Self {
        self.session_delay = delay; self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay; self
    }

    pub fn fail_on_send(mut self, call: usize) -> Self {
        self.fail_on_send = Some(call); self
    }

    pub fn reply(self, r: Result<RpcResponse, ProtocolError>) -> Self {
        self.replies.lock().unwrap().push_back(r);
        self
    }

    pub fn chunks(&self) -> Vec<FilePart> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(usize, RpcRequest<Query>)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize { self.binding_fetches.load(Ordering::SeqCst) }

    pub fn session_attempts(&self) -> usize { self.session_attempts.load(Ordering::SeqCst) }

    pub fn created(&self) -> usize { self.sessions_created.load(Ordering::SeqCst) }

    pub fn closed(&self) -> usize { self.sessions_closed.load(Ordering::SeqCst) }
}

impl PeerResolver for MockBackend {
    async fn resolve_peer(&self, target: &ChatTarget) -> Result<PeerRef, BoxError> {
        let peer = match target {
            ChatTarget::Me                => Peer::User(ME),
            ChatTarget::Id(id) if *id < 0 => Peer::Channel(-id),
            ChatTarget::Id(id)            => Peer::User(*id),
            ChatTarget::Username(u)       => return Err(format!("USERNAME_NOT_OCCUPIED: {u}").into()),
        };
        Ok(PeerRef { peer, access_hash: 0 })
    }
}

impl RpcTransport for MockBackend {
    type Session = Session;
    type Query = Query;

    async fn invoke_raw(&self, session: &Session, request: &RpcRequest<Query>) -> Result<RpcResponse, ProtocolError> {
        self.submitted.lock().unwrap().push((session.id, request.clone()));
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(RpcResponse::default()))
    }

    async fn create_session(&self, dc_id: i32) -> Result<Session, BoxError> {
        self.session_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.session_delay.is_zero() {
            tokio::time::sleep(self.session_delay).await;
        }
        if self.failing_dcs.contains(&dc_id) {
            return Err(format!("DC{dc_id} unreachable").into());
        }
        let id = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session { id, dc_id })
    }

    async fn close_session(&self, _session: &Session) {
        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConnectionDirectory for MockBackend {
    async fn fetch_connection_binding(&self, connection_id: &str) -> Result<ConnectionBinding, BoxError> {
        self.binding_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        match self.bindings.get(connection_id) {
            Some(&dc_id) => Ok(ConnectionBinding { connection_id: connection_id.to_string(), dc_id }),
            None => Err(format!("BOT_BUSINESS_CONNECTION_INVALID: {connection_id}").into()),
        }
    }
}

impl UploadBackend for MockBackend {
    async fn send_chunk(&self, part: &FilePart) -> Result<(), BoxError> {
        let call = self.chunk_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.chunk_delay.is_zero() {
            tokio::time::sleep(self.chunk_delay).await;
        }
        if self.fail_on_send == Some(call) {
            return Err(format!("FILE_PART_{}_FAILED", part.index).into());
        }
        self.chunks.lock().unwrap().push(part.clone());
        Ok(())
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Dispatcher with 1 KB chunks over `backend`.
pub fn dispatcher(backend: MockBackend) -> Dispatcher<MockBackend> {
    let config = DispatchConfig::default().chunk_size(1024);
    Dispatcher::new(backend, Session { id: 0, dc_id: DEFAULT_DC }, config).unwrap()
}

pub fn me() -> UserRecord {
    UserRecord { id: ME, first_name: "Test".into(), username: Some("tester".into()), ..Default::default() }
}

pub fn record(id: i32, text: &str) -> MessageRecord {
    MessageRecord {
        id,
        peer_id: Peer::User(ME),
        from_id: Some(Peer::User(ME)),
        date:    1_700_000_000,
        message: text.into(),
        out:     true,
    }
}

/// Response carrying one new message sent to the logged-in user.
pub fn sent(id: i32) -> RpcResponse {
    RpcResponse::new(vec![UpdateRecord::NewMessage(record(id, ""))]).with_users([me()])
}

pub fn text_query(peer: PeerRef) -> Query {
    Query::SendText { peer, text: "hello".into() }
}

pub fn media_query(peer: PeerRef, media: InputMedia) -> Query {
    Query::SendMedia { peer, media }
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
