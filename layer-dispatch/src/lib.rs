//! # layer-dispatch
//!
//! The call-dispatch core of the layer client: everything that happens between
//! "a wrapper built a request" and "the caller holds a typed result".
//!
//! ```text
//! media ─► classify ─► ChunkedUploader ─┐
//!                                       ├─► SessionRouter ─► RpcInvoker ─► demux ─► SentMessage
//! query ◄── wrapper builds request ◄────┘        ▲               │
//!                                                │   FILE_PART_X_MISSING → resend_part(x)
//! ```
//!
//! ## Features
//! - Media references classified as local file, URL, file id or in-memory bytes
//! - Chunked uploads with progress reporting and cooperative stop
//! - Targeted re-send of a single part when the server reports it missing,
//!   bounded by the part count
//! - Business-connection routing with process-wide, single-flight caches of
//!   connection bindings and per-DC sessions
//! - Response demultiplexing into [`SentMessage`]
//!
//! The wire codec, encryption and peer resolution are supplied by the caller
//! through the traits in [`backend`].
//!
//! ```rust,no_run
//! use layer_dispatch::{Backend, Dispatcher, DispatchError, FileType, InputMedia, MediaCall, MediaOptions, PeerRef};
//!
//! async fn send_photo<B: Backend>(
//!     dispatcher: &Dispatcher<B>,
//!     build:      impl FnOnce(PeerRef, InputMedia) -> B::Query + Send,
//! ) -> Result<(), DispatchError> {
//!     let call = MediaCall::new("me", "photo.jpg", FileType::Photo)
//!         .options(MediaOptions::default().spoiler(true))
//!         .progress(|p| println!("{} / {}", p.bytes_transferred, p.bytes_total));
//!
//!     match dispatcher.send_media(call, build).await? {
//!         Some(msg) => println!("sent message {}", msg.id),
//!         None      => println!("upload stopped"),
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

mod cache;
mod config;
mod errors;
pub mod backend;
pub mod demux;
pub mod file_id;
pub mod invoke;
pub mod media;
pub mod message;
pub mod reply;
pub mod router;
pub mod update;
pub mod upload;

pub use backend::{Backend, ChatTarget, ConnectionDirectory, Peer, PeerRef, PeerResolver, RpcTransport, UploadBackend};
pub use config::{BIG_FILE_THRESHOLD, DispatchConfig, MAX_CHUNK_SIZE, MAX_FILE_PARTS};
pub use demux::demux;
pub use errors::{BoxError, DispatchError, ProtocolError, ProtocolErrorKind, RpcError, SharedError};
pub use file_id::{FileIdCodec, FileReferenceCodec, FileType, OpaqueReference};
pub use invoke::{Envelope, RpcInvoker, RpcRequest};
pub use media::{InputMedia, InputMediaSource, MediaInput, MediaOptions, MediaSource, VIEW_ONCE_TTL, classify};
pub use message::{Chat, SentMessage, Sender};
pub use reply::ReplyParameters;
pub use router::{ConnectionBinding, Route, SessionRouter};
pub use update::{BusinessMessage, ChatKind, ChatRecord, MessageRecord, RpcResponse, UpdateKind, UpdateRecord, UserRecord};
pub use upload::{ChunkedUploader, FileHandle, FilePart, FileVariant, ProgressFn, UploadOutcome, UploadProgress};

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

// ─── MediaCall ────────────────────────────────────────────────────────────────

/// Everything a media-sending call needs besides the request builder.
///
/// ```rust,no_run
/// use layer_dispatch::{FileType, MediaCall, MediaInput, MediaOptions};
/// use tokio_util::sync::CancellationToken;
///
/// let stop = CancellationToken::new();
/// let call = MediaCall::new(-1001234567890_i64, MediaInput::stream("clip.mp4", vec![0u8; 4096]), FileType::Video)
///     .options(MediaOptions::default().ttl_seconds(30))
///     .business_connection("biz-1")
///     .stop_signal(stop.clone());
/// // Calling `stop.cancel()` from any task stops the upload at the next part.
/// ```
#[derive(Clone)]
pub struct MediaCall {
    pub chat:                   ChatTarget,
    pub media:                  MediaInput,
    pub file_type:              FileType,
    pub options:                MediaOptions,
    pub business_connection_id: Option<String>,
    pub progress:               Option<ProgressFn>,
    pub stop:                   CancellationToken,
}

impl MediaCall {
    pub fn new(chat: impl Into<ChatTarget>, media: impl Into<MediaInput>, file_type: FileType) -> Self {
        Self {
            chat:                   chat.into(),
            media:                  media.into(),
            file_type,
            options:                MediaOptions::default(),
            business_connection_id: None,
            progress:               None,
            stop:                   CancellationToken::new(),
        }
    }

    pub fn options(mut self, options: MediaOptions) -> Self {
        self.options = options; self
    }

    /// Send on behalf of a business connection.
    pub fn business_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.business_connection_id = Some(connection_id.into()); self
    }

    /// Observe upload progress.
    pub fn progress(mut self, f: impl Fn(UploadProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f)); self
    }

    /// Stop the upload when `token` is cancelled.
    pub fn stop_signal(mut self, token: CancellationToken) -> Self {
        self.stop = token; self
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

struct DispatcherInner<B: Backend> {
    backend: Arc<B>,
    router:  SessionRouter<B>,
    config:  DispatchConfig,
    codec:   Box<dyn FileReferenceCodec>,
}

/// Runs calls through the dispatch pipeline. Cheap to clone; internally Arc-wrapped.
///
/// Owns the connection-binding and session caches; they live until
/// [`Dispatcher::shutdown`].
pub struct Dispatcher<B: Backend> {
    inner: Arc<DispatcherInner<B>>,
}

impl<B: Backend> Clone for Dispatcher<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: Backend> Dispatcher<B> {
    /// Create a dispatcher using the standard file id format.
    pub fn new(backend: B, default_session: B::Session, config: DispatchConfig) -> Result<Self, DispatchError> {
        Self::with_codec(backend, default_session, config, FileIdCodec)
    }

    /// Create a dispatcher with a custom file-reference codec.
    pub fn with_codec(
        backend:         B,
        default_session: B::Session,
        config:          DispatchConfig,
        codec:           impl FileReferenceCodec + 'static,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        let backend = Arc::new(backend);
        let router = SessionRouter::new(Arc::clone(&backend), Arc::new(default_session));
        Ok(Self {
            inner: Arc::new(DispatcherInner { backend, router, config, codec: Box::new(codec) }),
        })
    }

    pub fn config(&self) -> &DispatchConfig { &self.inner.config }

    pub fn backend(&self) -> &B { &self.inner.backend }

    pub fn router(&self) -> &SessionRouter<B> { &self.inner.router }

    /// See [`classify`].
    pub fn classify(&self, media: impl Into<MediaInput>, expected: Option<FileType>) -> Result<MediaSource, DispatchError> {
        classify(media.into(), self.inner.codec.as_ref(), expected)
    }

    pub async fn resolve_peer(&self, target: &ChatTarget) -> Result<PeerRef, DispatchError> {
        self.inner.backend.resolve_peer(target).await.map_err(|source| DispatchError::PeerUnresolved {
            identifier: target.to_string(),
            source,
        })
    }

    // ── Raw invoke ─────────────────────────────────────────────────────────

    /// Submit a request without media and return the raw response.
    pub async fn invoke(&self, query: B::Query, connection_id: Option<&str>) -> Result<RpcResponse, DispatchError> {
        let request = RpcRequest::new(query)?;
        let (route, request) = self.inner.router.route(request, connection_id).await?;
        RpcInvoker::new(self.backend())
            .invoke::<B>(&request, &route, None)
            .await
    }

    // ── Message calls ──────────────────────────────────────────────────────

    /// Send a message-producing request that carries no media.
    ///
    /// `build` receives the resolved chat and returns the request.
    pub async fn send<F>(
        &self,
        chat:                   impl Into<ChatTarget>,
        business_connection_id: Option<&str>,
        build:                  F,
    ) -> Result<Option<SentMessage>, DispatchError>
    where
        F: FnOnce(PeerRef) -> B::Query + Send,
    {
        let peer = self.resolve_peer(&chat.into()).await?;
        let response = self.invoke(build(peer), business_connection_id).await?;
        Ok(demux(response, UpdateKind::SENT_MESSAGE, business_connection_id))
    }

    /// Send media: classify, upload if needed, route, submit, demultiplex.
    ///
    /// Returns `Ok(None)` when the upload was stopped through
    /// [`MediaCall::stop_signal`], or when the server produced no message update.
    pub async fn send_media<F>(&self, call: MediaCall, build: F) -> Result<Option<SentMessage>, DispatchError>
    where
        F: FnOnce(PeerRef, InputMedia) -> B::Query + Send,
    {
        let MediaCall { chat, media, file_type, options, business_connection_id, progress, stop } = call;
        let backend = self.backend();

        let source = self.classify(media, Some(file_type))?;
        let mime_type = source.mime_type();

        let mut uploader = None;
        let media_source = match source {
            MediaSource::RemoteUrl { url }  => InputMediaSource::External { url },
            MediaSource::OpaqueReference(r) => InputMediaSource::Stored(r),
            local => {
                let mut up = ChunkedUploader::new(backend, local, &self.inner.config)?;
                match up.upload(progress.as_deref(), &stop).await? {
                    UploadOutcome::Aborted => return Ok(None),
                    UploadOutcome::Complete(handle) => {
                        uploader = Some(up);
                        InputMediaSource::Uploaded(handle)
                    }
                }
            }
        };
        let media = InputMedia {
            source: media_source,
            file_type,
            mime_type,
            ttl_seconds: options.effective_ttl(),
            spoiler: options.has_spoiler,
        };

        let peer = self.resolve_peer(&chat).await?;
        let request = RpcRequest::new(build(peer, media))?;
        let connection_id = business_connection_id.as_deref();
        let (route, request) = self.inner.router.route(request, connection_id).await?;

        let response = RpcInvoker::new(backend)
            .invoke(&request, &route, uploader.as_ref())
            .await?;
        Ok(demux(response, UpdateKind::SENT_MESSAGE, connection_id))
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Drop the cached binding of a revoked or changed business connection.
    pub async fn forget_connection(&self, connection_id: &str) -> Option<ConnectionBinding> {
        self.inner.router.forget_connection(connection_id).await
    }

    /// Clear the caches and close every pooled session.
    pub async fn shutdown(&self) {
        self.inner.router.shutdown().await;
    }
}

// ─── Utilities ────────────────────────────────────────────────────────────────

/// Random non-zero id for uploads and requests.
pub(crate) fn random_i64() -> Result<i64, DispatchError> {
    let mut b = [0u8; 8];
    loop {
        getrandom::getrandom(&mut b).map_err(|e| io::Error::other(e.to_string()))?;
        let v = i64::from_le_bytes(b);
        if v != 0 { return Ok(v); }
    }
}
