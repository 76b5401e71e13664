//! Media classification.
//!
//! A caller names media loosely: a path, a URL, a file id, or a buffer of bytes.
//! [`classify`] settles that once per call into a [`MediaSource`], which decides
//! whether anything has to be uploaded before the request can be sent.

use std::path::{Path, PathBuf};

use crate::{DispatchError, FileHandle, FileReferenceCodec, FileType, OpaqueReference};

/// `ttl_seconds` value that makes media viewable exactly once.
pub const VIEW_ONCE_TTL: i32 = 0x7FFF_FFFF;

// ─── MediaInput ───────────────────────────────────────────────────────────────

/// Media as the caller supplied it.
#[derive(Clone, Debug)]
pub enum MediaInput {
    /// A path, an `http(s)://` URL, or a file id.
    Reference(String),
    /// Bytes already in memory; `name` is used for the uploaded file name.
    Stream { name: String, bytes: Vec<u8> },
}

impl MediaInput {
    /// In-memory media with the given file name.
    pub fn stream(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Stream { name: name.into(), bytes: bytes.into() }
    }
}

impl From<&str> for MediaInput {
    fn from(s: &str) -> Self { Self::Reference(s.to_string()) }
}

impl From<String> for MediaInput {
    fn from(s: String) -> Self { Self::Reference(s) }
}

impl From<&Path> for MediaInput {
    fn from(p: &Path) -> Self { Self::Reference(p.to_string_lossy().into_owned()) }
}

impl From<PathBuf> for MediaInput {
    fn from(p: PathBuf) -> Self { Self::from(p.as_path()) }
}

// ─── MediaSource ──────────────────────────────────────────────────────────────

/// Where the media bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaSource {
    LocalFile { path: PathBuf },
    RemoteUrl { url: String },
    OpaqueReference(OpaqueReference),
    InMemoryStream { name: String, bytes: Vec<u8> },
}

impl MediaSource {
    /// `true` if the bytes must be uploaded before sending.
    pub fn needs_upload(&self) -> bool {
        matches!(self, Self::LocalFile { .. } | Self::InMemoryStream { .. })
    }

    /// File name used for uploads and MIME guessing.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::LocalFile { path } =>
                path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::InMemoryStream { name, .. } => Some(name.clone()),
            Self::RemoteUrl { url } => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            Self::OpaqueReference(_) => None,
        }
    }

    /// MIME type guessed from the file name (`application/octet-stream` if unknown).
    pub fn mime_type(&self) -> String {
        self.file_name()
            .and_then(|n| mime_guess::from_path(n).first_raw())
            .unwrap_or("application/octet-stream")
            .to_string()
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::LocalFile { .. }       => "local file",
            Self::RemoteUrl { .. }       => "remote URL",
            Self::OpaqueReference(_)     => "file reference",
            Self::InMemoryStream { .. }  => "in-memory stream",
        }
    }
}

// ─── classify ─────────────────────────────────────────────────────────────────

/// Decide what kind of media `input` is.
///
/// Rules, in order:
/// 1. bytes → [`MediaSource::InMemoryStream`]
/// 2. a string naming an existing regular file → [`MediaSource::LocalFile`]
/// 3. an `http://` / `https://` string → [`MediaSource::RemoteUrl`]
/// 4. anything else is decoded as a file id → [`MediaSource::OpaqueReference`]
///
/// When `expected` is set, a file id of a different type is rejected, as are
/// download-only ids (thumbnails, chat photos). Nothing is uploaded or fetched.
pub fn classify<C: FileReferenceCodec + ?Sized>(
    input:    MediaInput,
    codec:    &C,
    expected: Option<FileType>,
) -> Result<MediaSource, DispatchError> {
    let reference = match input {
        MediaInput::Stream { name, bytes } => return Ok(MediaSource::InMemoryStream { name, bytes }),
        MediaInput::Reference(r) => r,
    };

    let path = Path::new(&reference);
    if path.is_file() {
        return Ok(MediaSource::LocalFile { path: path.to_path_buf() });
    }

    if is_http_url(&reference) {
        return Ok(MediaSource::RemoteUrl { url: reference });
    }

    let decoded = codec.decode(&reference)?;
    if let Some(expected) = expected {
        if decoded.file_type != expected {
            return Err(DispatchError::InvalidReference(format!(
                "expected a {expected:?} file id, got {:?}", decoded.file_type
            )));
        }
    }
    if decoded.file_type.is_download_only() {
        return Err(DispatchError::InvalidReference(format!(
            "{:?} file ids can only be used for downloads", decoded.file_type
        )));
    }
    Ok(MediaSource::OpaqueReference(decoded))
}

fn is_http_url(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

// ─── InputMedia ───────────────────────────────────────────────────────────────

/// Presentation flags for sent media.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaOptions {
    /// Self-destruct timer in seconds.
    pub ttl_seconds: Option<i32>,
    /// Viewable once; overrides `ttl_seconds`.
    pub view_once:   bool,
    /// Cover the media with a spoiler animation.
    pub has_spoiler: bool,
}

impl MediaOptions {
    pub fn ttl_seconds(mut self, secs: i32) -> Self {
        self.ttl_seconds = Some(secs); self
    }

    pub fn view_once(mut self, v: bool) -> Self {
        self.view_once = v; self
    }

    pub fn spoiler(mut self, v: bool) -> Self {
        self.has_spoiler = v; self
    }

    /// The ttl actually sent.
    pub fn effective_ttl(&self) -> Option<i32> {
        if self.view_once { Some(VIEW_ONCE_TTL) } else { self.ttl_seconds }
    }
}

/// How the request refers to the media.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputMediaSource {
    /// Freshly uploaded through [`crate::ChunkedUploader`].
    Uploaded(FileHandle),
    /// The server fetches the media itself.
    External { url: String },
    /// Media the server already stores.
    Stored(OpaqueReference),
}

/// Media ready to be embedded in a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputMedia {
    pub source:      InputMediaSource,
    pub file_type:   FileType,
    pub mime_type:   String,
    pub ttl_seconds: Option<i32>,
    pub spoiler:     bool,
}

impl InputMedia {
    /// The uploaded file handle, if the media was uploaded.
    pub fn file_handle(&self) -> Option<&FileHandle> {
        match &self.source {
            InputMediaSource::Uploaded(h) => Some(h),
            _ => None,
        }
    }
}
