//! Chunked, resumable uploads.
//!
//! [`ChunkedUploader`] reads a [`MediaSource`] in fixed-size parts and hands
//! each one to the [`UploadBackend`] in order. The resulting [`FileHandle`] is
//! embedded in a single request; if the server later reports one part missing,
//! [`ChunkedUploader::resend_part`] re-sends only that part under the same id.
//!
//! Uploads can be stopped from another task through a [`CancellationToken`].
//! The token is checked before every part; a stopped upload yields
//! [`UploadOutcome::Aborted`] and its handle is discarded.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::{DispatchConfig, DispatchError, MediaSource, UploadBackend};

// ─── Types ────────────────────────────────────────────────────────────────────

/// Whether the file went through the small or the big upload path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileVariant {
    Small,
    /// Every part carries the total part count.
    Big,
}

/// A completed upload, ready to be referenced by a request.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileHandle {
    pub id:          i64,
    pub parts_total: u32,
    pub size:        u64,
    pub variant:     FileVariant,
    pub name:        String,
}

/// One chunk on its way to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    pub file_id:     i64,
    /// Zero-based.
    pub index:       u32,
    /// Set only for [`FileVariant::Big`].
    pub total_parts: Option<u32>,
    pub bytes:       Vec<u8>,
}

/// Reported after every part that was sent successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub bytes_total:       u64,
}

/// Progress observer.
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// How an upload ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Complete(FileHandle),
    /// The stop signal was raised; nothing is kept.
    Aborted,
}

// ─── ChunkedUploader ──────────────────────────────────────────────────────────

/// Uploads one media source for one call.
pub struct ChunkedUploader<'a, U: ?Sized> {
    backend:            &'a U,
    source:             MediaSource,
    chunk_size:         usize,
    big_file_threshold: u64,
    max_file_parts:     u32,
    handle:             Option<FileHandle>,
}

impl<'a, U: UploadBackend + ?Sized> ChunkedUploader<'a, U> {
    /// Prepare an upload. Only local files and in-memory streams have content.
    pub fn new(backend: &'a U, source: MediaSource, config: &DispatchConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        if !source.needs_upload() {
            return Err(DispatchError::Validation(format!(
                "a {} has no content to upload", source.describe()
            )));
        }
        Ok(Self {
            backend,
            source,
            chunk_size:         config.chunk_size,
            big_file_threshold: config.big_file_threshold,
            max_file_parts:     config.max_file_parts,
            handle:             None,
        })
    }

    pub fn source(&self) -> &MediaSource { &self.source }

    /// The handle of the last completed upload.
    pub fn handle(&self) -> Option<&FileHandle> { self.handle.as_ref() }

    /// Send every part in order.
    ///
    /// `on_progress` is called after each part with the bytes sent so far.
    pub async fn upload(
        &mut self,
        on_progress: Option<&(dyn Fn(UploadProgress) + Send + Sync)>,
        stop:        &CancellationToken,
    ) -> Result<UploadOutcome, DispatchError> {
        self.handle = None;

        let size = self.content_size().await?;
        if size == 0 {
            return Err(DispatchError::Validation("file is empty".into()));
        }
        let chunk = self.chunk_size as u64;
        let parts_total = size.div_ceil(chunk);
        if parts_total > self.max_file_parts as u64 {
            return Err(DispatchError::Validation(format!(
                "file too big: {size} bytes need {parts_total} parts, limit is {}",
                self.max_file_parts
            )));
        }
        let parts_total = parts_total as u32;
        let variant = if size >= self.big_file_threshold { FileVariant::Big } else { FileVariant::Small };
        let total_parts = (variant == FileVariant::Big).then_some(parts_total);
        let file_id = crate::random_i64()?;

        let mut reader = ChunkReader::open(&self.source).await?;
        for index in 0..parts_total {
            if stop.is_cancelled() {
                tracing::info!("[layer-dispatch] Upload of file {file_id} stopped after {index} / {parts_total} parts");
                return Ok(UploadOutcome::Aborted);
            }

            let len = (size - index as u64 * chunk).min(chunk) as usize;
            let bytes = reader.next_chunk(len).await?;
            self.send(&FilePart { file_id, index, total_parts, bytes }).await?;
            tracing::debug!("[layer-dispatch] Uploaded part {} / {}", index + 1, parts_total);

            if let Some(cb) = on_progress {
                cb(UploadProgress {
                    bytes_transferred: ((index as u64 + 1) * chunk).min(size),
                    bytes_total:       size,
                });
            }
        }

        let name = self.source.file_name().unwrap_or_else(|| format!("file_{file_id:x}"));
        tracing::info!("[layer-dispatch] File '{name}' uploaded ({size} bytes, {parts_total} parts)");
        let handle = FileHandle { id: file_id, parts_total, size, variant, name };
        self.handle = Some(handle.clone());
        Ok(UploadOutcome::Complete(handle))
    }

    /// Re-send part `index` of the completed upload `file_id`.
    pub async fn resend_part(&self, file_id: i64, index: u32) -> Result<(), DispatchError> {
        let handle = self.handle.as_ref()
            .filter(|h| h.id == file_id)
            .ok_or_else(|| DispatchError::Validation(format!("no completed upload with file id {file_id}")))?;
        if index >= handle.parts_total {
            return Err(DispatchError::Validation(format!(
                "part {index} out of range for file {file_id} ({} parts)", handle.parts_total
            )));
        }

        let offset = index as u64 * self.chunk_size as u64;
        let len = (handle.size - offset).min(self.chunk_size as u64) as usize;
        let bytes = self.read_at(offset, len).await?;
        let total_parts = (handle.variant == FileVariant::Big).then_some(handle.parts_total);

        tracing::debug!("[layer-dispatch] Re-sending part {} / {} of file {file_id}", index + 1, handle.parts_total);
        self.send(&FilePart { file_id, index, total_parts, bytes }).await
    }

    async fn send(&self, part: &FilePart) -> Result<(), DispatchError> {
        self.backend.send_chunk(part).await.map_err(|source| DispatchError::Upload {
            file_id: part.file_id,
            part:    part.index,
            source,
        })
    }

    async fn content_size(&self) -> Result<u64, DispatchError> {
        match &self.source {
            MediaSource::LocalFile { path }         => Ok(tokio::fs::metadata(path).await?.len()),
            MediaSource::InMemoryStream { bytes, .. } => Ok(bytes.len() as u64),
            other => Err(no_content(other)),
        }
    }

    async fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, DispatchError> {
        match &self.source {
            MediaSource::LocalFile { path } => {
                let mut file = File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = Vec::with_capacity(len);
                file.take(len as u64).read_to_end(&mut buf).await?;
                if buf.len() != len {
                    return Err(short_read(offset).into());
                }
                Ok(buf)
            }
            MediaSource::InMemoryStream { bytes, .. } => {
                let start = offset as usize;
                bytes.get(start..start + len)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| short_read(offset).into())
            }
            other => Err(no_content(other)),
        }
    }
}

// ─── ChunkReader ──────────────────────────────────────────────────────────────

/// Sequential reader over the upload content.
enum ChunkReader<'s> {
    File { file: File, offset: u64 },
    Memory(&'s [u8]),
}

impl<'s> ChunkReader<'s> {
    async fn open(source: &'s MediaSource) -> Result<Self, DispatchError> {
        match source {
            MediaSource::LocalFile { path } =>
                Ok(Self::File { file: File::open(path).await?, offset: 0 }),
            MediaSource::InMemoryStream { bytes, .. } => Ok(Self::Memory(bytes)),
            other => Err(no_content(other)),
        }
    }

    /// Read exactly `len` bytes.
    async fn next_chunk(&mut self, len: usize) -> io::Result<Vec<u8>> {
        match self {
            Self::File { file, offset } => {
                let mut buf = Vec::with_capacity(len);
                (&mut *file).take(len as u64).read_to_end(&mut buf).await?;
                if buf.len() != len {
                    return Err(short_read(*offset));
                }
                *offset += len as u64;
                Ok(buf)
            }
            Self::Memory(rest) => {
                let current: &'s [u8] = *rest;
                if current.len() < len {
                    return Err(short_read(0));
                }
                let (head, tail) = current.split_at(len);
                *rest = tail;
                Ok(head.to_vec())
            }
        }
    }
}

fn short_read(offset: u64) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("file shrank during upload (offset {offset})"))
}

fn no_content(source: &MediaSource) -> DispatchError {
    DispatchError::Validation(format!("a {} has no content to upload", source.describe()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::BoxError;

    #[derive(Default)]
    struct Sink(Mutex<Vec<FilePart>>);

    impl UploadBackend for Sink {
        async fn send_chunk(&self, part: &FilePart) -> Result<(), BoxError> {
            self.0.lock().unwrap().push(part.clone());
            Ok(())
        }
    }

    fn stream(len: usize) -> MediaSource {
        MediaSource::InMemoryStream { name: "a.bin".into(), bytes: (0..len).map(|i| i as u8).collect() }
    }

    fn config() -> DispatchConfig {
        DispatchConfig::default().chunk_size(1024)
    }

    #[tokio::test]
    async fn resend_reads_the_right_slice() {
        let sink = Sink::default();
        let mut up = ChunkedUploader::new(&sink, stream(2100), &config()).unwrap();
        let UploadOutcome::Complete(handle) = up.upload(None, &CancellationToken::new()).await.unwrap() else {
            panic!("upload aborted");
        };
        assert_eq!(handle.parts_total, 3);

        up.resend_part(handle.id, 2).await.unwrap();
        let parts = sink.0.lock().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].bytes, parts[2].bytes);
        assert_eq!(parts[3].bytes.len(), 2100 - 2048);
    }

    #[tokio::test]
    async fn resend_validates_id_and_index() {
        let sink = Sink::default();
        let mut up = ChunkedUploader::new(&sink, stream(10), &config()).unwrap();
        assert!(up.resend_part(1, 0).await.is_err());

        let UploadOutcome::Complete(handle) = up.upload(None, &CancellationToken::new()).await.unwrap() else {
            panic!("upload aborted");
        };
        assert!(matches!(up.resend_part(handle.id, 1).await, Err(DispatchError::Validation(_))));
        assert!(matches!(up.resend_part(handle.id ^ 1, 0).await, Err(DispatchError::Validation(_))));
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let sink = Sink::default();
        let stop = CancellationToken::new();
        stop.cancel();
        let mut up = ChunkedUploader::new(&sink, stream(10), &config()).unwrap();
        assert_eq!(up.upload(None, &stop).await.unwrap(), UploadOutcome::Aborted);
        assert!(up.handle().is_none());
        assert!(sink.0.lock().unwrap().is_empty());
    }

    /// Truncates its file once the first part has been sent.
    struct Shrinking {
        path:  std::path::PathBuf,
        parts: Mutex<Vec<FilePart>>,
    }

    impl UploadBackend for Shrinking {
        async fn send_chunk(&self, part: &FilePart) -> Result<(), BoxError> {
            self.parts.lock().unwrap().push(part.clone());
            if part.index == 0 {
                std::fs::OpenOptions::new().write(true).open(&self.path)?.set_len(1500)?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn file_shrinking_mid_upload_fails() {
        let path = std::env::temp_dir().join(format!("layer-dispatch-shrink-{}.bin", std::process::id()));
        std::fs::write(&path, vec![7u8; 3000]).unwrap();
        let sink = Shrinking { path: path.clone(), parts: Mutex::default() };

        let source = MediaSource::LocalFile { path: path.clone() };
        let mut up = ChunkedUploader::new(&sink, source, &config()).unwrap();
        let result = up.upload(None, &CancellationToken::new()).await;
        std::fs::remove_file(&path).unwrap();

        match result {
            Err(DispatchError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected a short read, got {other:?}"),
        }
        assert_eq!(sink.parts.lock().unwrap().len(), 1);
        assert!(up.handle().is_none());
    }

    #[test]
    fn url_sources_cannot_be_uploaded() {
        let sink = Sink::default();
        let url = MediaSource::RemoteUrl { url: "https://example.com/a".into() };
        assert!(ChunkedUploader::new(&sink, url, &config()).is_err());
    }
}
