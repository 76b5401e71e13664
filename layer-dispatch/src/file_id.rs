//! Previously-issued file references ("file ids").
//!
//! A file id is a compact, URL-safe string the server handed out for media it
//! already stores. Sending one back avoids re-uploading the bytes.
//!
//! Layout, after URL-safe base64 (no padding) and zero-run-length decoding:
//!
//! | Field            | Encoding                                            |
//! |------------------|-----------------------------------------------------|
//! | type + flags     | `i32` LE, flags `1<<24` (web) and `1<<25` (file ref) |
//! | dc id            | `i32` LE                                            |
//! | file reference   | TL bytes, only with the file-ref flag               |
//! | url              | TL string, only with the web flag                   |
//! | id, access hash  | `i64` LE each (access hash only for web locations)  |
//! | …                | media-specific trailer, ignored                     |
//! | minor, major     | one byte each; `minor` absent when `major < 4`      |

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::DispatchError;

const WEB_LOCATION_FLAG:  i32 = 1 << 24;
const FILE_REFERENCE_FLAG: i32 = 1 << 25;

const MAJOR_VERSION: u8 = 4;
const MINOR_VERSION: u8 = 30;

// ─── FileType ─────────────────────────────────────────────────────────────────

/// Kind of media a file id refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    Thumbnail,
    ChatPhoto,
    Photo,
    Voice,
    Video,
    Document,
    Encrypted,
    Temp,
    Sticker,
    Audio,
    Animation,
    EncryptedThumbnail,
    Wallpaper,
    VideoNote,
    SecureRaw,
    Secure,
    Background,
    DocumentAsFile,
}

impl FileType {
    const ALL: [FileType; 18] = [
        Self::Thumbnail, Self::ChatPhoto, Self::Photo, Self::Voice, Self::Video,
        Self::Document, Self::Encrypted, Self::Temp, Self::Sticker, Self::Audio,
        Self::Animation, Self::EncryptedThumbnail, Self::Wallpaper, Self::VideoNote,
        Self::SecureRaw, Self::Secure, Self::Background, Self::DocumentAsFile,
    ];

    pub fn from_i32(v: i32) -> Option<Self> {
        usize::try_from(v).ok().and_then(|i| Self::ALL.get(i)).copied()
    }

    pub fn as_i32(self) -> i32 {
        Self::ALL.iter().position(|t| *t == self).unwrap_or_default() as i32
    }

    /// Thumbnails and chat photos can be downloaded but never re-sent.
    pub fn is_download_only(self) -> bool {
        matches!(self, Self::Thumbnail | Self::ChatPhoto)
    }

    /// Sent as a document (everything except photos).
    pub fn is_document(self) -> bool {
        matches!(
            self,
            Self::Voice | Self::Video | Self::Document | Self::Sticker | Self::Audio
                | Self::Animation | Self::VideoNote | Self::DocumentAsFile
        )
    }
}

// ─── OpaqueReference ──────────────────────────────────────────────────────────

/// A decoded file id.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpaqueReference {
    pub file_type:      FileType,
    pub dc_id:          i32,
    pub id:             i64,
    pub access_hash:    i64,
    pub file_reference: Vec<u8>,
    /// Set for media that lives at a web location instead of a data center.
    pub url:            Option<String>,
}

// ─── Codec ────────────────────────────────────────────────────────────────────

/// Decodes previously-issued file references.
pub trait FileReferenceCodec: Send + Sync {
    fn decode(&self, reference: &str) -> Result<OpaqueReference, DispatchError>;
}

/// The standard file id format.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileIdCodec;

impl FileReferenceCodec for FileIdCodec {
    fn decode(&self, reference: &str) -> Result<OpaqueReference, DispatchError> {
        decode(reference).ok_or_else(|| DispatchError::InvalidReference(format!(
            "{reference:?} is not an existing local file, an HTTP URL, or a valid file id"
        )))
    }
}

impl FileIdCodec {
    /// Encode a reference into its string form.
    pub fn encode(&self, r: &OpaqueReference) -> String {
        let mut flags = r.file_type.as_i32();
        if r.url.is_some() { flags |= WEB_LOCATION_FLAG; }
        if !r.file_reference.is_empty() { flags |= FILE_REFERENCE_FLAG; }

        let mut b = Vec::new();
        b.extend_from_slice(&flags.to_le_bytes());
        b.extend_from_slice(&r.dc_id.to_le_bytes());
        if !r.file_reference.is_empty() {
            tl_write_bytes(&mut b, &r.file_reference);
        }
        match &r.url {
            Some(url) => {
                tl_write_bytes(&mut b, url.as_bytes());
                b.extend_from_slice(&r.access_hash.to_le_bytes());
            }
            None => {
                b.extend_from_slice(&r.id.to_le_bytes());
                b.extend_from_slice(&r.access_hash.to_le_bytes());
            }
        }
        b.push(MINOR_VERSION);
        b.push(MAJOR_VERSION);
        URL_SAFE_NO_PAD.encode(rle_encode(&b))
    }
}

fn decode(reference: &str) -> Option<OpaqueReference> {
    let raw = URL_SAFE_NO_PAD.decode(reference.trim_end_matches('=')).ok()?;
    let data = rle_decode(&raw);

    let (&major, rest) = data.split_last()?;
    let body = if major < 4 { rest } else { rest.split_last()?.1 };

    let mut cur = Reader { data: body, pos: 0 };
    let flags = cur.i32()?;
    let dc_id = cur.i32()?;
    let file_type = FileType::from_i32(flags & !(WEB_LOCATION_FLAG | FILE_REFERENCE_FLAG))?;

    let file_reference = if flags & FILE_REFERENCE_FLAG != 0 { cur.tl_bytes()? } else { Vec::new() };

    if flags & WEB_LOCATION_FLAG != 0 {
        let url = String::from_utf8(cur.tl_bytes()?).ok()?;
        let access_hash = cur.i64()?;
        return Some(OpaqueReference { file_type, dc_id, id: 0, access_hash, file_reference, url: Some(url) });
    }

    let id = cur.i64()?;
    let access_hash = cur.i64()?;
    Some(OpaqueReference { file_type, dc_id, id, access_hash, file_reference, url: None })
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos:  usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        let out = self.data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(out)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take(4)?.try_into().ok().map(i32::from_le_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take(8)?.try_into().ok().map(i64::from_le_bytes)
    }

    fn tl_bytes(&mut self) -> Option<Vec<u8>> {
        let first = *self.take(1)?.first()?;
        let (len, header) = if first < 254 {
            (first as usize, 1)
        } else {
            let b = self.take(3)?;
            (b[0] as usize | (b[1] as usize) << 8 | (b[2] as usize) << 16, 4)
        };
        let out = self.take(len)?.to_vec();
        let pad = (4 - (header + len) % 4) % 4;
        self.take(pad)?;
        Some(out)
    }
}

fn tl_write_bytes(b: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    let header = if len < 254 {
        b.push(len as u8);
        1
    } else {
        b.extend_from_slice(&[254, (len & 0xff) as u8, ((len >> 8) & 0xff) as u8, ((len >> 16) & 0xff) as u8]);
        4
    };
    b.extend_from_slice(data);
    let pad = (4 - (header + len) % 4) % 4;
    b.extend(std::iter::repeat_n(0u8, pad));
}

/// Zero bytes are stored as `0, run_length`.
fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0u8;
    for &byte in data {
        if byte == 0 {
            if zeros == u8::MAX {
                out.extend_from_slice(&[0, zeros]);
                zeros = 0;
            }
            zeros += 1;
            continue;
        }
        if zeros > 0 {
            out.extend_from_slice(&[0, zeros]);
            zeros = 0;
        }
        out.push(byte);
    }
    if zeros > 0 {
        out.extend_from_slice(&[0, zeros]);
    }
    out
}

fn rle_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut in_run = false;
    for &byte in data {
        if byte == 0 {
            in_run = true;
            continue;
        }
        if in_run {
            out.extend(std::iter::repeat_n(0u8, byte as usize));
            in_run = false;
        } else {
            out.push(byte);
        }
    }
    out
}
