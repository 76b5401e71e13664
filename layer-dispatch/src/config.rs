//! Dispatcher configuration.

use crate::DispatchError;

// ─── Constants ────────────────────────────────────────────────────────────────

/// Largest chunk the upload backend accepts (512 KB).
pub const MAX_CHUNK_SIZE: usize = 512 * 1024;
/// Files of at least this size are uploaded as "big files" (10 MB).
pub const BIG_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;
/// Upper bound on the number of parts of a single upload.
pub const MAX_FILE_PARTS: u32 = 4000;

// ─── DispatchConfig ───────────────────────────────────────────────────────────

/// Configuration for [`crate::Dispatcher::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatchConfig {
    /// Upload chunk size in bytes. Must be a multiple of 1024 that divides 512 KB.
    pub chunk_size:         usize,
    /// Size at which uploads switch to the big-file variant.
    pub big_file_threshold: u64,
    /// Maximum parts per upload; larger files are rejected before sending.
    pub max_file_parts:     u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size:         MAX_CHUNK_SIZE,
            big_file_threshold: BIG_FILE_THRESHOLD,
            max_file_parts:     MAX_FILE_PARTS,
        }
    }
}

impl DispatchConfig {
    /// Set the upload chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size; self
    }

    /// Set the big-file threshold.
    pub fn big_file_threshold(mut self, bytes: u64) -> Self {
        self.big_file_threshold = bytes; self
    }

    /// Set the per-upload part limit.
    pub fn max_file_parts(mut self, parts: u32) -> Self {
        self.max_file_parts = parts; self
    }

    /// Reject settings the upload backend would refuse.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let size = self.chunk_size;
        if size == 0 || size % 1024 != 0 || MAX_CHUNK_SIZE % size != 0 {
            return Err(DispatchError::Validation(format!(
                "chunk size {size} must be a multiple of 1024 that divides {MAX_CHUNK_SIZE}"
            )));
        }
        if self.max_file_parts == 0 {
            return Err(DispatchError::Validation("max_file_parts must be at least 1".into()));
        }
        Ok(())
    }
}
