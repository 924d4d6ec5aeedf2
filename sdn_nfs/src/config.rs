use sdn_core::{
    crypto::{NONCE_SIZE, TAG_SIZE},
    record::MAX_PAYLOAD_SIZE,
};
use serde::{Deserialize, Serialize};

/// Largest chunk whose sealed form still fits in one record.
pub const MAX_CHUNK_SIZE: usize = MAX_PAYLOAD_SIZE - NONCE_SIZE - TAG_SIZE;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NfsConfig {
    /// Larger files are split into chunks of this size.
    pub chunk_size: usize,
    /// Files up to this size are stored inside their directory entry.
    /// Every inline byte counts against the directory record's payload
    /// limit, so keep this well below `chunk_size`.
    pub inline_threshold: usize,
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
            inline_threshold: 1024,
        }
    }
}

impl NfsConfig {
    /// `chunk_size` clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }

    /// `inline_threshold`, capped at the effective chunk size.
    pub fn effective_inline_threshold(&self) -> usize {
        self.inline_threshold.min(self.effective_chunk_size())
    }
}
