//! Encrypted directory and file tree on top of structured records.
//!
//! A directory is one versioned record whose payload is the encrypted CBOR
//! encoding of its entries ([`DirCodec`]). Entries are files, stored inline
//! or as chunk records, or references to other directory records.
//! [`Nfs`] implements the tree operations as engine updates.

mod codec;
mod config;
mod content;
mod dir;
mod nfs;

pub use codec::DirCodec;
pub use config::{MAX_CHUNK_SIZE, NfsConfig};
pub use content::MAX_LISTED_CHUNKS;
pub use dir::{
    ChunkRef, DirRef, Directory, DirectoryEntry, EntryKind, FileContent, FileRef, MAX_NAME_LEN,
    Metadata, now_millis, validate_name,
};
pub use nfs::{Nfs, WriteMode};
