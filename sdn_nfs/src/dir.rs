//! In-memory directory model and its CBOR shape.
//!
//! A directory record's (decrypted) payload is a CBOR array
//! `["sdn.dir.v1", [entry, ...]]` whose entries are sorted by name with no
//! duplicates. Entry names are compared byte-wise, so ordering and
//! uniqueness are case-sensitive.

use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use minicbor::{Decode, Encode};
use sdn_core::{Address, Error, Result, crypto::SecretKey};

/// Longest permitted entry name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Checks that `name` can be used as a directory entry name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Encode, Decode, Clone, Debug, Default, PartialEq, Eq)]
#[cbor(map)]
pub struct Metadata {
    /// Creation time, Unix milliseconds.
    #[n(0)]
    pub created: u64,
    /// Last modification time, Unix milliseconds.
    #[n(1)]
    pub modified: u64,
    #[n(2)]
    pub user: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(at: u64) -> Self {
        Self {
            created: at,
            modified: at,
            user: BTreeMap::new(),
        }
    }

    pub fn now() -> Self {
        Self::new(now_millis())
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user.insert(key.into(), value.into());
        self
    }
}

/// One stored piece of a large file.
///
/// `key` is both the decryption key and the BLAKE3 derive-key hash of the
/// plain chunk, so a reader can tell a substituted chunk from the real one.
#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
#[cbor(array)]
pub struct ChunkRef {
    #[n(0)]
    pub address: Address,
    #[n(1)]
    #[cbor(with = "minicbor::bytes")]
    pub key: SecretKey,
}

#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
pub enum FileContent {
    #[n(0)]
    Inline(#[n(0)] #[cbor(with = "minicbor::bytes")] Vec<u8>),
    #[n(1)]
    Chunks(#[n(0)] Vec<ChunkRef>),
    /// A chunk list too long for the entry, itself stored as chunks.
    /// `chunks` holds the CBOR-encoded list of the layer below; `levels`
    /// is the number of such layers above the file's data chunks.
    #[n(2)]
    Indirect {
        #[n(0)]
        levels: u32,
        #[n(1)]
        chunks: Vec<ChunkRef>,
    },
}

#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
#[cbor(map)]
pub struct FileRef {
    #[n(0)]
    pub size: u64,
    #[n(1)]
    pub content: FileContent,
}

impl FileRef {
    /// Addresses of the chunk records the entry refers to directly, in
    /// order; empty for inline files. For an indirect file these hold the
    /// top-level chunk list, not file data.
    pub fn chunk_addresses(&self) -> Vec<Address> {
        match &self.content {
            FileContent::Inline(_) => Vec::new(),
            FileContent::Chunks(chunks) | FileContent::Indirect { chunks, .. } => {
                chunks.iter().map(|c| c.address).collect()
            }
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.content, FileContent::Inline(_))
    }
}

/// Reference to a directory record.
///
/// Obtained from [`Nfs::create_dir`](crate::Nfs::create_dir), which always
/// allocates a fresh address, or by reading an existing tree.
#[derive(Encode, Decode, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cbor(array)]
pub struct DirRef {
    #[n(0)]
    address: Address,
}

impl DirRef {
    pub(crate) fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    #[n(0)]
    File(#[n(0)] FileRef),
    #[n(1)]
    Directory(#[n(0)] DirRef),
}

#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
#[cbor(map)]
pub struct DirectoryEntry {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub metadata: Metadata,
    #[n(2)]
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>, file: FileRef, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            metadata,
            kind: EntryKind::File(file),
        }
    }

    pub fn directory(name: impl Into<String>, dir: DirRef, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            metadata,
            kind: EntryKind::Directory(dir),
        }
    }

    pub fn as_file(&self) -> Result<&FileRef> {
        match &self.kind {
            EntryKind::File(file) => Ok(file),
            EntryKind::Directory(_) => Err(Error::NotAFile(self.name.clone())),
        }
    }

    pub fn as_dir(&self) -> Result<&DirRef> {
        match &self.kind {
            EntryKind::Directory(dir) => Ok(dir),
            EntryKind::File(_) => Err(Error::NotADirectory(self.name.clone())),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory(_))
    }
}

/// The decoded contents of one directory record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Directory {
    entries: BTreeMap<String, DirectoryEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from entries in any order.
    ///
    /// Fails with `DuplicateName` or `InvalidName` on the first offending
    /// entry.
    pub fn from_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Result<Self> {
        let mut dir = Self::new();
        for entry in entries {
            dir.insert(entry)?;
        }
        Ok(dir)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.get(name)
    }

    pub fn entry(&self, name: &str) -> Result<&DirectoryEntry> {
        self.get(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    pub fn entry_mut(&mut self, name: &str) -> Result<&mut DirectoryEntry> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    /// Entries sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> Vec<DirectoryEntry> {
        self.entries.into_values().collect()
    }

    /// Adds `entry`; never overwrites.
    pub fn insert(&mut self, entry: DirectoryEntry) -> Result<()> {
        validate_name(&entry.name)?;
        if self.entries.contains_key(&entry.name) {
            return Err(Error::DuplicateName(entry.name));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<DirectoryEntry> {
        self.entries
            .remove(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    /// Renames an entry in place; the target name must be free.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        validate_name(to)?;
        if from == to {
            return self.entry(from).map(|_| ());
        }
        if self.entries.contains_key(to) {
            return Err(Error::DuplicateName(to.to_string()));
        }
        let mut entry = self.remove(from)?;
        entry.name = to.to_string();
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Addresses of the immediate subdirectories.
    pub fn subdirs(&self) -> impl Iterator<Item = &DirRef> {
        self.iter().filter_map(|entry| match &entry.kind {
            EntryKind::Directory(dir) => Some(dir),
            EntryKind::File(_) => None,
        })
    }
}
