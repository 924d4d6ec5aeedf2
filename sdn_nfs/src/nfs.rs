use std::collections::HashSet;

use bytes::Bytes;
use rand::Rng;
use sdn_core::{
    Address, Error, Result, RecordDraft, Session, StructuredRecord, TypeTag, XorName,
};
use sdn_engine::StructuredDataEngine;
use tracing::debug;

use crate::{
    NfsConfig,
    codec::DirCodec,
    content,
    dir::{DirRef, Directory, DirectoryEntry, EntryKind, FileRef, Metadata, now_millis, validate_name},
};

/// Directory and file operations over a [`StructuredDataEngine`].
///
/// Every directory is its own versioned record, so each operation below is
/// one engine update (fetch, decode, change, encode, conditional write) and
/// inherits the engine's conflict retry. Nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct Nfs {
    engine: StructuredDataEngine,
    chunk_size: usize,
    inline_threshold: usize,
}

/// How [`Nfs::update_file`] combines new content with the old.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the content.
    #[default]
    Overwrite,
    /// Add to the end of the existing content.
    Append,
}

impl Nfs {
    pub fn new(engine: StructuredDataEngine, config: NfsConfig) -> Self {
        Self {
            engine,
            chunk_size: config.effective_chunk_size(),
            inline_threshold: config.effective_inline_threshold(),
        }
    }

    pub fn engine(&self) -> &StructuredDataEngine {
        &self.engine
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn inline_threshold(&self) -> usize {
        self.inline_threshold
    }

    /// Creates an empty directory record under a fresh random name.
    pub async fn create_dir(&self, session: &Session) -> Result<DirRef> {
        let name: XorName = rand::rng().random();
        let address = Address::derive(TypeTag::Versioned, &name);
        let payload = DirCodec::new(session, &address).encode(&Directory::new())?;
        self.engine
            .create(
                session.keypair(),
                TypeTag::Versioned,
                name,
                vec![session.public_key()],
                payload,
            )
            .await?;
        debug!(%address, "created directory");
        Ok(DirRef::new(address))
    }

    /// Opens an existing directory by address, checking that it decodes
    /// under this session.
    pub async fn open_dir(&self, session: &Session, address: Address) -> Result<DirRef> {
        let dir = DirRef::new(address);
        self.read_dir(session, &dir).await?;
        Ok(dir)
    }

    /// Creates a directory and links it into `parent` as `name`.
    ///
    /// If linking fails the new directory record is left unreferenced.
    pub async fn create_subdir(
        &self,
        session: &Session,
        parent: &DirRef,
        name: &str,
        metadata: Metadata,
    ) -> Result<DirRef> {
        validate_name(name)?;
        let child = self.create_dir(session).await?;
        self.add_entry(session, parent, DirectoryEntry::directory(name, child, metadata))
            .await?;
        Ok(child)
    }

    /// Fetches and decodes a directory.
    pub async fn read_dir(&self, session: &Session, dir: &DirRef) -> Result<Directory> {
        Ok(self.read_dir_versioned(session, dir).await?.0)
    }

    /// Like [`read_dir`](Self::read_dir), also returning the record
    /// version for the `*_at` operations.
    pub async fn read_dir_versioned(
        &self,
        session: &Session,
        dir: &DirRef,
    ) -> Result<(Directory, u64)> {
        let record = self.engine.fetch(dir.address()).await?;
        let contents = DirCodec::new(session, dir.address()).decode(&record.payload)?;
        Ok((contents, record.version))
    }

    /// Entries of `dir`, sorted by name.
    pub async fn list(&self, session: &Session, dir: &DirRef) -> Result<Vec<DirectoryEntry>> {
        Ok(self.read_dir(session, dir).await?.into_entries())
    }

    pub async fn get_entry(
        &self,
        session: &Session,
        dir: &DirRef,
        name: &str,
    ) -> Result<DirectoryEntry> {
        self.read_dir(session, dir).await?.entry(name).cloned()
    }

    /// Resolves a `/`-separated path below `root`. Empty segments are
    /// skipped, so `"/a//b"` is the same as `"a/b"`.
    pub async fn lookup_path(
        &self,
        session: &Session,
        root: &DirRef,
        path: &str,
    ) -> Result<DirectoryEntry> {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut dir = *root;
        while let Some(segment) = segments.next() {
            let entry = self.get_entry(session, &dir, segment).await?;
            if segments.peek().is_none() {
                return Ok(entry);
            }
            dir = *entry.as_dir()?;
        }
        Err(Error::InvalidName(path.to_string()))
    }

    /// Runs `change` against the current contents of `dir` and stores the
    /// result. `change` may run more than once.
    async fn modify<F>(&self, session: &Session, dir: &DirRef, change: F) -> Result<()>
    where
        F: Fn(&mut Directory) -> Result<()> + Send + Sync,
    {
        self.apply(session, dir, None, change).await
    }

    /// Single attempt of `change` against version `expected_version` of
    /// `dir`; `VersionConflict` if the directory has moved on.
    async fn modify_at<F>(
        &self,
        session: &Session,
        dir: &DirRef,
        expected_version: u64,
        change: F,
    ) -> Result<()>
    where
        F: Fn(&mut Directory) -> Result<()> + Send + Sync,
    {
        self.apply(session, dir, Some(expected_version), change).await
    }

    async fn apply<F>(
        &self,
        session: &Session,
        dir: &DirRef,
        expected_version: Option<u64>,
        change: F,
    ) -> Result<()>
    where
        F: Fn(&mut Directory) -> Result<()> + Send + Sync,
    {
        let codec = DirCodec::new(session, dir.address());
        let mutator = |current: &StructuredRecord| -> Result<RecordDraft> {
            let mut contents = codec.decode(&current.payload)?;
            change(&mut contents)?;
            Ok(current.draft().with_payload(codec.encode(&contents)?))
        };
        let record = match expected_version {
            Some(version) => {
                self.engine
                    .update_at(session.keypair(), dir.address(), version, mutator)
                    .await?
            }
            None => {
                self.engine
                    .update(session.keypair(), dir.address(), mutator)
                    .await?
            }
        };
        debug!(address = %dir.address(), version = record.version, "updated directory");
        Ok(())
    }

    /// Adds `entry` to `dir`; fails with `DuplicateName` if the name is
    /// taken, leaving the directory untouched.
    ///
    /// A directory entry may not point at `dir` itself or at one of its
    /// ancestors within the linked subtree.
    pub async fn add_entry(
        &self,
        session: &Session,
        dir: &DirRef,
        entry: DirectoryEntry,
    ) -> Result<()> {
        validate_name(&entry.name)?;
        if let EntryKind::Directory(child) = &entry.kind {
            self.ensure_not_within(session, child, dir).await?;
        }
        self.modify(session, dir, |contents| contents.insert(entry.clone()))
            .await
    }

    pub async fn remove_entry(
        &self,
        session: &Session,
        dir: &DirRef,
        name: &str,
    ) -> Result<()> {
        self.modify(session, dir, |contents| contents.remove(name).map(|_| ()))
            .await
    }

    /// Removes `name` only if `dir` is still at `expected_version`.
    pub async fn remove_entry_at(
        &self,
        session: &Session,
        dir: &DirRef,
        expected_version: u64,
        name: &str,
    ) -> Result<()> {
        self.modify_at(session, dir, expected_version, |contents| {
            contents.remove(name).map(|_| ())
        })
        .await
    }

    /// Renames within one directory; the new name must be free.
    pub async fn rename_entry(
        &self,
        session: &Session,
        dir: &DirRef,
        from: &str,
        to: &str,
    ) -> Result<()> {
        validate_name(to)?;
        self.modify(session, dir, |contents| contents.rename(from, to))
            .await
    }

    /// Moves `name` from `src` into `dst`, optionally renaming it.
    ///
    /// Two independent updates: the entry is inserted into `dst` first and
    /// removed from `src` second. If the second step fails the entry is
    /// present in both directories and that step's error is returned.
    pub async fn move_entry(
        &self,
        session: &Session,
        src: &DirRef,
        name: &str,
        dst: &DirRef,
        new_name: Option<&str>,
    ) -> Result<()> {
        let target = new_name.unwrap_or(name);
        if src == dst {
            return self.rename_entry(session, src, name, target).await;
        }
        validate_name(target)?;

        let mut entry = self.get_entry(session, src, name).await?;
        entry.name = target.to_string();
        if let EntryKind::Directory(child) = &entry.kind {
            self.ensure_not_within(session, child, dst).await?;
        }

        self.modify(session, dst, |contents| contents.insert(entry.clone()))
            .await?;
        self.remove_entry(session, src, name).await?;
        debug!(src = %src.address(), dst = %dst.address(), name, target, "moved entry");
        Ok(())
    }

    /// Fails with `InvalidMove` if `target` is `subtree` or lies below it.
    async fn ensure_not_within(
        &self,
        session: &Session,
        subtree: &DirRef,
        target: &DirRef,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let mut pending = vec![*subtree];
        while let Some(dir) = pending.pop() {
            if dir == *target {
                return Err(Error::InvalidMove(format!(
                    "{} would become part of its own subtree",
                    subtree.address()
                )));
            }
            if !seen.insert(dir) {
                continue;
            }
            let contents = self.read_dir(session, &dir).await?;
            pending.extend(contents.subdirs().copied());
        }
        Ok(())
    }

    /// Stores `content` and returns a file entry ready for
    /// [`add_entry`](Self::add_entry).
    pub async fn write_file(
        &self,
        session: &Session,
        name: &str,
        content: &[u8],
        metadata: Metadata,
    ) -> Result<DirectoryEntry> {
        validate_name(name)?;
        let file = self.store(session, content).await?;
        Ok(DirectoryEntry::file(name, file, metadata))
    }

    async fn store(&self, session: &Session, content: &[u8]) -> Result<FileRef> {
        content::write_content(
            &self.engine,
            session,
            self.chunk_size,
            self.inline_threshold,
            content,
        )
        .await
    }

    /// Reads a file's full content.
    pub async fn read_file(&self, file: &FileRef) -> Result<Bytes> {
        content::read_content(&self.engine, file).await
    }

    /// Writes new content to the file `name`, keeping its creation time
    /// and user attributes and bumping its modification time.
    ///
    /// An append reads the current content, so it is pinned to the
    /// directory version it read and restarts on a conflict.
    pub async fn update_file(
        &self,
        session: &Session,
        dir: &DirRef,
        name: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<DirectoryEntry> {
        if mode == WriteMode::Append {
            return self
                .engine
                .with_retry("append_file", dir.address(), || {
                    self.rewrite_file(session, dir, None, name, content, mode)
                })
                .await;
        }

        let file = self.store(session, content).await?;
        let modified = now_millis();
        self.modify(session, dir, |contents| {
            let entry = contents.entry_mut(name)?;
            entry.as_file()?;
            entry.kind = EntryKind::File(file.clone());
            entry.metadata.modified = modified;
            Ok(())
        })
        .await?;
        self.get_entry(session, dir, name).await
    }

    /// [`update_file`](Self::update_file) that only succeeds while `dir` is
    /// at `expected_version`; never retries.
    pub async fn update_file_at(
        &self,
        session: &Session,
        dir: &DirRef,
        expected_version: u64,
        name: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<DirectoryEntry> {
        self.rewrite_file(session, dir, Some(expected_version), name, content, mode)
            .await
    }

    async fn rewrite_file(
        &self,
        session: &Session,
        dir: &DirRef,
        expected_version: Option<u64>,
        name: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<DirectoryEntry> {
        let (contents, version) = self.read_dir_versioned(session, dir).await?;
        if let Some(expected) = expected_version
            && version != expected
        {
            return Err(Error::VersionConflict);
        }
        let mut entry = contents.entry(name)?.clone();
        let file = match mode {
            WriteMode::Overwrite => {
                entry.as_file()?;
                self.store(session, content).await?
            }
            WriteMode::Append => {
                let old = self.read_file(entry.as_file()?).await?;
                let mut joined = Vec::with_capacity(old.len() + content.len());
                joined.extend_from_slice(&old);
                joined.extend_from_slice(content);
                self.store(session, &joined).await?
            }
        };
        entry.kind = EntryKind::File(file);
        entry.metadata.modified = now_millis();

        self.modify_at(session, dir, version, |contents| {
            *contents.entry_mut(name)? = entry.clone();
            Ok(())
        })
        .await?;
        Ok(entry)
    }

    /// Sets one user attribute on `name`.
    pub async fn set_user_metadata(
        &self,
        session: &Session,
        dir: &DirRef,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let modified = now_millis();
        self.modify(session, dir, |contents| {
            let entry = contents.entry_mut(name)?;
            entry.metadata.user.insert(key.to_string(), value.to_string());
            entry.metadata.modified = modified;
            Ok(())
        })
        .await
    }
}
