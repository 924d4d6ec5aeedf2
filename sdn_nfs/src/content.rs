//! File content storage.
//!
//! Small files live inline in their directory entry. Larger ones are cut
//! into `chunk_size` pieces, each stored as its own unversioned record:
//!
//! ```text
//! key     = blake3::derive_key("sdn/nfs/chunk", plain)
//! payload = encrypt(key, plain)            (synthetic nonce)
//! name    = blake3(payload)
//! ```
//!
//! Identical chunks therefore land at identical addresses, and writing a
//! chunk that already exists is a no-op.
//!
//! A chunk list longer than [`MAX_LISTED_CHUNKS`] would bloat the entry,
//! so it is CBOR-encoded and stored as content in turn, as many times as
//! needed. The entry then carries only the top layer.

use std::convert::Infallible;

use bytes::{Bytes, BytesMut};
use futures::future::try_join_all;
use sdn_core::{Error, Result, Session, TypeTag, crypto};
use sdn_engine::StructuredDataEngine;

use crate::dir::{ChunkRef, FileContent, FileRef};

const CHUNK_KEY_CONTEXT: &str = "sdn/nfs/chunk";

/// Longest chunk list kept in a directory entry.
pub const MAX_LISTED_CHUNKS: usize = 64;

/// Chunk lists are split into pieces of at least this size so every layer
/// is much shorter than the one below it.
const MIN_LIST_CHUNK_SIZE: usize = 4096;

/// Deepest list nesting a reader will follow.
const MAX_LEVELS: u32 = 8;

async fn store_chunk(
    engine: &StructuredDataEngine,
    session: &Session,
    plain: &[u8],
) -> Result<ChunkRef> {
    let key = blake3::derive_key(CHUNK_KEY_CONTEXT, plain);
    let sealed = crypto::encrypt(&key, plain)?;
    let name = *blake3::hash(&sealed).as_bytes();

    let address = match engine
        .create(
            session.keypair(),
            TypeTag::Unversioned,
            name,
            vec![session.public_key()],
            sealed,
        )
        .await
    {
        Ok(address) => address,
        Err(Error::AlreadyExists) => {
            let address = sdn_core::Address::derive(TypeTag::Unversioned, &name);
            tracing::trace!(%address, "chunk already stored");
            address
        }
        Err(e) => return Err(e),
    };
    Ok(ChunkRef { address, key })
}

async fn store_chunks(
    engine: &StructuredDataEngine,
    session: &Session,
    chunk_size: usize,
    content: &[u8],
) -> Result<Vec<ChunkRef>> {
    try_join_all(
        content
            .chunks(chunk_size)
            .map(|piece| store_chunk(engine, session, piece)),
    )
    .await
}

async fn load_chunk(
    engine: &StructuredDataEngine,
    index: usize,
    chunk: &ChunkRef,
) -> Result<Bytes> {
    let record = engine
        .try_fetch(&chunk.address)
        .await?
        .ok_or(Error::IncompleteContent { index })?;

    if blake3::hash(&record.payload).as_bytes() != &record.name {
        return Err(Error::Corrupt(format!(
            "chunk {index} does not match its address"
        )));
    }
    let plain = crypto::decrypt(&chunk.key, &record.payload)
        .map_err(|_| Error::Corrupt(format!("chunk {index} does not decrypt")))?;
    if blake3::derive_key(CHUNK_KEY_CONTEXT, &plain) != chunk.key {
        return Err(Error::Corrupt(format!(
            "chunk {index} does not match its key"
        )));
    }
    Ok(plain.into())
}

/// Loads and concatenates `chunks`. The buffer is sized from what was
/// actually loaded, never from a size claimed by the entry.
async fn load_chunks(engine: &StructuredDataEngine, chunks: &[ChunkRef]) -> Result<Bytes> {
    let pieces = try_join_all(
        chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| load_chunk(engine, index, chunk)),
    )
    .await?;
    let mut buf = BytesMut::with_capacity(pieces.iter().map(Bytes::len).sum());
    for piece in pieces {
        buf.extend_from_slice(&piece);
    }
    Ok(buf.freeze())
}

fn decode_list(bytes: &[u8]) -> Result<Vec<ChunkRef>> {
    minicbor::decode(bytes).map_err(|e| Error::Corrupt(format!("invalid chunk list: {e}")))
}

/// Stores `content` and returns the reference to put into a file entry.
pub(crate) async fn write_content(
    engine: &StructuredDataEngine,
    session: &Session,
    chunk_size: usize,
    inline_threshold: usize,
    content: &[u8],
) -> Result<FileRef> {
    let size = content.len() as u64;
    if content.len() <= inline_threshold {
        return Ok(FileRef {
            size,
            content: FileContent::Inline(content.to_vec()),
        });
    }

    let mut chunks = store_chunks(engine, session, chunk_size, content).await?;
    tracing::debug!(size, chunks = chunks.len(), "stored chunked file");
    if chunks.len() <= MAX_LISTED_CHUNKS {
        return Ok(FileRef {
            size,
            content: FileContent::Chunks(chunks),
        });
    }

    let list_chunk_size = chunk_size.max(MIN_LIST_CHUNK_SIZE);
    let mut levels = 0;
    while chunks.len() > MAX_LISTED_CHUNKS {
        let list = minicbor::to_vec(&chunks)
            .map_err(|e: minicbor::encode::Error<Infallible>| Error::Malformed(e.to_string()))?;
        chunks = store_chunks(engine, session, list_chunk_size, &list).await?;
        levels += 1;
        tracing::debug!(levels, list_bytes = list.len(), chunks = chunks.len(), "stored chunk list");
    }
    Ok(FileRef {
        size,
        content: FileContent::Indirect { levels, chunks },
    })
}

/// Reassembles a file. A missing chunk is `IncompleteContent` with its
/// index within the layer it belongs to; never returns partial data.
pub(crate) async fn read_content(engine: &StructuredDataEngine, file: &FileRef) -> Result<Bytes> {
    let content = match &file.content {
        FileContent::Inline(bytes) => Bytes::copy_from_slice(bytes),
        FileContent::Chunks(chunks) => load_chunks(engine, chunks).await?,
        FileContent::Indirect { levels, chunks } => {
            if !(1..=MAX_LEVELS).contains(levels) {
                return Err(Error::Corrupt(format!(
                    "chunk list nesting of {levels} levels"
                )));
            }
            let mut list = load_chunks(engine, chunks).await?;
            for _ in 1..*levels {
                list = load_chunks(engine, &decode_list(&list)?).await?;
            }
            load_chunks(engine, &decode_list(&list)?).await?
        }
    };

    if content.len() as u64 != file.size {
        return Err(Error::Corrupt(format!(
            "file content is {} bytes, expected {}",
            content.len(),
            file.size
        )));
    }
    Ok(content)
}
