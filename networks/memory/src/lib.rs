//! MemoryNetwork - an in-process `NetworkApi` for tests and local use.

use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use sdn_core::{Address, DeleteProof, NetworkApi, NetworkError, PutCondition, admit_put};

/// Keeps every record in a concurrent map keyed by address.
///
/// Guard evaluation and write happen while holding the shard lock of the
/// target address, so concurrent conditional puts are linearisable.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    records: DashMap<Address, Bytes>,
}

impl MemoryNetwork {
    /// Creates a new, empty `MemoryNetwork`.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stores `bytes` at `address` without any admission checks.
    ///
    /// Lets tests plant records a well-behaved network would never accept.
    pub fn insert_unchecked(&self, address: Address, bytes: Bytes) {
        self.records.insert(address, bytes);
    }
}

#[async_trait::async_trait]
impl NetworkApi for MemoryNetwork {
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, NetworkError> {
        Ok(self.records.get(address).map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        address: &Address,
        bytes: Bytes,
        condition: PutCondition,
    ) -> Result<(), NetworkError> {
        match self.records.entry(*address) {
            Entry::Occupied(mut entry) => {
                admit_put(address, Some(&entry.get()[..]), &bytes, condition)?;
                entry.insert(bytes);
            }
            Entry::Vacant(entry) => {
                admit_put(address, None, &bytes, condition)?;
                entry.insert(bytes);
            }
        }
        tracing::trace!(%address, ?condition, "memory network put");
        Ok(())
    }

    async fn delete(&self, address: &Address, proof: DeleteProof) -> Result<(), NetworkError> {
        match self.records.entry(*address) {
            Entry::Occupied(entry) => {
                proof.verify(address, entry.get())?;
                entry.remove();
                tracing::trace!(%address, "memory network delete");
                Ok(())
            }
            Entry::Vacant(_) => Err(NetworkError::NotFound),
        }
    }
}
