//! RedbNetwork - a local, persistent `NetworkApi` backed by redb.

use bytes::Bytes;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use sdn_core::{Address, DeleteProof, NetworkApi, NetworkError, PutCondition, admit_put};
use std::{path::Path, sync::Arc};

const TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("records");

/// Stores records in a single redb table keyed by address.
///
/// Every put runs its admission check inside the write transaction that
/// applies it; redb serialises write transactions, so guard and write are
/// atomic across tasks and processes sharing the database.
#[derive(Clone)]
pub struct RedbNetwork {
    db: Arc<Database>,
}

impl RedbNetwork {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let db = Database::create(path.join("network.redb"))?;

        // Create the table up front so a first read on a fresh database
        // does not fail with a missing-table error.
        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(TABLE)?;
            }
            write_txn.commit()?;
        }

        tracing::debug!(path = %path.display(), "opened redb network");
        Ok(Self { db: Arc::new(db) })
    }
}

impl std::fmt::Debug for RedbNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbNetwork").finish()
    }
}

fn join_error(op: &str, err: tokio::task::JoinError) -> NetworkError {
    NetworkError::Backend(anyhow::anyhow!("redb {op} task failed: {err}"))
}

fn storage_error(err: impl Into<redb::Error>) -> NetworkError {
    let err: redb::Error = err.into();
    NetworkError::Backend(err.into())
}

#[async_trait::async_trait]
impl NetworkApi for RedbNetwork {
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, NetworkError> {
        let db = self.db.clone();
        let key = *address.as_bytes();

        tokio::task::spawn_blocking(move || -> Result<Option<Bytes>, NetworkError> {
            let read_txn = db.begin_read().map_err(storage_error)?;
            let table = read_txn.open_table(TABLE).map_err(storage_error)?;
            let bytes = table
                .get(&key)
                .map_err(storage_error)?
                .map(|guard| Bytes::copy_from_slice(guard.value()));
            Ok(bytes)
        })
        .await
        .map_err(|e| join_error("read", e))?
    }

    async fn put(
        &self,
        address: &Address,
        bytes: Bytes,
        condition: PutCondition,
    ) -> Result<(), NetworkError> {
        let db = self.db.clone();
        let address = *address;

        tokio::task::spawn_blocking(move || -> Result<(), NetworkError> {
            let write_txn = db.begin_write().map_err(storage_error)?;
            {
                let mut table = write_txn.open_table(TABLE).map_err(storage_error)?;
                let current = table
                    .get(address.as_bytes())
                    .map_err(storage_error)?
                    .map(|guard| guard.value().to_vec());

                // Dropping the transaction on error aborts it.
                admit_put(&address, current.as_deref(), &bytes, condition)?;
                table
                    .insert(address.as_bytes(), bytes.as_ref())
                    .map_err(storage_error)?;
            }
            write_txn.commit().map_err(storage_error)?;
            tracing::trace!(%address, ?condition, "redb network put");
            Ok(())
        })
        .await
        .map_err(|e| join_error("write", e))?
    }

    async fn delete(&self, address: &Address, proof: DeleteProof) -> Result<(), NetworkError> {
        let db = self.db.clone();
        let address = *address;

        tokio::task::spawn_blocking(move || -> Result<(), NetworkError> {
            let write_txn = db.begin_write().map_err(storage_error)?;
            {
                let mut table = write_txn.open_table(TABLE).map_err(storage_error)?;
                let current = table
                    .get(address.as_bytes())
                    .map_err(storage_error)?
                    .map(|guard| guard.value().to_vec())
                    .ok_or(NetworkError::NotFound)?;
                proof.verify(&address, &current)?;
                table.remove(address.as_bytes()).map_err(storage_error)?;
            }
            write_txn.commit().map_err(storage_error)?;
            tracing::trace!(%address, "redb network delete");
            Ok(())
        })
        .await
        .map_err(|e| join_error("delete", e))?
    }
}
