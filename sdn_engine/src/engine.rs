use std::{future::Future, sync::Arc};

use bytes::Bytes;
use sdn_core::{
    Address, DeleteProof, Error, Keypair, NetworkApi, PublicKey, PutCondition, RecordDraft,
    Result, StructuredRecord, TypeTag, XorName,
    record::{MAX_PAYLOAD_SIZE, RecordError},
};
use tracing::{debug, warn};

use crate::RetryPolicy;

/// A record as fetched, together with the exact stored bytes.
struct Fetched {
    record: StructuredRecord,
    bytes: Bytes,
}

impl Fetched {
    /// Guard that lets the network accept a successor of this record only
    /// if nobody else replaced it in the meantime.
    fn guard(&self) -> PutCondition {
        if self.record.type_tag.is_versioned() {
            PutCondition::Version(self.record.version)
        } else {
            PutCondition::ContentHash(*blake3::hash(&self.bytes).as_bytes())
        }
    }
}

/// Mediates every read and write of structured records.
///
/// The engine holds no per-record state; all coordination happens through
/// the network's conditional put, so one engine can be shared freely
/// between tasks.
#[derive(Debug, Clone)]
pub struct StructuredDataEngine {
    network: Arc<dyn NetworkApi>,
    retry: RetryPolicy,
}

impl StructuredDataEngine {
    pub fn new(network: Arc<dyn NetworkApi>) -> Self {
        Self {
            network,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn network(&self) -> &Arc<dyn NetworkApi> {
        &self.network
    }

    /// Creates a record at version 0 and returns its address.
    ///
    /// `signer` must be one of `owners`. Fails with `AlreadyExists` if the
    /// address derived from `(type_tag, name)` is occupied.
    pub async fn create(
        &self,
        signer: &Keypair,
        type_tag: TypeTag,
        name: XorName,
        owners: Vec<PublicKey>,
        payload: impl Into<Bytes>,
    ) -> Result<Address> {
        let payload = payload.into();
        check_payload(&payload)?;
        if !owners.contains(&signer.public_key()) {
            return Err(Error::NotOwner);
        }

        let record = StructuredRecord::new(type_tag, name, owners, payload)?.signed(signer);
        let address = record.address();
        self.network
            .put(&address, record.serialize(), PutCondition::Absent)
            .await?;
        debug!(%address, ?type_tag, "created record");
        Ok(address)
    }

    /// Fetches and verifies the record at `address`.
    ///
    /// A stored record that fails to decode, lives at the wrong address or
    /// carries a signature not backed by its owners is reported as
    /// `Corrupt`.
    pub async fn fetch(&self, address: &Address) -> Result<StructuredRecord> {
        Ok(self.fetch_raw(address).await?.record)
    }

    /// Like [`fetch`](Self::fetch) but maps an empty address to `None`.
    pub async fn try_fetch(&self, address: &Address) -> Result<Option<StructuredRecord>> {
        match self.fetch(address).await {
            Ok(record) => Ok(Some(record)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_raw(&self, address: &Address) -> Result<Fetched> {
        let bytes = self.network.get(address).await?.ok_or(Error::NotFound)?;
        let record = StructuredRecord::deserialize(bytes.clone())
            .map_err(|e| Error::Corrupt(e.to_string()))?;
        if record.address() != *address {
            return Err(Error::Corrupt(format!(
                "record for {} stored at {}",
                record.address(),
                address
            )));
        }
        record.verify().map_err(|e| Error::Corrupt(e.to_string()))?;
        Ok(Fetched { record, bytes })
    }

    /// Read-modify-write with automatic retry on version conflicts.
    ///
    /// `mutator` receives the current record and returns the next payload
    /// and owner set. It may run several times and must depend only on its
    /// argument. An error from the mutator aborts the update and is returned
    /// as is. After the retry budget is spent the result is
    /// `VersionConflict`.
    pub async fn update<F>(
        &self,
        signer: &Keypair,
        address: &Address,
        mutator: F,
    ) -> Result<StructuredRecord>
    where
        F: Fn(&StructuredRecord) -> Result<RecordDraft> + Send + Sync,
    {
        let signers = [signer];
        self.with_retry("update", address, || {
            self.attempt(&signers, address, None, &mutator)
        })
        .await
    }

    /// A single update attempt against a caller-known version.
    ///
    /// Fails with `VersionConflict` if the stored record is not at
    /// `expected_version` when fetched or when written; never retries.
    pub async fn update_at<F>(
        &self,
        signer: &Keypair,
        address: &Address,
        expected_version: u64,
        mutator: F,
    ) -> Result<StructuredRecord>
    where
        F: Fn(&StructuredRecord) -> Result<RecordDraft> + Send + Sync,
    {
        self.attempt(&[signer], address, Some(expected_version), &mutator)
            .await
    }

    /// Replaces the owner set with `new_owners` in the next version.
    ///
    /// Enough when `signer` alone is a majority of the current owners,
    /// which covers every single-owner record. Otherwise use
    /// [`transfer_ownership_with`](Self::transfer_ownership_with).
    pub async fn transfer_ownership(
        &self,
        signer: &Keypair,
        address: &Address,
        new_owners: Vec<PublicKey>,
    ) -> Result<StructuredRecord> {
        self.transfer_ownership_with(&[signer], address, new_owners)
            .await
    }

    /// Ownership transfer co-signed by several current owners.
    ///
    /// Signers that are not current owners are ignored; the ones that are
    /// must form a strict majority or the call fails with `NotOwner`.
    pub async fn transfer_ownership_with(
        &self,
        signers: &[&Keypair],
        address: &Address,
        new_owners: Vec<PublicKey>,
    ) -> Result<StructuredRecord> {
        let mutator = |current: &StructuredRecord| -> Result<RecordDraft> {
            Ok(current.draft().with_owners(new_owners.clone()))
        };
        self.with_retry("transfer", address, || {
            self.attempt(signers, address, None, &mutator)
        })
        .await
    }

    /// Deletes the record; `signer` must be a current owner.
    pub async fn delete(&self, signer: &Keypair, address: &Address) -> Result<()> {
        self.with_retry("delete", address, || async move {
            let current = self.fetch_raw(address).await?;
            if !current.record.is_owner(&signer.public_key()) {
                return Err(Error::NotOwner);
            }
            let version = current.record.version;
            let proof = DeleteProof::sign(signer, address, version, &current.bytes);
            self.network.delete(address, proof).await?;
            debug!(%address, version, "deleted record");
            Ok(())
        })
        .await
    }

    async fn attempt<F>(
        &self,
        signers: &[&Keypair],
        address: &Address,
        expected_version: Option<u64>,
        mutator: &F,
    ) -> Result<StructuredRecord>
    where
        F: Fn(&StructuredRecord) -> Result<RecordDraft> + Send + Sync,
    {
        let current = self.fetch_raw(address).await?;
        if let Some(expected) = expected_version
            && current.record.version != expected
        {
            return Err(Error::VersionConflict);
        }

        let owners: Vec<&Keypair> = signers
            .iter()
            .copied()
            .filter(|signer| current.record.is_owner(&signer.public_key()))
            .collect();
        if owners.is_empty() {
            return Err(Error::NotOwner);
        }

        let draft = mutator(&current.record)?;
        check_payload(&draft.payload)?;
        let mut next = current.record.next(draft)?;
        for signer in &owners {
            next.sign(signer);
        }
        match next.verify() {
            Ok(()) => {}
            Err(RecordError::MissingQuorum { valid, required }) => {
                debug!(%address, valid, required, "not enough owner signatures");
                return Err(Error::NotOwner);
            }
            Err(e) => return Err(e.into()),
        }

        self.network
            .put(address, next.serialize(), current.guard())
            .await?;
        debug!(%address, version = next.version, "stored record");
        Ok(next)
    }

    /// Runs `f` under this engine's retry policy, repeating it while it
    /// fails with a retryable error such as `VersionConflict`.
    ///
    /// For multi-step operations that pin a version with
    /// [`update_at`](Self::update_at) and must restart from a fresh read.
    pub async fn with_retry<T, F, Fut>(&self, op: &str, address: &Address, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            debug!(op, %address, attempt, "engine attempt");
            match f().await {
                Err(e) if e.is_retryable() => {
                    if attempt >= attempts {
                        warn!(op, %address, attempts, "giving up after repeated version conflicts");
                        return Err(e);
                    }
                    let delay = self.retry.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn check_payload(payload: &Bytes) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(())
}
