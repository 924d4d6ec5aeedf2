//! Test utilities for `NetworkApi` implementations.
//!
//! # Usage
//!
//! In your backend crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! sdn_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use sdn_core::testutil::NetworkTests;
//!
//! #[tokio::test]
//! async fn test_my_network() {
//!     let network = MyNetwork::new(...);
//!     NetworkTests::new(&network).run_all().await.unwrap();
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, ensure};
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;

use crate::{
    Address, DeleteProof, Keypair, NetworkApi, NetworkError, PutCondition, StructuredRecord,
    TypeTag, XorName,
};

/// Contract tests every network backend must pass.
pub struct NetworkTests<'a, N> {
    network: &'a N,
    owner: Keypair,
    intruder: Keypair,
}

impl<'a, N: NetworkApi> NetworkTests<'a, N> {
    pub fn new(network: &'a N) -> Self {
        Self {
            network,
            owner: Keypair::generate(),
            intruder: Keypair::generate(),
        }
    }

    fn fresh_name() -> XorName {
        rand::rng().random()
    }

    fn record(&self, type_tag: TypeTag, payload: &'static [u8]) -> StructuredRecord {
        StructuredRecord {
            type_tag,
            name: Self::fresh_name(),
            version: 0,
            owners: vec![self.owner.public_key()],
            prev_owners: Vec::new(),
            payload: Bytes::from_static(payload),
            signatures: Vec::new(),
        }
        .signed(&self.owner)
    }

    /// Run all tests.
    pub async fn run_all(&self) -> anyhow::Result<()> {
        self.test_get_missing().await?;
        self.test_create_then_get().await?;
        self.test_create_twice().await?;
        self.test_versioned_update().await?;
        self.test_stale_version().await?;
        self.test_unversioned_content_guard().await?;
        self.test_non_owner_put().await?;
        self.test_wrong_address().await?;
        self.test_delete().await?;
        self.test_delete_by_non_owner().await?;
        self.test_delete_proof_not_replayable().await?;
        Ok(())
    }

    pub async fn test_get_missing(&self) -> anyhow::Result<()> {
        let address = Address::derive(TypeTag::Versioned, &Self::fresh_name());
        ensure!(
            self.network.get(&address).await?.is_none(),
            "unknown address should be empty"
        );
        Ok(())
    }

    pub async fn test_create_then_get(&self) -> anyhow::Result<()> {
        let record = self.record(TypeTag::Versioned, b"created");
        let address = record.address();
        let bytes = record.serialize();

        self.network
            .put(&address, bytes.clone(), PutCondition::Absent)
            .await?;
        let stored = self
            .network
            .get(&address)
            .await?
            .context("record should exist after create")?;
        ensure!(stored == bytes, "stored bytes should match");
        Ok(())
    }

    pub async fn test_create_twice(&self) -> anyhow::Result<()> {
        let record = self.record(TypeTag::Unversioned, b"once");
        let address = record.address();

        self.network
            .put(&address, record.serialize(), PutCondition::Absent)
            .await?;
        let second = self
            .network
            .put(&address, record.serialize(), PutCondition::Absent)
            .await;
        ensure!(
            matches!(second, Err(NetworkError::AlreadyExists)),
            "second create should fail with AlreadyExists, got {second:?}"
        );
        Ok(())
    }

    pub async fn test_versioned_update(&self) -> anyhow::Result<()> {
        let first = self.record(TypeTag::Versioned, b"v0");
        let address = first.address();
        self.network
            .put(&address, first.serialize(), PutCondition::Absent)
            .await?;

        let second = first
            .next(first.draft().with_payload(&b"v1"[..]))?
            .signed(&self.owner);
        self.network
            .put(&address, second.serialize(), PutCondition::Version(0))
            .await?;

        let stored = self
            .network
            .get(&address)
            .await?
            .context("record should exist")?;
        let (_, version) = StructuredRecord::peek_version(&stored)?;
        ensure!(version == 1, "version should advance to 1, got {version}");
        Ok(())
    }

    pub async fn test_stale_version(&self) -> anyhow::Result<()> {
        let first = self.record(TypeTag::Versioned, b"v0");
        let address = first.address();
        self.network
            .put(&address, first.serialize(), PutCondition::Absent)
            .await?;

        let a = first
            .next(first.draft().with_payload(&b"writer a"[..]))?
            .signed(&self.owner);
        let b = first
            .next(first.draft().with_payload(&b"writer b"[..]))?
            .signed(&self.owner);

        self.network
            .put(&address, a.serialize(), PutCondition::Version(0))
            .await?;
        let lost = self
            .network
            .put(&address, b.serialize(), PutCondition::Version(0))
            .await;
        ensure!(
            matches!(lost, Err(NetworkError::VersionConflict)),
            "second writer should see VersionConflict, got {lost:?}"
        );

        let stored = self.network.get(&address).await?.context("record")?;
        ensure!(stored == a.serialize(), "first writer's update should win");
        Ok(())
    }

    pub async fn test_unversioned_content_guard(&self) -> anyhow::Result<()> {
        let first = self.record(TypeTag::Unversioned, b"snapshot 1");
        let address = first.address();
        self.network
            .put(&address, first.serialize(), PutCondition::Absent)
            .await?;

        let replacement = first
            .next(first.draft().with_payload(&b"snapshot 2"[..]))?
            .signed(&self.owner);
        let stale = self
            .network
            .put(
                &address,
                replacement.serialize(),
                PutCondition::ContentHash([0u8; 32]),
            )
            .await;
        ensure!(
            matches!(stale, Err(NetworkError::VersionConflict)),
            "wrong content hash should conflict, got {stale:?}"
        );

        self.network
            .put(
                &address,
                replacement.serialize(),
                PutCondition::ContentHash(first.content_hash()),
            )
            .await?;
        let stored = self.network.get(&address).await?.context("record")?;
        ensure!(stored == replacement.serialize(), "replacement stored");
        Ok(())
    }

    pub async fn test_non_owner_put(&self) -> anyhow::Result<()> {
        let first = self.record(TypeTag::Versioned, b"mine");
        let address = first.address();
        self.network
            .put(&address, first.serialize(), PutCondition::Absent)
            .await?;

        let forged = first
            .next(first.draft().with_payload(&b"theirs"[..]))?
            .signed(&self.intruder);
        let result = self
            .network
            .put(&address, forged.serialize(), PutCondition::Version(0))
            .await;
        ensure!(
            matches!(result, Err(NetworkError::NotOwner)),
            "non-owner write should fail with NotOwner, got {result:?}"
        );
        Ok(())
    }

    pub async fn test_wrong_address(&self) -> anyhow::Result<()> {
        let record = self.record(TypeTag::Versioned, b"misplaced");
        let elsewhere = Address::derive(TypeTag::Versioned, &Self::fresh_name());
        let result = self
            .network
            .put(&elsewhere, record.serialize(), PutCondition::Absent)
            .await;
        ensure!(
            matches!(result, Err(NetworkError::Rejected(_))),
            "record stored under a foreign address should be rejected, got {result:?}"
        );
        Ok(())
    }

    pub async fn test_delete(&self) -> anyhow::Result<()> {
        let record = self.record(TypeTag::Versioned, b"short lived");
        let address = record.address();
        let bytes = record.serialize();
        self.network
            .put(&address, bytes.clone(), PutCondition::Absent)
            .await?;

        self.network
            .delete(&address, DeleteProof::sign(&self.owner, &address, 0, &bytes))
            .await?;
        ensure!(
            self.network.get(&address).await?.is_none(),
            "record should be gone after delete"
        );

        let again = self
            .network
            .delete(&address, DeleteProof::sign(&self.owner, &address, 0, &bytes))
            .await;
        ensure!(
            matches!(again, Err(NetworkError::NotFound)),
            "deleting twice should fail with NotFound, got {again:?}"
        );
        Ok(())
    }

    pub async fn test_delete_by_non_owner(&self) -> anyhow::Result<()> {
        let record = self.record(TypeTag::Versioned, b"keep me");
        let address = record.address();
        let bytes = record.serialize();
        self.network
            .put(&address, bytes.clone(), PutCondition::Absent)
            .await?;

        let result = self
            .network
            .delete(&address, DeleteProof::sign(&self.intruder, &address, 0, &bytes))
            .await;
        ensure!(
            matches!(result, Err(NetworkError::NotOwner)),
            "non-owner delete should fail with NotOwner, got {result:?}"
        );
        ensure!(
            self.network.get(&address).await?.is_some(),
            "record should survive a rejected delete"
        );
        Ok(())
    }

    pub async fn test_delete_proof_not_replayable(&self) -> anyhow::Result<()> {
        let first = self.record(TypeTag::Versioned, b"first life");
        let address = first.address();
        let first_bytes = first.serialize();
        self.network
            .put(&address, first_bytes.clone(), PutCondition::Absent)
            .await?;
        let proof = DeleteProof::sign(&self.owner, &address, 0, &first_bytes);
        self.network.delete(&address, proof).await?;

        // recreated at the same address and version with other content
        let second = StructuredRecord {
            payload: Bytes::from_static(b"second life"),
            signatures: Vec::new(),
            ..first
        }
        .signed(&self.owner);
        self.network
            .put(&address, second.serialize(), PutCondition::Absent)
            .await?;

        let replayed = self.network.delete(&address, proof).await;
        ensure!(
            matches!(replayed, Err(NetworkError::VersionConflict)),
            "an old delete proof should not remove a recreated record, got {replayed:?}"
        );
        ensure!(
            self.network.get(&address).await?.is_some(),
            "recreated record should survive the replayed proof"
        );
        Ok(())
    }
}

/// Wraps a network and fails the first `conflicts` guarded updates with
/// [`NetworkError::VersionConflict`] without touching the inner network.
///
/// Creates (`PutCondition::Absent`) pass through untouched.
#[derive(Debug)]
pub struct ConflictingNetwork<N> {
    inner: N,
    remaining: AtomicUsize,
    puts: AtomicUsize,
}

impl<N> ConflictingNetwork<N> {
    pub fn new(inner: N, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
            puts: AtomicUsize::new(0),
        }
    }

    /// Number of guarded updates attempted so far, including injected failures.
    pub fn update_attempts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }
}

#[async_trait]
impl<N: NetworkApi> NetworkApi for ConflictingNetwork<N> {
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, NetworkError> {
        self.inner.get(address).await
    }

    async fn put(
        &self,
        address: &Address,
        bytes: Bytes,
        condition: PutCondition,
    ) -> Result<(), NetworkError> {
        if condition != PutCondition::Absent {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let injected = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(NetworkError::VersionConflict);
            }
        }
        self.inner.put(address, bytes, condition).await
    }

    async fn delete(&self, address: &Address, proof: DeleteProof) -> Result<(), NetworkError> {
        self.inner.delete(address, proof).await
    }
}
