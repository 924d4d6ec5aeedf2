//! The Network Accessor contract.
//!
//! The network stores opaque record bytes under their address and offers a
//! single concurrency primitive: a conditional `put` that succeeds only if
//! the stored state still matches what the writer derived its update from.
//! There are no multi-address transactions.
//!
//! Backends share the admission rules in this module ([`admit_put`],
//! [`DeleteProof::verify`]) so that every implementation enforces the same
//! ownership and version invariants. A backend must evaluate the rules and
//! apply the write atomically with respect to other writers of the same
//! address.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::{Address, Keypair, PublicKey, Signature, StructuredRecord};

const DELETE_DOMAIN: &[u8] = b"sdn/delete/v1";

/// Failures reported by a network backend.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("no record at address")]
    NotFound,

    #[error("address already occupied")]
    AlreadyExists,

    #[error("stored record changed since it was read")]
    VersionConflict,

    #[error("write not authorised by the record owners")]
    NotOwner,

    #[error("record rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Precondition attached to a `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// The address must be empty (create).
    Absent,
    /// The stored record must be at this version (versioned records).
    Version(u64),
    /// The stored record bytes must hash to this value (unversioned records).
    ContentHash([u8; 32]),
}

impl PutCondition {
    /// Evaluates the guard against the bytes currently stored at the target.
    pub fn check(&self, current: Option<&[u8]>) -> Result<(), NetworkError> {
        match (self, current) {
            (PutCondition::Absent, None) => Ok(()),
            (PutCondition::Absent, Some(_)) => Err(NetworkError::AlreadyExists),
            (_, None) => Err(NetworkError::NotFound),
            (PutCondition::Version(expected), Some(bytes)) => {
                let (_, stored) = StructuredRecord::peek_version(bytes)
                    .map_err(|e| NetworkError::Backend(anyhow::anyhow!("stored record: {e}")))?;
                if stored == *expected {
                    Ok(())
                } else {
                    Err(NetworkError::VersionConflict)
                }
            }
            (PutCondition::ContentHash(expected), Some(bytes)) => {
                if blake3::hash(bytes).as_bytes() == expected {
                    Ok(())
                } else {
                    Err(NetworkError::VersionConflict)
                }
            }
        }
    }
}

/// Decides whether `incoming` may replace `current` at `address`.
///
/// Checks, in order: the record decodes and lives at `address`; its
/// signatures satisfy its own authorising set; the guard holds; and the
/// authorising set equals the owners of the stored record (or, for a new
/// record, that no prior owners are claimed). For versioned records the
/// incoming version must be the stored version plus one.
pub fn admit_put(
    address: &Address,
    current: Option<&[u8]>,
    incoming: &Bytes,
    condition: PutCondition,
) -> Result<(), NetworkError> {
    let result = check_put(address, current, incoming, condition);
    if let Err(err) = &result {
        trace!(%address, ?condition, %err, "put not admitted");
    }
    result
}

fn check_put(
    address: &Address,
    current: Option<&[u8]>,
    incoming: &Bytes,
    condition: PutCondition,
) -> Result<(), NetworkError> {
    let record = StructuredRecord::deserialize(incoming.clone())
        .map_err(|e| NetworkError::Rejected(e.to_string()))?;
    if record.address() != *address {
        return Err(NetworkError::Rejected(format!(
            "record belongs at {}, not {}",
            record.address(),
            address
        )));
    }
    record.verify().map_err(|_| NetworkError::NotOwner)?;

    condition.check(current)?;

    match current {
        None => {
            if !record.prev_owners.is_empty() || record.version != 0 {
                return Err(NetworkError::Rejected(
                    "new records start at version 0 without prior owners".into(),
                ));
            }
        }
        Some(bytes) => {
            let stored = StructuredRecord::deserialize(Bytes::copy_from_slice(bytes))
                .map_err(|e| NetworkError::Backend(anyhow::anyhow!("stored record: {e}")))?;
            if stored.type_tag != record.type_tag {
                return Err(NetworkError::Rejected("type tag changed".into()));
            }
            let authorising = record.authorising_owners();
            let same_owners = authorising.len() == stored.owners.len()
                && authorising.iter().all(|key| stored.owners.contains(key));
            if !same_owners {
                return Err(NetworkError::NotOwner);
            }
            let expected_version = if stored.type_tag.is_versioned() {
                stored.version + 1
            } else {
                stored.version
            };
            if record.version != expected_version {
                return Err(NetworkError::VersionConflict);
            }
        }
    }
    Ok(())
}

/// Owner authorisation for deleting one specific stored record.
///
/// The proof names both the version and the BLAKE3 hash of the stored
/// bytes, so it cannot be replayed against a later record that reuses the
/// address and version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteProof {
    pub signer: PublicKey,
    pub version: u64,
    pub content_hash: [u8; 32],
    pub signature: Signature,
}

impl DeleteProof {
    pub fn signing_bytes(address: &Address, version: u64, content_hash: &[u8; 32]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DELETE_DOMAIN.len() + 32 + 8 + 32);
        buf.extend_from_slice(DELETE_DOMAIN);
        buf.extend_from_slice(address.as_bytes());
        buf.extend_from_slice(&version.to_be_bytes());
        buf.extend_from_slice(content_hash);
        buf
    }

    /// Signs the deletion of the record currently stored as `stored`.
    pub fn sign(keypair: &Keypair, address: &Address, version: u64, stored: &[u8]) -> Self {
        let content_hash = *blake3::hash(stored).as_bytes();
        Self {
            signer: keypair.public_key(),
            version,
            content_hash,
            signature: keypair.sign(&Self::signing_bytes(address, version, &content_hash)),
        }
    }

    /// Checks this proof against the stored record bytes.
    pub fn verify(&self, address: &Address, current: &[u8]) -> Result<(), NetworkError> {
        let result = self.check(address, current);
        if let Err(err) = &result {
            trace!(%address, version = self.version, %err, "delete not admitted");
        }
        result
    }

    fn check(&self, address: &Address, current: &[u8]) -> Result<(), NetworkError> {
        let stored = StructuredRecord::deserialize(Bytes::copy_from_slice(current))
            .map_err(|e| NetworkError::Backend(anyhow::anyhow!("stored record: {e}")))?;
        if !stored.is_owner(&self.signer) {
            return Err(NetworkError::NotOwner);
        }
        let message = Self::signing_bytes(address, self.version, &self.content_hash);
        if !self.signer.verify(&message, &self.signature) {
            return Err(NetworkError::NotOwner);
        }
        if stored.version != self.version || blake3::hash(current).as_bytes() != &self.content_hash
        {
            return Err(NetworkError::VersionConflict);
        }
        Ok(())
    }
}

/// Interface to the content-addressed record store.
///
/// # Semantics
///
/// - `get` returns the stored bytes, or `Ok(None)` when the address is empty.
/// - `put` stores `bytes` only if [`admit_put`] accepts them against the
///   current state under `condition`; guard evaluation and write are atomic.
/// - `delete` removes the record if [`DeleteProof::verify`] accepts the proof.
///
/// Implementations treat calls as blocking from the caller's perspective and
/// must be safe to call from many tasks at once.
#[async_trait]
pub trait NetworkApi: std::fmt::Debug + Send + Sync {
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, NetworkError>;

    async fn put(
        &self,
        address: &Address,
        bytes: Bytes,
        condition: PutCondition,
    ) -> Result<(), NetworkError>;

    async fn delete(&self, address: &Address, proof: DeleteProof) -> Result<(), NetworkError>;
}

#[async_trait]
impl<T: NetworkApi + ?Sized + Send + Sync> NetworkApi for std::sync::Arc<T> {
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, NetworkError> {
        (**self).get(address).await
    }

    async fn put(
        &self,
        address: &Address,
        bytes: Bytes,
        condition: PutCondition,
    ) -> Result<(), NetworkError> {
        (**self).put(address, bytes, condition).await
    }

    async fn delete(&self, address: &Address, proof: DeleteProof) -> Result<(), NetworkError> {
        (**self).delete(address, proof).await
    }
}

#[async_trait]
impl<T: NetworkApi + ?Sized + Send + Sync> NetworkApi for Box<T> {
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, NetworkError> {
        (**self).get(address).await
    }

    async fn put(
        &self,
        address: &Address,
        bytes: Bytes,
        condition: PutCondition,
    ) -> Result<(), NetworkError> {
        (**self).put(address, bytes, condition).await
    }

    async fn delete(&self, address: &Address, proof: DeleteProof) -> Result<(), NetworkError> {
        (**self).delete(address, proof).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeTag;

    fn record(owner: &Keypair) -> StructuredRecord {
        StructuredRecord::new(
            TypeTag::Versioned,
            [3u8; 32],
            vec![owner.public_key()],
            Bytes::from_static(b"v0"),
        )
        .unwrap()
        .signed(owner)
    }

    #[test]
    fn absent_guard() {
        assert!(PutCondition::Absent.check(None).is_ok());
        assert!(matches!(
            PutCondition::Absent.check(Some(&b"x"[..])),
            Err(NetworkError::AlreadyExists)
        ));
        assert!(matches!(
            PutCondition::Version(0).check(None),
            Err(NetworkError::NotFound)
        ));
    }

    #[test]
    fn version_guard() {
        let owner = Keypair::from_seed(&[1; 32]);
        let stored = record(&owner).serialize();
        assert!(PutCondition::Version(0).check(Some(&stored[..])).is_ok());
        assert!(matches!(
            PutCondition::Version(1).check(Some(&stored[..])),
            Err(NetworkError::VersionConflict)
        ));
    }

    #[test]
    fn admit_sequence() {
        let owner = Keypair::from_seed(&[1; 32]);
        let first = record(&owner);
        let address = first.address();
        let first_bytes = first.serialize();
        admit_put(&address, None, &first_bytes, PutCondition::Absent).unwrap();

        let second = first
            .next(first.draft().with_payload(&b"v1"[..]))
            .unwrap()
            .signed(&owner)
            .serialize();
        admit_put(&address, Some(&first_bytes[..]), &second, PutCondition::Version(0)).unwrap();

        // replaying version 0 on top of itself is not a valid successor
        assert!(matches!(
            admit_put(&address, Some(&first_bytes[..]), &first_bytes, PutCondition::Version(0)),
            Err(NetworkError::VersionConflict)
        ));
    }

    #[test]
    fn admit_rejects_foreign_signer() {
        let owner = Keypair::from_seed(&[1; 32]);
        let intruder = Keypair::from_seed(&[2; 32]);
        let first = record(&owner);
        let address = first.address();
        let stored = first.serialize();

        // intruder claims ownership of the next version and signs it
        let hijack = first
            .next(first.draft().with_payload(&b"mine"[..]))
            .map(|mut r| {
                r.owners = vec![intruder.public_key()];
                r
            })
            .unwrap()
            .signed(&intruder)
            .serialize();
        assert!(matches!(
            admit_put(&address, Some(&stored[..]), &hijack, PutCondition::Version(0)),
            Err(NetworkError::NotOwner)
        ));
    }

    #[test]
    fn delete_proof() {
        let owner = Keypair::from_seed(&[1; 32]);
        let intruder = Keypair::from_seed(&[2; 32]);
        let stored = record(&owner);
        let address = stored.address();
        let bytes = stored.serialize();

        assert!(DeleteProof::sign(&owner, &address, 0, &bytes).verify(&address, &bytes).is_ok());
        assert!(matches!(
            DeleteProof::sign(&intruder, &address, 0, &bytes).verify(&address, &bytes),
            Err(NetworkError::NotOwner)
        ));
        assert!(matches!(
            DeleteProof::sign(&owner, &address, 3, &bytes).verify(&address, &bytes),
            Err(NetworkError::VersionConflict)
        ));

        let mut forged = DeleteProof::sign(&owner, &address, 0, &bytes);
        forged.content_hash = [0; 32];
        assert!(matches!(
            forged.verify(&address, &bytes),
            Err(NetworkError::NotOwner)
        ));
    }

    #[test]
    fn delete_proof_does_not_carry_over_to_a_recreated_record() {
        let owner = Keypair::from_seed(&[1; 32]);
        let first = record(&owner);
        let address = first.address();
        let first_bytes = first.serialize();
        let proof = DeleteProof::sign(&owner, &address, 0, &first_bytes);
        assert!(proof.verify(&address, &first_bytes).is_ok());

        // same address, same version 0, different content
        let recreated = StructuredRecord::new(
            TypeTag::Versioned,
            [3u8; 32],
            vec![owner.public_key()],
            Bytes::from_static(b"registered again"),
        )
        .unwrap()
        .signed(&owner);
        assert_eq!(recreated.address(), address);
        assert!(matches!(
            proof.verify(&address, &recreated.serialize()),
            Err(NetworkError::VersionConflict)
        ));
    }
}
