//! The structured record: the network's only storage unit.
//!
//! ## Versioning
//!
//! - An **unversioned** record (`TypeTag::Unversioned`) always carries
//!   version 0. Overwrites are guarded by the content hash of the stored
//!   record, so a writer must prove it saw the current content.
//! - A **versioned** record (`TypeTag::Versioned`) starts at version 0 and
//!   every accepted write advances the version by exactly one.
//!
//! ## Ownership
//!
//! `owners` lists the keys allowed to mutate the record. A record whose
//! owner set changed in this version also carries `prev_owners`, the set
//! that authorised the transition. The authorising set is `prev_owners` when
//! present, else `owners`:
//!
//! - ordinary writes need one valid signature from the authorising set;
//! - ownership transitions need signatures from more than half of it.
//!
//! Any signature from a key outside the authorising set invalidates the
//! record.
//!
//! See [`wire`] for the binary layout.

use bytes::Bytes;

use crate::{Address, Keypair, PublicKey, Signature, XorName};

pub mod wire;

/// Maximum payload size of a single record.
pub const MAX_PAYLOAD_SIZE: usize = 102_400;

/// Maximum number of keys in `owners` or `prev_owners`, and of signatures.
pub const MAX_OWNERS: usize = 8;

const SIGN_DOMAIN: &[u8] = b"sdn/record/v1";

/// Record kind discriminator. The numeric values are part of the wire format.
#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeTag {
    /// A single snapshot guarded by content hash; version stays 0.
    Unversioned = 500,
    /// Each write advances the version by one.
    Versioned = 501,
}

/// An error that can occur when converting a `u64` to a `TypeTag`.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid type tag: {0}")]
pub struct TypeTagTryFromError(pub u64);

impl TypeTag {
    pub const UNVERSIONED_ID: u64 = 500;
    pub const VERSIONED_ID: u64 = 501;

    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    pub const fn is_versioned(self) -> bool {
        matches!(self, TypeTag::Versioned)
    }
}

impl TryFrom<u64> for TypeTag {
    type Error = TypeTagTryFromError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            Self::UNVERSIONED_ID => Ok(TypeTag::Unversioned),
            Self::VERSIONED_ID => Ok(TypeTag::Versioned),
            _ => Err(TypeTagTryFromError(value)),
        }
    }
}

/// Errors raised while building, decoding or verifying a record.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    #[error("{0}")]
    InvalidTypeTag(#[from] TypeTagTryFromError),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("insufficient bytes for deserialization")]
    InsufficientBytes,

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),

    #[error("record has no owners")]
    NoOwners,

    #[error("too many keys: {count} (max: {max})")]
    TooManyKeys { count: usize, max: usize },

    #[error("duplicate owner key")]
    DuplicateOwner,

    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unversioned record carries version {0}")]
    UnversionedVersion(u64),

    #[error("version counter overflow")]
    VersionOverflow,

    #[error("signature by a key outside the authorising owner set")]
    UnauthorisedSigner,

    #[error("more than one signature from the same key")]
    DuplicateSigner,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("not enough owner signatures: {valid} valid, {required} required")]
    MissingQuorum { valid: usize, required: usize },
}

/// A signed, owner-controlled record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRecord {
    pub type_tag: TypeTag,

    /// Caller-chosen name; together with `type_tag` it fixes the address.
    pub name: XorName,

    /// Always 0 for unversioned records.
    pub version: u64,

    pub owners: Vec<PublicKey>,

    /// Owner set that authorised an ownership change in this version;
    /// empty otherwise.
    pub prev_owners: Vec<PublicKey>,

    pub payload: Bytes,

    pub signatures: Vec<(PublicKey, Signature)>,
}

/// The mutable part of a record, as produced by an update mutator.
///
/// Version, prior-owner bookkeeping and signatures are filled in by
/// [`StructuredRecord::next`]; a mutator can only choose payload and owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub payload: Bytes,
    pub owners: Vec<PublicKey>,
}

impl RecordDraft {
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_owners(mut self, owners: Vec<PublicKey>) -> Self {
        self.owners = owners;
        self
    }
}

fn has_duplicates(keys: &[PublicKey]) -> bool {
    keys.iter()
        .enumerate()
        .any(|(i, key)| keys[i + 1..].contains(key))
}

fn same_key_set(a: &[PublicKey], b: &[PublicKey]) -> bool {
    a.len() == b.len() && a.iter().all(|key| b.contains(key))
}

impl StructuredRecord {
    /// Creates an unsigned record at version 0.
    pub fn new(
        type_tag: TypeTag,
        name: XorName,
        owners: Vec<PublicKey>,
        payload: Bytes,
    ) -> Result<Self, RecordError> {
        let record = Self {
            type_tag,
            name,
            version: 0,
            owners,
            prev_owners: Vec::new(),
            payload,
            signatures: Vec::new(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn address(&self) -> Address {
        Address::derive(self.type_tag, &self.name)
    }

    /// Structural checks that do not involve signatures.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.owners.is_empty() {
            return Err(RecordError::NoOwners);
        }
        for keys in [&self.owners, &self.prev_owners] {
            if keys.len() > MAX_OWNERS {
                return Err(RecordError::TooManyKeys {
                    count: keys.len(),
                    max: MAX_OWNERS,
                });
            }
            if has_duplicates(keys) {
                return Err(RecordError::DuplicateOwner);
            }
        }
        if self.signatures.len() > MAX_OWNERS {
            return Err(RecordError::TooManyKeys {
                count: self.signatures.len(),
                max: MAX_OWNERS,
            });
        }
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(RecordError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if !self.type_tag.is_versioned() && self.version != 0 {
            return Err(RecordError::UnversionedVersion(self.version));
        }
        Ok(())
    }

    /// Bytes covered by owner signatures.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            SIGN_DOMAIN.len()
                + 8
                + 32
                + 8
                + 2
                + 32 * (self.owners.len() + self.prev_owners.len())
                + 32,
        );
        buf.extend_from_slice(SIGN_DOMAIN);
        buf.extend_from_slice(&self.type_tag.as_u64().to_be_bytes());
        buf.extend_from_slice(&self.name);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.push(self.owners.len() as u8);
        for owner in &self.owners {
            buf.extend_from_slice(owner.as_bytes());
        }
        buf.push(self.prev_owners.len() as u8);
        for owner in &self.prev_owners {
            buf.extend_from_slice(owner.as_bytes());
        }
        buf.extend_from_slice(blake3::hash(&self.payload).as_bytes());
        buf
    }

    /// Adds (or replaces) the signature of `keypair`.
    pub fn sign(&mut self, keypair: &Keypair) {
        let signer = keypair.public_key();
        let signature = keypair.sign(&self.signing_bytes());
        self.signatures.retain(|(key, _)| *key != signer);
        self.signatures.push((signer, signature));
    }

    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign(keypair);
        self
    }

    /// The key set whose signatures authorise this version.
    pub fn authorising_owners(&self) -> &[PublicKey] {
        if self.prev_owners.is_empty() {
            &self.owners
        } else {
            &self.prev_owners
        }
    }

    /// Number of valid signatures this version needs.
    pub fn required_signatures(&self) -> usize {
        if self.prev_owners.is_empty() {
            1
        } else {
            self.prev_owners.len() / 2 + 1
        }
    }

    pub fn is_owner(&self, key: &PublicKey) -> bool {
        self.owners.contains(key)
    }

    /// Full signature check against the authorising owner set.
    pub fn verify(&self) -> Result<(), RecordError> {
        self.validate()?;

        let authorising = self.authorising_owners();
        let message = self.signing_bytes();
        let mut seen: Vec<PublicKey> = Vec::with_capacity(self.signatures.len());

        for (signer, signature) in &self.signatures {
            if !authorising.contains(signer) {
                return Err(RecordError::UnauthorisedSigner);
            }
            if seen.contains(signer) {
                return Err(RecordError::DuplicateSigner);
            }
            if !signer.verify(&message, signature) {
                return Err(RecordError::InvalidSignature);
            }
            seen.push(*signer);
        }

        let required = self.required_signatures();
        if seen.len() < required {
            return Err(RecordError::MissingQuorum {
                valid: seen.len(),
                required,
            });
        }
        Ok(())
    }

    /// The mutable part of this record, as input for a mutator.
    pub fn draft(&self) -> RecordDraft {
        RecordDraft {
            payload: self.payload.clone(),
            owners: self.owners.clone(),
        }
    }

    /// Builds the unsigned successor of this record from `draft`.
    ///
    /// Versioned records advance by exactly one; unversioned records keep
    /// version 0. If the owner set changes, the current owners become
    /// `prev_owners` of the successor.
    pub fn next(&self, draft: RecordDraft) -> Result<Self, RecordError> {
        let version = if self.type_tag.is_versioned() {
            self.version
                .checked_add(1)
                .ok_or(RecordError::VersionOverflow)?
        } else {
            self.version
        };
        let prev_owners = if same_key_set(&draft.owners, &self.owners) {
            Vec::new()
        } else {
            self.owners.clone()
        };

        let record = Self {
            type_tag: self.type_tag,
            name: self.name,
            version,
            owners: draft.owners,
            prev_owners,
            payload: draft.payload,
            signatures: Vec::new(),
        };
        record.validate()?;
        Ok(record)
    }

    /// BLAKE3 hash of the serialized record, used as the overwrite guard
    /// for unversioned records.
    pub fn content_hash(&self) -> [u8; 32] {
        *blake3::hash(&self.serialize()).as_bytes()
    }
}
