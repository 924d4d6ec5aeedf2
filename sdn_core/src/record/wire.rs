//! Binary layout of a [`StructuredRecord`].
//!
//! | Field | Size (bytes) | Description |
//! |---|---|---|
//! | Magic | 4 | `SDR1` |
//! | Type tag | 8 | Big-endian `u64`, `500` or `501` |
//! | Name | 32 | Caller-chosen record name |
//! | Version | 8 | Big-endian `u64` |
//! | Owner count | 1 | `n`, 1..=8 |
//! | Owners | 32 * n | Ed25519 public keys |
//! | Prev owner count | 1 | `m`, 0..=8 |
//! | Prev owners | 32 * m | Ed25519 public keys |
//! | Payload length | 4 | Big-endian `u32` |
//! | Payload | Variable | At most `MAX_PAYLOAD_SIZE` |
//! | Signature count | 1 | `k` |
//! | Signatures | 96 * k | Signer public key followed by its signature |
//!
//! The address is not part of the layout; it is recomputed from type tag
//! and name.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{MAX_OWNERS, MAX_PAYLOAD_SIZE, RecordError, StructuredRecord, TypeTag};
use crate::{
    PublicKey, Signature,
    crypto::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE},
};

const MAGIC: &[u8; 4] = b"SDR1";

/// Magic, type tag, name and version.
const HEADER_SIZE: usize = 4 + 8 + 32 + 8;

fn read_keys(bytes: &mut Bytes) -> Result<Vec<PublicKey>, RecordError> {
    if bytes.remaining() < 1 {
        return Err(RecordError::InsufficientBytes);
    }
    let count = bytes.get_u8() as usize;
    if count > MAX_OWNERS {
        return Err(RecordError::TooManyKeys {
            count,
            max: MAX_OWNERS,
        });
    }
    if bytes.remaining() < count * PUBLIC_KEY_SIZE {
        return Err(RecordError::InsufficientBytes);
    }
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_to_slice(&mut key);
        keys.push(PublicKey::from_bytes(key));
    }
    Ok(keys)
}

impl StructuredRecord {
    /// Serializes the record for storage and transport.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            HEADER_SIZE
                + 2
                + PUBLIC_KEY_SIZE * (self.owners.len() + self.prev_owners.len())
                + 4
                + self.payload.len()
                + 1
                + (PUBLIC_KEY_SIZE + SIGNATURE_SIZE) * self.signatures.len(),
        );

        buf.put_slice(MAGIC);
        buf.put_u64(self.type_tag.as_u64());
        buf.put_slice(&self.name);
        buf.put_u64(self.version);

        buf.put_u8(self.owners.len() as u8);
        for owner in &self.owners {
            buf.put_slice(owner.as_bytes());
        }
        buf.put_u8(self.prev_owners.len() as u8);
        for owner in &self.prev_owners {
            buf.put_slice(owner.as_bytes());
        }

        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);

        buf.put_u8(self.signatures.len() as u8);
        for (signer, signature) in &self.signatures {
            buf.put_slice(signer.as_bytes());
            buf.put_slice(signature.as_bytes());
        }

        buf.freeze()
    }

    /// Deserializes a record and runs the structural checks.
    ///
    /// Signatures are not verified here; see [`StructuredRecord::verify`].
    pub fn deserialize(mut bytes: Bytes) -> Result<Self, RecordError> {
        let (type_tag, version) = Self::peek_version(&bytes)?;
        bytes.advance(4 + 8);

        let mut name = [0u8; 32];
        bytes.copy_to_slice(&mut name);
        bytes.advance(8);

        let owners = read_keys(&mut bytes)?;
        let prev_owners = read_keys(&mut bytes)?;

        if bytes.remaining() < 4 {
            return Err(RecordError::InsufficientBytes);
        }
        let payload_len = bytes.get_u32() as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(RecordError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if bytes.remaining() < payload_len {
            return Err(RecordError::InsufficientBytes);
        }
        let payload = bytes.split_to(payload_len);

        if bytes.remaining() < 1 {
            return Err(RecordError::InsufficientBytes);
        }
        let sig_count = bytes.get_u8() as usize;
        if sig_count > MAX_OWNERS {
            return Err(RecordError::TooManyKeys {
                count: sig_count,
                max: MAX_OWNERS,
            });
        }
        if bytes.remaining() < sig_count * (PUBLIC_KEY_SIZE + SIGNATURE_SIZE) {
            return Err(RecordError::InsufficientBytes);
        }
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            let mut signer = [0u8; PUBLIC_KEY_SIZE];
            bytes.copy_to_slice(&mut signer);
            let mut signature = [0u8; SIGNATURE_SIZE];
            bytes.copy_to_slice(&mut signature);
            signatures.push((
                PublicKey::from_bytes(signer),
                Signature::from_bytes(signature),
            ));
        }

        if bytes.has_remaining() {
            return Err(RecordError::TrailingBytes(bytes.remaining()));
        }

        let record = Self {
            type_tag,
            name,
            version,
            owners,
            prev_owners,
            payload,
            signatures,
        };
        record.validate()?;
        Ok(record)
    }

    /// Reads type tag and version from the fixed header without decoding
    /// the rest. Network backends use this to evaluate version guards.
    pub fn peek_version(bytes: &[u8]) -> Result<(TypeTag, u64), RecordError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RecordError::InsufficientBytes);
        }
        if &bytes[..4] != MAGIC {
            return Err(RecordError::BadMagic);
        }
        let mut header = &bytes[4..HEADER_SIZE];
        let type_tag = TypeTag::try_from(header.get_u64())?;
        header.advance(32);
        let version = header.get_u64();
        Ok((type_tag, version))
    }
}
