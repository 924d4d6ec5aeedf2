//! Record addresses.
//!
//! An address is the BLAKE3 derive-key hash of a record's type tag and its
//! caller-chosen name. It is never stored inside a record; readers recompute
//! it from `(type_tag, name)`, so a record can not claim a foreign address.

use std::{fmt, str::FromStr};

use minicbor::decode::{self, Decoder};
use minicbor::encode::{self, Encoder, Write};
use minicbor::{Decode, Encode};

use crate::record::TypeTag;

/// Size of an address (and of a record name) in bytes.
pub const ADDRESS_SIZE: usize = 32;

/// BLAKE3 derive-key context for address derivation.
const ADDRESS_CONTEXT: &str = "sdn/address";

/// A caller-chosen 32-byte record name.
pub type XorName = [u8; ADDRESS_SIZE];

/// Location of a structured record on the network.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

/// Errors that can occur when parsing an address from hex.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid address length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl Address {
    /// Derives the address of the record `(type_tag, name)`.
    pub fn derive(type_tag: TypeTag, name: &XorName) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(ADDRESS_CONTEXT);
        hasher.update(&type_tag.as_u64().to_be_bytes());
        hasher.update(name);
        Self(*hasher.finalize().as_bytes())
    }

    /// Wraps raw address bytes without derivation.
    pub const fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 5 bytes as hex, for log lines.
    pub fn fmt_short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        let arr: [u8; ADDRESS_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AddressParseError::InvalidLength {
                    expected: ADDRESS_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.fmt_short()).finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(value: [u8; ADDRESS_SIZE]) -> Self {
        Self(value)
    }
}

impl From<Address> for [u8; ADDRESS_SIZE] {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl<C> Encode<C> for Address {
    fn encode<W: Write>(
        &self,
        e: &mut Encoder<W>,
        _: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        e.bytes(&self.0)?;
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for Address {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, decode::Error> {
        let p = d.position();
        let bytes = d.bytes()?;
        let arr: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| decode::Error::message("address must be 32 bytes").at(p))?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_depends_on_tag_and_name() {
        let name = [7u8; 32];
        let unversioned = Address::derive(TypeTag::Unversioned, &name);
        let versioned = Address::derive(TypeTag::Versioned, &name);
        assert_ne!(unversioned, versioned);
        assert_eq!(unversioned, Address::derive(TypeTag::Unversioned, &name));
        assert_ne!(unversioned, Address::derive(TypeTag::Unversioned, &[8u8; 32]));
    }

    #[test]
    fn hex_parse() {
        let addr = Address::derive(TypeTag::Versioned, &[1u8; 32]);
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(addr, parsed);
        assert!(addr.to_hex().starts_with(&addr.fmt_short()));
    }

    #[test]
    fn hex_parse_rejects_wrong_length() {
        let err = "abcd".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            AddressParseError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn hex_parse_rejects_non_hex() {
        let err = "zz".repeat(32).parse::<Address>().unwrap_err();
        assert!(matches!(err, AddressParseError::Hex(_)));
        assert_ne!(
            err,
            AddressParseError::InvalidLength {
                expected: 32,
                actual: 32
            }
        );
    }

    #[test]
    fn cbor_encodes_as_byte_string() {
        let addr = Address::from_bytes([3u8; 32]);
        let bytes = minicbor::to_vec(addr).unwrap();
        // major type 2 (bytes), one-byte length follows
        assert_eq!(bytes[0], 0x58);
        assert_eq!(bytes[1], 32);
        let decoded: Address = minicbor::decode(&bytes).unwrap();
        assert_eq!(decoded, addr);
    }
}
