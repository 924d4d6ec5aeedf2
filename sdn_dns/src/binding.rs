use std::{collections::BTreeMap, convert::Infallible};

use minicbor::{Decode, Encode};
use sdn_core::{Address, Error, Result, XorName};

/// Longest registrable name, in bytes.
pub const MAX_NAME_LEN: usize = 253;

const NAME_CONTEXT: &str = "sdn/dns/name";

/// Checks a registered name or a service label.
///
/// Names are case-sensitive and must be non-empty printable text without
/// whitespace.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.chars().any(|c| c.is_whitespace() || c.is_control());
    if !valid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Record name under which `name` is registered.
pub fn record_name(name: &str) -> XorName {
    blake3::derive_key(NAME_CONTEXT, name.as_bytes())
}

/// Payload of a name record. Stored unencrypted.
#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
#[cbor(map)]
pub struct NameBinding {
    #[n(0)]
    pub name: String,
    /// Root directory the name points at.
    #[n(1)]
    pub root: Address,
    #[n(2)]
    pub services: BTreeMap<String, Address>,
}

impl NameBinding {
    pub fn new(name: impl Into<String>, root: Address) -> Self {
        Self {
            name: name.into(),
            root,
            services: BTreeMap::new(),
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        minicbor::to_vec(self)
            .map_err(|e: minicbor::encode::Error<Infallible>| Error::Malformed(e.to_string()))
    }

    /// Decodes a stored binding and checks it belongs to `name`.
    pub(crate) fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        let binding: NameBinding = minicbor::decode(bytes)?;
        if binding.name != name {
            return Err(Error::Corrupt(format!(
                "binding for {:?} stored under {:?}",
                binding.name, name
            )));
        }
        Ok(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        assert!(validate_name("alice").is_ok());
        assert!(validate_name("alice.example").is_ok());
        for bad in ["", "al ice", "tab\t", "x".repeat(MAX_NAME_LEN + 1).as_str()] {
            assert!(matches!(validate_name(bad), Err(Error::InvalidName(_))), "{bad:?}");
        }
    }

    #[test]
    fn record_names_are_case_sensitive() {
        assert_ne!(record_name("alice"), record_name("Alice"));
        assert_eq!(record_name("alice"), record_name("alice"));
    }

    #[test]
    fn decode_checks_the_name() {
        let binding = NameBinding::new("alice", Address::from_bytes([7; 32]));
        let bytes = binding.encode().unwrap();
        assert_eq!(NameBinding::decode("alice", &bytes).unwrap(), binding);
        assert!(matches!(NameBinding::decode("bob", &bytes), Err(Error::Corrupt(_))));
        assert!(matches!(NameBinding::decode("alice", b"\xff\x00"), Err(Error::Malformed(_))));
    }
}
