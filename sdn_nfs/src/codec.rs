//! Directory payload codec.
//!
//! `encode` produces `nonce || XChaCha20-Poly1305(cbor)` where the key is
//! scoped to the directory's address and the session's encryption root,
//! and the nonce is synthetic. Equal directories therefore encode to equal
//! bytes. `decode` only accepts payloads in exactly that form (canonical
//! CBOR sealed under the synthetic nonce), so whatever it accepts
//! re-encodes to itself.

use std::convert::Infallible;

use minicbor::{Decode, Encode};
use sdn_core::{
    Address, Error, Result, Session, crypto,
    crypto::{NONCE_SIZE, SecretKey},
};
use zeroize::Zeroize;

use crate::dir::{Directory, DirectoryEntry, validate_name};

const DIR_KEY_CONTEXT: &str = "sdn/nfs/dir";
const MAGIC: &str = "sdn.dir.v1";

#[derive(Encode, Decode)]
#[cbor(array)]
struct DirPayload {
    #[n(0)]
    magic: String,
    #[n(1)]
    entries: Vec<DirectoryEntry>,
}

/// Encrypting codec for one directory record.
pub struct DirCodec {
    key: SecretKey,
}

impl DirCodec {
    pub fn new(session: &Session, address: &Address) -> Self {
        Self {
            key: session.derive_secret(DIR_KEY_CONTEXT, address),
        }
    }

    /// Serializes `dir` with entries ordered by name, then encrypts.
    pub fn encode(&self, dir: &Directory) -> Result<Vec<u8>> {
        let payload = DirPayload {
            magic: MAGIC.to_string(),
            entries: dir.iter().cloned().collect(),
        };
        let plain = minicbor::to_vec(&payload)
            .map_err(|e: minicbor::encode::Error<Infallible>| Error::Malformed(e.to_string()))?;
        tracing::trace!(entries = dir.len(), bytes = plain.len(), "encoded directory");
        Ok(crypto::encrypt(&self.key, &plain)?)
    }

    /// Encodes an entry list given in any order.
    pub fn encode_entries(&self, entries: Vec<DirectoryEntry>) -> Result<Vec<u8>> {
        self.encode(&Directory::from_entries(entries)?)
    }

    /// Decrypts and parses a directory payload.
    ///
    /// Entries must be strictly ascending by name; anything else, including
    /// a duplicate name, is `Malformed`. So is a payload that is not the
    /// exact output of [`encode`](Self::encode), such as one sealed under
    /// another nonce or carrying non-canonical CBOR.
    pub fn decode(&self, bytes: &[u8]) -> Result<Directory> {
        let plain = crypto::decrypt(&self.key, bytes)?;
        if bytes[..NONCE_SIZE] != crypto::synthetic_nonce(&self.key, &plain) {
            return Err(Error::Malformed(
                "directory payload is not sealed under its synthetic nonce".into(),
            ));
        }
        let payload: DirPayload = minicbor::decode(&plain)?;
        let canonical = minicbor::to_vec(&payload)
            .map_err(|e: minicbor::encode::Error<Infallible>| Error::Malformed(e.to_string()))?;
        if canonical != plain {
            return Err(Error::Malformed(
                "directory payload is not canonically encoded".into(),
            ));
        }
        if payload.magic != MAGIC {
            return Err(Error::Malformed(format!(
                "unexpected directory magic {:?}",
                payload.magic
            )));
        }
        if !payload.entries.windows(2).all(|w| w[0].name < w[1].name) {
            return Err(Error::Malformed(
                "directory entries are not strictly ordered by name".into(),
            ));
        }
        let mut dir = Directory::new();
        for entry in payload.entries {
            validate_name(&entry.name).map_err(|e| Error::Malformed(e.to_string()))?;
            dir.insert(entry)?;
        }
        tracing::trace!(entries = dir.len(), bytes = bytes.len(), "decoded directory");
        Ok(dir)
    }
}

impl Drop for DirCodec {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::{FileContent, FileRef, Metadata};
    use sdn_core::TypeTag;

    fn codec(seed: &[u8], name: u8) -> DirCodec {
        let session = Session::from_seed(seed);
        DirCodec::new(&session, &Address::derive(TypeTag::Versioned, &[name; 32]))
    }

    fn file(name: &str, created: u64) -> DirectoryEntry {
        DirectoryEntry::file(
            name,
            FileRef {
                size: 3,
                content: FileContent::Inline(b"abc".to_vec()),
            },
            Metadata::new(created).with_attr("mime", "text/plain"),
        )
    }

    #[test]
    fn empty_directory_encodes() {
        let codec = codec(b"seed", 1);
        let bytes = codec.encode(&Directory::new()).unwrap();
        assert!(codec.decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn encoding_is_order_independent() {
        let codec = codec(b"seed", 1);
        let a = codec
            .encode_entries(vec![file("b", 1), file("a", 2)])
            .unwrap();
        let b = codec
            .encode_entries(vec![file("a", 2), file("b", 1)])
            .unwrap();
        assert_eq!(a, b);

        let decoded = codec.decode(&a).unwrap();
        let names: Vec<_> = decoded.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(codec.encode(&decoded).unwrap(), a);
    }

    #[test]
    fn duplicate_names_do_not_encode() {
        let codec = codec(b"seed", 1);
        assert!(matches!(
            codec.encode_entries(vec![file("a", 1), file("a", 2)]),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn wrong_session_or_address_cannot_decode() {
        let bytes = codec(b"seed", 1)
            .encode_entries(vec![file("a", 1)])
            .unwrap();
        assert!(matches!(
            codec(b"other seed", 1).decode(&bytes),
            Err(Error::DecryptionFailed)
        ));
        assert!(matches!(
            codec(b"seed", 2).decode(&bytes),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn unordered_payload_is_malformed() {
        let session = Session::from_seed(b"seed");
        let address = Address::derive(TypeTag::Versioned, &[1; 32]);
        let codec = DirCodec::new(&session, &address);

        let payload = DirPayload {
            magic: MAGIC.to_string(),
            entries: vec![file("b", 1), file("a", 1)],
        };
        let plain = minicbor::to_vec(&payload).unwrap();
        let key = session.derive_secret(DIR_KEY_CONTEXT, &address);
        let bytes = crypto::encrypt(&key, &plain).unwrap();
        assert!(matches!(codec.decode(&bytes), Err(Error::Malformed(_))));
    }

    #[test]
    fn foreign_nonce_is_malformed() {
        let session = Session::from_seed(b"seed");
        let address = Address::derive(TypeTag::Versioned, &[1; 32]);
        let codec = DirCodec::new(&session, &address);

        let canonical = codec.encode_entries(vec![file("a", 1)]).unwrap();
        let plain = crypto::decrypt(&codec.key, &canonical).unwrap();
        let resealed = crypto::encrypt_with_nonce(&codec.key, &[7; NONCE_SIZE], &plain).unwrap();
        assert!(codec.decode(&canonical).is_ok());
        assert!(matches!(codec.decode(&resealed), Err(Error::Malformed(_))));
    }

    #[test]
    fn non_canonical_cbor_is_malformed() {
        let session = Session::from_seed(b"seed");
        let address = Address::derive(TypeTag::Versioned, &[1; 32]);
        let codec = DirCodec::new(&session, &address);

        // Indefinite-length outer array: same value, different bytes.
        let mut encoder = minicbor::Encoder::new(Vec::new());
        encoder
            .begin_array()
            .unwrap()
            .str(MAGIC)
            .unwrap()
            .array(0)
            .unwrap()
            .end()
            .unwrap();
        let plain = encoder.into_writer();
        let bytes = crypto::encrypt(&codec.key, &plain).unwrap();
        assert!(matches!(codec.decode(&bytes), Err(Error::Malformed(_))));
        assert!(codec.encode(&Directory::new()).unwrap() != bytes);
    }

    #[test]
    fn garbage_after_decryption_is_malformed() {
        let session = Session::from_seed(b"seed");
        let address = Address::derive(TypeTag::Versioned, &[1; 32]);
        let key = session.derive_secret(DIR_KEY_CONTEXT, &address);
        let bytes = crypto::encrypt(&key, b"\xff\xff not cbor").unwrap();
        assert!(matches!(
            DirCodec::new(&session, &address).decode(&bytes),
            Err(Error::Malformed(_))
        ));
    }
}
