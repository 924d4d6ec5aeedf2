//! Signing keys and symmetric encryption.
//!
//! Signatures are Ed25519 (`ed25519-dalek`); payload encryption is
//! XChaCha20-Poly1305 with a synthetic nonce, so equal plaintexts under
//! equal keys produce byte-identical ciphertexts. Directory payloads rely on
//! that to keep `encode` deterministic.

use std::fmt;

use chacha20poly1305::{
    XChaCha20Poly1305,
    aead::{Aead, KeyInit},
};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Size of an XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 tag appended by the cipher.
pub const TAG_SIZE: usize = 16;

/// A 32-byte symmetric key.
pub type SecretKey = [u8; 32];

const NONCE_CONTEXT: &str = "sdn/crypto/siv-nonce";

/// Errors that can occur during symmetric encryption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("data too short: expected at least {0} bytes")]
    DataTooShort(usize),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,
}

/// An Ed25519 public key identifying a record owner.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Strict Ed25519 verification of `signature` over `message`.
    ///
    /// Returns false for keys that are not valid curve points.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify_strict(message, &signature).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&hex::encode(&self.0[..5]))
            .finish()
    }
}

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature")
            .field(&hex::encode(&self.0[..5]))
            .finish()
    }
}

/// An owner signing key. The secret half is scrubbed on drop.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Builds a keypair from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Generates a keypair from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        let keypair = Self::from_seed(&seed);
        seed.zeroize();
        keypair
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.signing_key.verifying_key().as_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Derives the synthetic nonce for `plaintext` under `key`.
pub fn synthetic_nonce(key: &SecretKey, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
    let nonce_key = blake3::derive_key(NONCE_CONTEXT, key);
    let mac = blake3::keyed_hash(&nonce_key, plaintext);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&mac.as_bytes()[..NONCE_SIZE]);
    nonce
}

/// Encrypts `plaintext` with XChaCha20-Poly1305 using a synthetic nonce.
///
/// # Returns
/// `nonce (24 bytes) || ciphertext`. The output is a pure function of
/// `(key, plaintext)`.
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    encrypt_with_nonce(key, &synthetic_nonce(key, plaintext), plaintext)
}

/// Encrypts under a caller-chosen nonce. Output has the same layout as
/// [`encrypt`].
pub fn encrypt_with_nonce(
    key: &SecretKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(&(*key).into());
    let nonce = *nonce;

    let ciphertext = cipher
        .encrypt(&nonce.into(), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypts `nonce (24 bytes) || ciphertext` produced by [`encrypt`].
pub fn decrypt(key: &SecretKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DataTooShort(NONCE_SIZE + TAG_SIZE));
    }

    let cipher = XChaCha20Poly1305::new(&(*key).into());
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| CryptoError::DataTooShort(NONCE_SIZE))?;

    cipher
        .decrypt(&nonce.into(), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keypair = Keypair::from_seed(&[9u8; 32]);
        let signature = keypair.sign(b"hello");
        assert!(keypair.public_key().verify(b"hello", &signature));
        assert!(!keypair.public_key().verify(b"hellO", &signature));

        let other = Keypair::from_seed(&[10u8; 32]);
        assert!(!other.public_key().verify(b"hello", &signature));
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(
            Keypair::generate().public_key(),
            Keypair::generate().public_key()
        );
    }

    #[test]
    fn encryption_is_deterministic() {
        let key = [42u8; 32];
        let a = encrypt(&key, b"same plaintext").unwrap();
        let b = encrypt(&key, b"same plaintext").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, encrypt(&key, b"other plaintext").unwrap());
        assert_eq!(decrypt(&key, &a).unwrap(), b"same plaintext");
    }

    #[test]
    fn explicit_nonce_is_prefixed() {
        let key = [42u8; 32];
        let sealed = encrypt_with_nonce(&key, &[7u8; NONCE_SIZE], b"payload").unwrap();
        assert_eq!(&sealed[..NONCE_SIZE], &[7u8; NONCE_SIZE]);
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"payload");
        assert_ne!(sealed, encrypt(&key, b"payload").unwrap());
        assert_eq!(
            &encrypt(&key, b"payload").unwrap()[..NONCE_SIZE],
            &synthetic_nonce(&key, b"payload")
        );
    }

    #[test]
    fn wrong_key_fails() {
        let ciphertext = encrypt(&[1u8; 32], b"secret").unwrap();
        assert_eq!(
            decrypt(&[2u8; 32], &ciphertext),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [1u8; 32];
        let mut ciphertext = encrypt(&key, b"secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert_eq!(
            decrypt(&key, &ciphertext),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn short_input_fails() {
        assert_eq!(
            decrypt(&[1u8; 32], &[0u8; 10]),
            Err(CryptoError::DataTooShort(NONCE_SIZE + TAG_SIZE))
        );
    }
}
