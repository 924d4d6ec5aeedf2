//! Per-session key material.
//!
//! ```text
//! seed (32 bytes, from the identity file)
//!     |
//!     +-- blake3::derive_key("sdn/session/ed25519", seed)   -> owner signing key
//!     |       |
//!     |       +-> public key (record owner identity)
//!     |
//!     +-- blake3::derive_key("sdn/session/xchacha20", seed) -> encryption root
//!             |
//!             +-- derive_key(<context>, root || address)    -> per-record secrets
//! ```

use std::fmt;

use blake3::derive_key;
use rand::RngCore;
use zeroize::Zeroize;

use crate::{Address, Keypair, PublicKey, crypto::SecretKey};

/// Owner signing key plus encryption root for one client identity.
///
/// Callers pass a `Session` explicitly into every operation that signs or
/// encrypts; nothing in the workspace keeps one in ambient state.
#[derive(Clone)]
pub struct Session {
    keypair: Keypair,
    encryption_root: SecretKey,
}

impl Session {
    /// Derives all session keys from a seed.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut signing_seed = derive_key("sdn/session/ed25519", seed);
        let keypair = Keypair::from_seed(&signing_seed);
        signing_seed.zeroize();

        Self {
            keypair,
            encryption_root: derive_key("sdn/session/xchacha20", seed),
        }
    }

    /// Creates a session from a fresh random seed.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        let session = Self::from_seed(&seed);
        seed.zeroize();
        session
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Derives a record-scoped secret for `context` (a BLAKE3 derive-key
    /// context string) and `address`.
    pub fn derive_secret(&self, context: &str, address: &Address) -> SecretKey {
        let mut material = [0u8; 64];
        material[..32].copy_from_slice(&self.encryption_root);
        material[32..].copy_from_slice(address.as_bytes());
        let secret = derive_key(context, &material);
        material.zeroize();
        secret
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.encryption_root.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeTag;

    #[test]
    fn derivation_is_deterministic() {
        let a = Session::from_seed(b"seed material");
        let b = Session::from_seed(b"seed material");
        assert_eq!(a.public_key(), b.public_key());

        let addr = Address::derive(TypeTag::Versioned, &[1u8; 32]);
        assert_eq!(
            a.derive_secret("sdn/test", &addr),
            b.derive_secret("sdn/test", &addr)
        );
    }

    #[test]
    fn secrets_are_scoped() {
        let session = Session::generate();
        let a = Address::derive(TypeTag::Versioned, &[1u8; 32]);
        let b = Address::derive(TypeTag::Versioned, &[2u8; 32]);
        assert_ne!(
            session.derive_secret("sdn/test", &a),
            session.derive_secret("sdn/test", &b)
        );
        assert_ne!(
            session.derive_secret("sdn/test", &a),
            session.derive_secret("sdn/other", &a)
        );
    }

    #[test]
    fn different_seeds_give_different_owners() {
        assert_ne!(
            Session::from_seed(b"alice").public_key(),
            Session::from_seed(b"bob").public_key()
        );
    }
}
