use anyhow::{Context, Result, anyhow};
use sdn_core::{Address, PublicKey, crypto::PUBLIC_KEY_SIZE};

pub fn parse_address_hex(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .with_context(|| format!("invalid address '{s}'"))
}

pub fn parse_public_key_hex(s: &str) -> Result<PublicKey> {
    let bytes = hex::decode(s.trim()).context("failed to decode hex public key")?;
    let arr: [u8; PUBLIC_KEY_SIZE] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("public key has wrong length: {} bytes", bytes.len()))?;
    Ok(PublicKey::from_bytes(arr))
}

/// True if `s` looks like a hex address rather than a registered name.
pub fn is_address(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
