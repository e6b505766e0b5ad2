//! Multihash-style content identifiers
//!
//! Nodes are named by the hash of their serialized wire form. The identifier
//! carries a two-byte multihash prefix (function code and digest length) in
//! front of a SHA-256 digest, and its canonical short form is the base58
//! encoding of the whole byte string -- that short form is the key under
//! which node bytes live in the object namespaces.

use crate::error::StoreError;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Multihash function code for SHA2-256
const SHA2_256_CODE: u8 = 0x12;
/// Digest length of SHA2-256 in bytes
const SHA2_256_SIZE: u8 = 32;

/// An opaque content identifier; equality is byte-wise
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Hash(Vec<u8>);

impl Hash {
    /// Hash `data` with SHA2-256 and wrap it in the multihash prefix.
    pub fn digest(data: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(2 + SHA2_256_SIZE as usize);
        bytes.push(SHA2_256_CODE);
        bytes.push(SHA2_256_SIZE);
        bytes.extend_from_slice(&Sha256::digest(data));
        Self(bytes)
    }

    /// Reconstruct a hash from raw multihash bytes, validating the prefix.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(StoreError::BadHash(format!(
                "{} bytes is too short for a multihash",
                bytes.len()
            )));
        }

        if bytes[0] != SHA2_256_CODE || bytes[1] != SHA2_256_SIZE {
            return Err(StoreError::BadHash(format!(
                "unsupported function code {:#04x}/{}",
                bytes[0], bytes[1]
            )));
        }

        if bytes.len() != 2 + SHA2_256_SIZE as usize {
            return Err(StoreError::BadHash(format!(
                "digest length {} does not match prefix",
                bytes.len() - 2
            )));
        }

        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Canonical short string form: base58 of the multihash bytes.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse the canonical short string form.
    pub fn from_b58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| StoreError::BadHash(format!("bad base58: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self.to_b58())
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(Hash::digest(b"hello"), Hash::digest(b"hello"));
        assert_ne!(Hash::digest(b"hello"), Hash::digest(b"world"));
    }

    #[test]
    fn test_multihash_prefix() {
        let hash = Hash::digest(b"data");
        assert_eq!(hash.as_bytes().len(), 34);
        assert_eq!(hash.as_bytes()[0], 0x12);
        assert_eq!(hash.as_bytes()[1], 32);
    }

    #[test]
    fn test_b58_roundtrip() {
        let hash = Hash::digest(b"roundtrip me");
        let b58 = hash.to_b58();
        assert_eq!(Hash::from_b58(&b58).unwrap(), hash);
        // SHA2-256 multihashes famously render with a Qm prefix
        assert!(b58.starts_with("Qm"));
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let hash = Hash::digest(b"bytes");
        assert_eq!(Hash::from_bytes(hash.as_bytes()).unwrap(), hash);
    }

    #[test]
    fn test_from_bytes_rejects_bad_prefix() {
        assert!(Hash::from_bytes(&[]).is_err());
        assert!(Hash::from_bytes(&[0x12]).is_err());
        assert!(Hash::from_bytes(&[0x99, 32, 0, 0]).is_err());

        let mut short = vec![0x12, 32];
        short.extend_from_slice(&[0u8; 16]);
        assert!(Hash::from_bytes(&short).is_err());
    }

    #[test]
    fn test_from_b58_rejects_garbage() {
        assert!(Hash::from_b58("not base58 0OIl").is_err());
        assert!(Hash::from_b58("abc").is_err());
    }
}
