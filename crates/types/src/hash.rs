//! Blake3 digests shared by transactions, blocks and one-time keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte Blake3 digest.
///
/// Identifies blocks by header, names Merkle nodes, and stands in for the
/// public halves of one-time signing keys. Ordered so it can key a `BTreeMap`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const BYTES: usize = 32;

    /// Parent digest of the first block.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Digest of `parts` fed in order, equal to hashing their concatenation.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        parts.iter().for_each(|part| {
            hasher.update(part);
        });
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First five bytes in hex, enough to tell blocks apart in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", self.short())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_hash_like_their_concatenation() {
        assert_eq!(
            Hash::from_parts(&[b"block", b"header"]),
            Hash::from_bytes(b"blockheader")
        );
        assert_ne!(Hash::from_bytes(b"block"), Hash::ZERO);
    }

    #[test]
    fn test_display_is_full_hex_and_short_is_prefix() {
        let digest = Hash::from_bytes(b"ledger");
        let full = digest.to_string();
        assert_eq!(full.len(), 2 * Hash::BYTES);
        assert!(full.starts_with(&digest.short()));
        assert_eq!(format!("{digest:?}"), format!("Hash({}..)", digest.short()));
    }
}
