//! Nullifier Hashes
//!
//! The public tag revealed when a note is spent.
//!
//! ```text
//! NullifierHash = Poseidon(DOMAIN_NULLIFIER, secret, nullifier, root)
//! ```
//!
//! Once a nullifier hash is published on chain, the note it was derived
//! from cannot be withdrawn again. Derivation lives in [`crate::commitment`].

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NoteError;
use crate::field::{bytes32_from_hex, field_to_bytes, to_field_element};

/// A nullifier hash (32 bytes) - unique tag for a spent note
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(pub [u8; 32]);

impl NullifierHash {
    /// Create from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(&f))
    }

    /// Convert to field element
    pub fn to_field(&self) -> Fr {
        to_field_element(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, NoteError> {
        bytes32_from_hex(s).map(Self)
    }
}

impl AsRef<[u8]> for NullifierHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullifierHash({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use crate::commitment::nullifier_hash;

    #[test]
    fn test_nullifier_hash_deterministic() {
        let root = [9u8; 32];
        let n1 = nullifier_hash(&[1u8; 32], &[2u8; 32], &root);
        let n2 = nullifier_hash(&[1u8; 32], &[2u8; 32], &root);

        assert_eq!(n1, n2, "same inputs should produce same nullifier hash");
    }

    #[test]
    fn test_nullifier_hash_unique_per_note() {
        let root = [9u8; 32];
        let n1 = nullifier_hash(&[1u8; 32], &[2u8; 32], &root);
        let n2 = nullifier_hash(&[1u8; 32], &[3u8; 32], &root);

        assert_ne!(n1, n2, "different notes should have different nullifier hashes");
    }

    #[test]
    fn test_nullifier_hash_requires_secret() {
        let root = [9u8; 32];
        let n1 = nullifier_hash(&[1u8; 32], &[2u8; 32], &root);
        let n2 = nullifier_hash(&[4u8; 32], &[2u8; 32], &root);

        assert_ne!(n1, n2, "different secrets should produce different nullifier hashes");
    }

    #[test]
    fn test_root_affects_nullifier_hash() {
        let n1 = nullifier_hash(&[1u8; 32], &[2u8; 32], &[0u8; 32]);
        let mut root = [0u8; 32];
        root[31] = 1;
        let n2 = nullifier_hash(&[1u8; 32], &[2u8; 32], &root);

        assert_ne!(n1, n2, "different roots should produce different nullifier hashes");
    }
}
