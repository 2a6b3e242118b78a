//! Note Commitments
//!
//! The single home of the note hash scheme (version 1). The withdrawal
//! circuit must compute exactly these functions, so changing hash families
//! only touches this module.
//!
//! ```text
//! Commitment    = Poseidon(DOMAIN_COMMITMENT, secret, nullifier, amount)
//! NullifierHash = Poseidon(DOMAIN_NULLIFIER,  secret, nullifier, root)
//! ```
//!
//! Every input is reduced into BN254 Fr over its full width before
//! absorption; outputs are 32-byte big-endian encodings.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NoteError;
use crate::field::{bytes32_from_hex, field_to_bytes, to_field_element};
use crate::note::NoteValue;
use crate::nullifier::NullifierHash;
use crate::poseidon;

/// "COMM"
const DOMAIN_COMMITMENT: u64 = 0x434f_4d4d;
/// "NULL"
const DOMAIN_NULLIFIER: u64 = 0x4e55_4c4c;

/// A note commitment (32 bytes, big-endian field element)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Create commitment from field element
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

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, NoteError> {
        bytes32_from_hex(s).map(Self)
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

/// Commit to a note: C = Poseidon(domain, secret, nullifier, amount)
pub fn commit(secret: &[u8; 32], nullifier: &[u8; 32], amount: NoteValue) -> Commitment {
    let result = poseidon::hash(&[
        Fr::from(DOMAIN_COMMITMENT),
        to_field_element(secret),
        to_field_element(nullifier),
        Fr::from(amount.as_u128()),
    ]);
    Commitment::from_field(result)
}

/// Derive the public nullifier hash revealed when spending against `root`
pub fn nullifier_hash(secret: &[u8; 32], nullifier: &[u8; 32], root: &[u8; 32]) -> NullifierHash {
    let result = poseidon::hash(&[
        Fr::from(DOMAIN_NULLIFIER),
        to_field_element(secret),
        to_field_element(nullifier),
        to_field_element(root),
    ]);
    NullifierHash::from_field(result)
}
