//! Shielded Notes
//!
//! A Note represents value deposited into the shielded pool.
//!
//! ```text
//! Note = {
//!     secret: [u8; 32],      // Private, never leaves the wallet
//!     nullifier: [u8; 32],   // Private, revealed only as a hash at spend time
//!     amount: u128,          // Amount in the smallest unit (wei)
//!     commitment: [u8; 32],  // Poseidon(secret, nullifier, amount), published on deposit
//! }
//! ```
//!
//! Lifecycle metadata (anchoring, spent flag) is tracked by the wallet's
//! note store, not here.

use rand_core::{OsRng, TryRngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commitment::{self, Commitment};
use crate::error::NoteError;
use crate::field::{field_to_bytes, is_canonical, to_field_element};
use crate::nullifier::NullifierHash;

/// Bytes drawn per private value before reduction; the extra width keeps
/// the modular bias negligible
const RANDOM_BYTES: usize = 64;

/// Note value with overflow protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteValue(pub u128);

impl NoteValue {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A shielded note: the private opening of one on-chain commitment
#[derive(Clone, PartialEq, Eq)]
pub struct Note {
    secret: [u8; 32],
    nullifier: [u8; 32],
    amount: NoteValue,
    commitment: Commitment,
}

impl Note {
    /// Generate a fresh note using the operating system's CSPRNG
    pub fn generate(amount: u128) -> Result<Self, NoteError> {
        Self::generate_with(amount, &mut OsRng)
    }

    /// Generate a fresh note from a caller-supplied random source
    pub fn generate_with<R: TryRngCore + ?Sized>(amount: u128, rng: &mut R) -> Result<Self, NoteError> {
        if amount == 0 {
            return Err(NoteError::InvalidAmount);
        }

        let secret = random_field_bytes(rng)?;
        let nullifier = random_field_bytes(rng)?;
        let amount = NoteValue(amount);

        Ok(Self {
            secret,
            nullifier,
            amount,
            commitment: commitment::commit(&secret, &nullifier, amount),
        })
    }

    /// Rebuild a note from its private opening (for backup restore)
    pub fn from_parts(secret: [u8; 32], nullifier: [u8; 32], amount: u128) -> Result<Self, NoteError> {
        if amount == 0 {
            return Err(NoteError::InvalidAmount);
        }
        if !is_canonical(&secret) || !is_canonical(&nullifier) {
            return Err(NoteError::NonCanonical);
        }

        let amount = NoteValue(amount);
        Ok(Self {
            secret,
            nullifier,
            amount,
            commitment: commitment::commit(&secret, &nullifier, amount),
        })
    }

    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn nullifier(&self) -> &[u8; 32] {
        &self.nullifier
    }

    pub fn amount(&self) -> NoteValue {
        self.amount
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// Recompute the commitment and compare with the stored one
    pub fn verify_commitment(&self) -> bool {
        commitment::commit(&self.secret, &self.nullifier, self.amount) == self.commitment
    }

    /// Derive the nullifier hash for spending this note against `root`
    pub fn nullifier_hash(&self, root: &[u8; 32]) -> NullifierHash {
        commitment::nullifier_hash(&self.secret, &self.nullifier, root)
    }
}

impl fmt::Debug for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Note")
            .field("secret", &"<redacted>")
            .field("nullifier", &"<redacted>")
            .field("amount", &self.amount)
            .field("commitment", &self.commitment)
            .finish()
    }
}

/// Draw a uniformly distributed, canonically encoded field element
fn random_field_bytes<R: TryRngCore + ?Sized>(rng: &mut R) -> Result<[u8; 32], NoteError> {
    let mut wide = [0u8; RANDOM_BYTES];
    rng.try_fill_bytes(&mut wide)
        .map_err(|e| NoteError::EntropyUnavailable(e.to_string()))?;
    Ok(field_to_bytes(&to_field_element(&wide)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct DeadRng;

    impl TryRngCore for DeadRng {
        type Error = std::io::Error;

        fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
            Err(std::io::Error::other("rng offline"))
        }

        fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
            Err(std::io::Error::other("rng offline"))
        }

        fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
            Err(std::io::Error::other("rng offline"))
        }
    }

    #[test]
    fn test_note_commitment() {
        let note = Note::generate(1000).unwrap();

        assert!(note.verify_commitment(), "commitment should be deterministic");
        assert_eq!(note.amount(), NoteValue::new(1000));
        assert!(is_canonical(note.secret()));
        assert!(is_canonical(note.nullifier()));
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert_eq!(Note::generate(0).unwrap_err(), NoteError::InvalidAmount);
        assert_eq!(
            Note::from_parts([1u8; 32], [2u8; 32], 0).unwrap_err(),
            NoteError::InvalidAmount
        );
    }

    #[test]
    fn test_entropy_failure_surfaces() {
        let err = Note::generate_with(10, &mut DeadRng).unwrap_err();
        assert!(matches!(err, NoteError::EntropyUnavailable(msg) if msg.contains("rng offline")));
    }

    #[test]
    fn test_from_parts_recomputes_commitment() {
        let note = Note::generate(250).unwrap();
        let restored = Note::from_parts(*note.secret(), *note.nullifier(), 250).unwrap();
        assert_eq!(restored, note);
    }

    #[test]
    fn test_from_parts_rejects_non_canonical() {
        let err = Note::from_parts([0xFFu8; 32], [1u8; 32], 5).unwrap_err();
        assert_eq!(err, NoteError::NonCanonical);
    }

    #[test]
    fn test_ten_thousand_unique_commitments() {
        let count = 10_000;
        let commitments: HashSet<Commitment> = (0..count)
            .map(|_| Note::generate(1).unwrap().commitment())
            .collect();

        assert_eq!(commitments.len(), count);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let note = Note::generate(3).unwrap();
        let rendered = format!("{note:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode(note.secret())));
    }

    #[test]
    fn test_note_value_checked_ops() {
        let v1 = NoteValue::new(100);
        let v2 = NoteValue::new(50);

        assert_eq!(v1.checked_add(v2), Some(NoteValue::new(150)));
        assert_eq!(v1.checked_sub(v2), Some(NoteValue::new(50)));
        assert_eq!(v2.checked_sub(v1), None); // Underflow
        assert_eq!(NoteValue::MAX.checked_add(NoteValue::new(1)), None); // Overflow
    }
}
