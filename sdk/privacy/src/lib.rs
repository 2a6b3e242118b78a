//! Shroud Privacy SDK
//!
//! Note primitives for the shielded pool: everything a wallet and the
//! withdrawal circuit must compute identically.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Shielded Note                           │
//! │  secret, nullifier ──► field encoding (full-width mod P)       │
//! │         │                                                       │
//! │         ▼                                                       │
//! │  ┌──────────────┐   deposit    ┌───────────────────────────┐   │
//! │  │  Commitment  │ ───────────► │  Poseidon Merkle tree     │   │
//! │  └──────────────┘              │  (on-chain accumulator)   │   │
//! │                                 └───────────────────────────┘   │
//! │  ┌──────────────┐   withdraw   ┌───────────────────────────┐   │
//! │  │NullifierHash │ ───────────► │  ZK proof public inputs   │   │
//! │  └──────────────┘              └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod error;
pub mod field;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod poseidon;

pub use commitment::{Commitment, commit, nullifier_hash};
pub use error::NoteError;
pub use field::{FIELD_BYTES, FieldElement, bytes32_from_hex, field_to_bytes, to_field_element};
pub use merkle::{MerklePath, MerkleTree, RootHistory, TREE_DEPTH, hash_pair};
pub use note::{Note, NoteValue};
pub use nullifier::NullifierHash;
