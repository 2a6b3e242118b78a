//! Withdrawal Prover
//!
//! The circuit and proving key are external; the core only assembles the
//! witness and hands it to a [`Prover`]. [`MockProver`] checks the same
//! constraints the circuit enforces so tests catch bad witness assembly.
//!
//! ```text
//!   private: secret, nullifier, amount, siblings, indices
//!   public:  root, nullifier_hash, recipient, fee
//!   constraints:
//!     commit(secret, nullifier, amount) ∈ tree(root)
//!     nullifier_hash == H(secret, nullifier, root)
//!     amount == withdraw_amount + fee
//! ```

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;

use shroud_privacy::{MerklePath, NoteValue, NullifierHash, commit, nullifier_hash};

use crate::ledger::Address;

/// Inputs to the withdrawal circuit
#[derive(Clone)]
pub struct Witness {
    pub secret: [u8; 32],
    pub nullifier: [u8; 32],
    pub amount: NoteValue,
    pub siblings: Vec<[u8; 32]>,
    pub indices: Vec<bool>,
    pub root: [u8; 32],
    pub nullifier_hash: NullifierHash,
    pub recipient: Address,
    pub fee: NoteValue,
    pub withdraw_amount: NoteValue,
}

impl Witness {
    /// Public inputs in circuit order
    pub fn public_inputs(&self) -> Vec<[u8; 32]> {
        let mut fee = [0u8; 32];
        fee[16..].copy_from_slice(&self.fee.as_u128().to_be_bytes());
        vec![self.root, self.nullifier_hash.0, self.recipient.0, fee]
    }

    pub fn merkle_path(&self) -> MerklePath {
        MerklePath {
            siblings: self.siblings.clone(),
            indices: self.indices.clone(),
        }
    }
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Witness")
            .field("secret", &"<redacted>")
            .field("nullifier", &"<redacted>")
            .field("amount", &self.amount)
            .field("path_len", &self.siblings.len())
            .field("root", &hex::encode(self.root))
            .field("nullifier_hash", &self.nullifier_hash)
            .field("recipient", &self.recipient)
            .field("fee", &self.fee)
            .field("withdraw_amount", &self.withdraw_amount)
            .finish()
    }
}

/// Opaque proof bytes
#[derive(Clone, PartialEq, Eq)]
pub struct Proof(pub Vec<u8>);

impl Proof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proof({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProverError {
    #[error("witness violates circuit constraint: {0}")]
    InvalidWitness(&'static str),

    #[error("prover backend error: {0}")]
    Backend(String),
}

/// Proof generation backend. Runs on a blocking thread.
pub trait Prover: Send + Sync {
    fn prove(&self, witness: &Witness) -> Result<Proof, ProverError>;
}

/// Mock prover - checks the circuit constraints natively and returns a
/// hash of the public inputs instead of a SNARK
pub struct MockProver {
    /// Simulated proving time in ms
    prove_time_ms: u64,
    calls: AtomicUsize,
    last_witness: Mutex<Option<Witness>>,
    fail: AtomicBool,
}

impl MockProver {
    pub fn new() -> Self {
        Self::with_prove_time(0)
    }

    /// Create with custom proving time (for testing)
    pub fn with_prove_time(ms: u64) -> Self {
        Self {
            prove_time_ms: ms,
            calls: AtomicUsize::new(0),
            last_witness: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `prove` fail with a backend error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of times `prove` was invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_witness(&self) -> Option<Witness> {
        self.last_witness.lock().ok().and_then(|w| w.clone())
    }

    fn check(witness: &Witness) -> Result<(), ProverError> {
        let commitment = commit(&witness.secret, &witness.nullifier, witness.amount);
        if !witness.merkle_path().verify(&commitment, &witness.root) {
            return Err(ProverError::InvalidWitness("commitment not in tree"));
        }
        if nullifier_hash(&witness.secret, &witness.nullifier, &witness.root)
            != witness.nullifier_hash
        {
            return Err(ProverError::InvalidWitness("nullifier hash mismatch"));
        }
        if witness.withdraw_amount.checked_add(witness.fee) != Some(witness.amount) {
            return Err(ProverError::InvalidWitness("amount != withdraw_amount + fee"));
        }
        Ok(())
    }
}

impl Default for MockProver {
    fn default() -> Self {
        Self::new()
    }
}

impl Prover for MockProver {
    fn prove(&self, witness: &Witness) -> Result<Proof, ProverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_witness.lock() {
            *last = Some(witness.clone());
        }

        if self.prove_time_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.prove_time_ms));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProverError::Backend("mock prover set to fail".into()));
        }

        Self::check(witness)?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"shroud-mock-proof-v1");
        for input in witness.public_inputs() {
            hasher.update(&input);
        }

        // Mock proof is 256 bytes (a BN254 Groth16 proof is 128-256 depending on encoding)
        let mut proof_bytes = Vec::with_capacity(256);
        proof_bytes.extend_from_slice(hasher.finalize().as_bytes());
        proof_bytes.extend_from_slice(&[0u8; 224]);

        Ok(Proof(proof_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_privacy::{MerkleTree, Note};

    fn witness_for(note: &Note, fee: u128) -> Witness {
        let mut tree = MerkleTree::new();
        tree.insert(&note.commitment());
        let root = tree.root();
        let path = tree.path_for(&note.commitment()).unwrap();

        Witness {
            secret: *note.secret(),
            nullifier: *note.nullifier(),
            amount: note.amount(),
            siblings: path.siblings,
            indices: path.indices,
            root,
            nullifier_hash: note.nullifier_hash(&root),
            recipient: Address([9u8; 32]),
            fee: NoteValue(fee),
            withdraw_amount: NoteValue(note.amount().as_u128() - fee),
        }
    }

    #[test]
    fn test_mock_proof_for_valid_witness() {
        let note = Note::generate(50).unwrap();
        let prover = MockProver::new();

        let proof = prover.prove(&witness_for(&note, 5)).unwrap();
        assert_eq!(proof.as_bytes().len(), 256);
        assert_eq!(prover.calls(), 1);
        assert_eq!(prover.last_witness().unwrap().fee, NoteValue(5));
    }

    #[test]
    fn test_rejects_bad_nullifier_hash() {
        let note = Note::generate(50).unwrap();
        let mut witness = witness_for(&note, 0);
        witness.nullifier_hash = NullifierHash([1u8; 32]);

        assert_eq!(
            MockProver::new().prove(&witness),
            Err(ProverError::InvalidWitness("nullifier hash mismatch"))
        );
    }

    #[test]
    fn test_rejects_unbalanced_amounts() {
        let note = Note::generate(50).unwrap();
        let mut witness = witness_for(&note, 0);
        witness.withdraw_amount = NoteValue(49);

        assert!(matches!(
            MockProver::new().prove(&witness),
            Err(ProverError::InvalidWitness(_))
        ));
    }

    #[test]
    fn test_witness_debug_redacts_secrets() {
        let note = Note::generate(50).unwrap();
        let witness = witness_for(&note, 0);
        let rendered = format!("{:?}", witness);

        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode(note.secret())));
    }
}
