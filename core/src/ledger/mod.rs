//! Ledger Client boundary
//!
//! The wallet core never talks to a chain directly; everything goes through
//! [`LedgerClient`]. Production builds bind it to the pool contract, tests
//! and local runs use [`memory::InMemoryLedger`].
//!
//! ```text
//! ┌──────────────┐  submit_deposit / submit_withdrawal   ┌──────────────┐
//! │ Orchestrators│ ────────────────────────────────────► │              │
//! │              │  current_root / merkle_path           │ LedgerClient │
//! │  Sync Engine │ ◄──────────────────────────────────── │              │
//! └──────────────┘  is_nullifier_spent / deposit_event   └──────────────┘
//! ```

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use shroud_privacy::{
    Commitment, MerklePath, NoteError, NoteValue, NullifierHash, bytes32_from_hex,
};

use crate::prover::Proof;
use crate::signer::Signer;

pub use memory::InMemoryLedger;

/// A ledger account (recipient or signer)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bytes32_from_hex(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.to_hex())
    }
}

/// Handle to a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle {
    pub tx_hash: String,
}

impl TxHandle {
    pub fn new(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
        }
    }
}

/// Confirmed deposit as emitted by the pool contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub commitment: Commitment,
    pub merkle_index: u64,
    pub block: u64,
    pub tx_hash: String,
}

/// Observed state of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed { block: u64 },
    Failed { reason: String },
    /// The ledger has no record of the hash
    Unknown,
}

/// Public inputs and proof sent to the pool's withdraw entrypoint
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub proof: Proof,
    pub root: [u8; 32],
    pub nullifier_hash: NullifierHash,
    pub recipient: Address,
    pub fee: NoteValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger request timed out")]
    Timeout,

    #[error("transaction reverted: {0}")]
    Rejected(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("commitment {0} is not in the accumulator")]
    UnknownCommitment(Commitment),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl LedgerError {
    /// Whether the caller may retry the same request
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout)
    }
}

/// Chain access consumed by the wallet core
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Broadcast a deposit of `value` bound to `commitment`
    async fn submit_deposit(
        &self,
        commitment: &Commitment,
        value: NoteValue,
        signer: &dyn Signer,
    ) -> Result<TxHandle, LedgerError>;

    /// Broadcast a withdrawal
    async fn submit_withdrawal(
        &self,
        request: &WithdrawalRequest,
        signer: &dyn Signer,
    ) -> Result<TxHandle, LedgerError>;

    /// Current accumulator root
    async fn current_root(&self) -> Result<[u8; 32], LedgerError>;

    /// Authentication path of `commitment` against the current root
    async fn merkle_path(&self, commitment: &Commitment) -> Result<MerklePath, LedgerError>;

    async fn is_nullifier_spent(&self, hash: &NullifierHash) -> Result<bool, LedgerError>;

    async fn has_commitment(&self, commitment: &Commitment) -> Result<bool, LedgerError>;

    /// Deposit event for `commitment`, if the deposit is confirmed
    async fn deposit_event(&self, commitment: &Commitment)
    -> Result<Option<DepositEvent>, LedgerError>;

    /// Resolve once the deposit transaction confirms (or fails)
    async fn wait_for_deposit(&self, tx: &TxHandle) -> Result<DepositEvent, LedgerError>;

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, LedgerError>;
}
