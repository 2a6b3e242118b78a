//! Pool error taxonomy
//!
//! Every failure a caller must react to differently has its own variant.
//! [`PoolError::class`] groups them the way the UI layer renders them.

use shroud_privacy::{Commitment, NoteError, NoteValue, NullifierHash};
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::{NoteStatus, StorageError};

/// How a caller should treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller mistake; retrying the same request fails again
    Validation,
    /// Infrastructure hiccup; safe to retry, store state is untouched
    Transient,
    /// Authoritative answer from the ledger; terminal for this note/transaction
    Rejected,
    /// Crypto, entropy or storage failure; abort the operation
    Fatal,
}

#[derive(Debug, Error)]
pub enum PoolError {
    // Validation
    #[error("invalid amount: must be a positive integer")]
    InvalidAmount,

    #[error("fee {fee} exceeds note amount {amount}")]
    InvalidFee { fee: NoteValue, amount: NoteValue },

    #[error("note {0} not found")]
    NoteNotFound(Commitment),

    #[error("duplicate commitment {0}")]
    DuplicateCommitment(Commitment),

    #[error("note {0} is already spent")]
    NoteAlreadySpent(Commitment),

    #[error("note {0} is being spent by another withdrawal")]
    AlreadySpent(Commitment),

    #[error("note {0} is not anchored on the ledger yet")]
    NoteNotAnchored(Commitment),

    #[error("no unspent note covers {requested}")]
    NoSuitableNote { requested: NoteValue },

    #[error("note {commitment} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        commitment: Commitment,
        from: NoteStatus,
        to: NoteStatus,
    },

    // Transient
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("merkle path for {0} does not match the current root")]
    InvalidMerklePath(Commitment),

    #[error("sync service stopped")]
    ServiceStopped,

    // Authoritative rejections
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    #[error("nullifier hash {0} already spent on chain")]
    AlreadySpentOnChain(NullifierHash),

    // Fatal
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("corrupt note record: {0}")]
    CorruptRecord(String),

    #[error("amount overflow while summing notes")]
    AmountOverflow,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PoolError {
    pub fn class(&self) -> ErrorClass {
        use PoolError::*;
        match self {
            InvalidAmount
            | InvalidFee { .. }
            | NoteNotFound(_)
            | DuplicateCommitment(_)
            | NoteAlreadySpent(_)
            | AlreadySpent(_)
            | NoteNotAnchored(_)
            | NoSuitableNote { .. }
            | InvalidTransition { .. } => ErrorClass::Validation,

            SubmissionFailed(_)
            | LedgerUnavailable(_)
            | Timeout { .. }
            | InvalidMerklePath(_)
            | ServiceStopped => ErrorClass::Transient,

            InsufficientFunds(_) | LedgerRejected(_) | AlreadySpentOnChain(_) => {
                ErrorClass::Rejected
            }

            EntropyUnavailable(_)
            | ProofGenerationFailed(_)
            | CorruptRecord(_)
            | AmountOverflow
            | Storage(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Map a ledger error raised while broadcasting a transaction
    pub fn from_submission(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds(msg) => PoolError::InsufficientFunds(msg),
            LedgerError::Rejected(msg) => PoolError::LedgerRejected(msg),
            LedgerError::Timeout => PoolError::Timeout {
                operation: "transaction submission",
            },
            other => PoolError::SubmissionFailed(other.to_string()),
        }
    }

    /// Map a ledger error raised by a read-only query
    pub fn from_query(err: LedgerError) -> Self {
        match err {
            LedgerError::Timeout => PoolError::Timeout {
                operation: "ledger query",
            },
            LedgerError::Rejected(msg) => PoolError::LedgerRejected(msg),
            LedgerError::InsufficientFunds(msg) => PoolError::InsufficientFunds(msg),
            other => PoolError::LedgerUnavailable(other.to_string()),
        }
    }
}

impl From<NoteError> for PoolError {
    fn from(err: NoteError) -> Self {
        match err {
            NoteError::InvalidAmount => PoolError::InvalidAmount,
            NoteError::EntropyUnavailable(msg) => PoolError::EntropyUnavailable(msg),
            other @ (NoteError::InvalidHex(_) | NoteError::NonCanonical) => {
                PoolError::CorruptRecord(other.to_string())
            }
        }
    }
}
