//! Shroud Core
//!
//! Client-side bookkeeping for a shielded pool wallet: the persisted note
//! store, deposit and withdrawal orchestration, and reconciliation against
//! the ledger.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            shroud-core                                │
//! │                                                                       │
//! │  DepositOrchestrator ──┐                     ┌── LedgerClient (trait) │
//! │  WithdrawalOrchestrator├──► NoteStore ◄──────┤── Prover (trait)       │
//! │  SyncEngine / Service ─┘   (RocksDB)         └── Signer (trait)       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod ledger;
pub mod pool;
pub mod prover;
pub mod signer;
pub mod storage;

#[cfg(test)]
mod tests;

pub use error::{ErrorClass, PoolError};
pub use ledger::{
    Address, DepositEvent, InMemoryLedger, LedgerClient, LedgerError, TxHandle, TxStatus,
    WithdrawalRequest,
};
pub use pool::{
    Confirmation, DepositConfig, DepositOrchestrator, DepositReceipt, NoteSyncError, SyncConfig,
    SyncEngine, SyncReport, SyncService, WithdrawConfig, WithdrawalOrchestrator,
    WithdrawalReceipt,
};
pub use prover::{MockProver, Proof, Prover, ProverError, Witness};
pub use signer::{KeypairSigner, Signer, SignerError};
pub use storage::{
    ImportSummary, NoteRecord, NoteStatus, NoteStore, SpendOutcome, SpendRecord, StorageError,
    StoredNote,
};
