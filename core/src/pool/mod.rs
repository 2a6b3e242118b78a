//! Pool orchestration
//!
//! ```text
//!  deposit():   Note ─► NoteStore(pending) ─► Ledger ─► confirmation ─► anchored
//!  withdraw():  NoteStore ─► reserve ─► root/path ─► Prover ─► Ledger ─► spent
//!  reconcile(): NoteStore ◄─► Ledger (deposit events, nullifier set, tx status)
//! ```
//!
//! Collaborators are injected; nothing here reaches for global state.

pub mod deposit;
pub mod sync;
pub mod withdraw;

use std::future::Future;
use std::time::Duration;

use shroud_config::ShroudConfig;

use crate::error::PoolError;
use crate::ledger::LedgerError;

pub use deposit::{Confirmation, DepositOrchestrator, DepositReceipt};
pub use sync::{NoteSyncError, SyncEngine, SyncReport, SyncService};
pub use withdraw::{WithdrawalOrchestrator, WithdrawalReceipt};

/// Bound on read-only ledger queries (root, path, nullifier, events)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DepositConfig {
    pub submit_timeout: Duration,
    /// How long the background confirmation task waits before leaving the
    /// note pending for the sync engine
    pub confirmation_timeout: Duration,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(60),
            confirmation_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&ShroudConfig> for DepositConfig {
    fn from(config: &ShroudConfig) -> Self {
        Self {
            submit_timeout: config.deposit_submit_timeout(),
            confirmation_timeout: config.confirmation_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WithdrawConfig {
    pub query_timeout: Duration,
    pub proof_timeout: Duration,
    pub submit_timeout: Duration,
}

impl Default for WithdrawConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            proof_timeout: Duration::from_secs(120),
            submit_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ShroudConfig> for WithdrawConfig {
    fn from(config: &ShroudConfig) -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            proof_timeout: config.proof_timeout(),
            submit_timeout: config.withdraw_submit_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pending notes older than this with no deposit on chain are orphaned
    pub orphan_after: Duration,
    pub interval: Duration,
    pub query_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            orphan_after: Duration::from_secs(3600),
            interval: Duration::from_secs(30),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl From<&ShroudConfig> for SyncConfig {
    fn from(config: &ShroudConfig) -> Self {
        Self {
            orphan_after: config.orphan_after(),
            interval: config.sync_interval(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Run a read-only ledger query under `limit`
pub(crate) async fn query<T, F>(limit: Duration, fut: F) -> Result<T, PoolError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(PoolError::from_query),
        Err(_) => Err(PoolError::Timeout {
            operation: "ledger query",
        }),
    }
}
