//! Sync Engine
//!
//! Reconciles the note store with the ledger after connectivity gaps.
//! Every note is handled independently: a failed query is recorded in the
//! report and the pass moves on. Re-running without chain activity changes
//! nothing.
//!
//! | status   | check                                   | transition           |
//! |----------|-----------------------------------------|----------------------|
//! | pending  | deposit event / deposit tx / age        | anchored or orphaned |
//! | orphaned | deposit event                           | anchored             |
//! | anchored | nullifier hash at current root spent    | spent                |
//! | spent    | recorded withdrawal tx status           | confirmed / reverted |

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use shroud_privacy::Commitment;

use super::{SyncConfig, query};
use crate::error::PoolError;
use crate::ledger::{LedgerClient, TxStatus};
use crate::storage::note_store::unix_now;
use crate::storage::{NoteStatus, NoteStore, SpendOutcome, StoredNote};

#[derive(Debug)]
pub struct NoteSyncError {
    pub commitment: Commitment,
    pub error: PoolError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Notes whose stored state changed
    pub updated: usize,
    pub anchored: usize,
    pub spent: usize,
    pub orphaned: usize,
    pub reverted: usize,
    pub confirmed: usize,
    pub errors: Vec<NoteSyncError>,
}

impl SyncReport {
    fn record(&mut self, change: Change) {
        self.updated += 1;
        match change {
            Change::Anchored => self.anchored += 1,
            Change::Spent => self.spent += 1,
            Change::Orphaned => self.orphaned += 1,
            Change::Reverted => self.reverted += 1,
            Change::Confirmed => self.confirmed += 1,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.updated == 0 && self.errors.is_empty()
    }
}

enum Change {
    Anchored,
    Spent,
    Orphaned,
    Reverted,
    Confirmed,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<NoteStore>,
    ledger: Arc<dyn LedgerClient>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<NoteStore>, ledger: Arc<dyn LedgerClient>, config: SyncConfig) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    /// One reconciliation pass over every stored note
    pub async fn reconcile(&self) -> SyncReport {
        let mut report = SyncReport::default();
        let notes = self.store.notes().await;

        let needs_root = notes.iter().any(|n| n.status == NoteStatus::Anchored);
        let root = if needs_root {
            Some(query(self.config.query_timeout, self.ledger.current_root()).await)
        } else {
            None
        };
        let now = unix_now();

        for stored in &notes {
            let commitment = stored.commitment();
            let result = match stored.status {
                NoteStatus::Pending | NoteStatus::Orphaned => self.sync_deposit(stored, now).await,
                NoteStatus::Anchored => match &root {
                    Some(Ok(root)) => self.sync_anchored(stored, root).await,
                    Some(Err(err)) => Err(PoolError::LedgerUnavailable(format!(
                        "current root unavailable: {}",
                        err
                    ))),
                    None => Ok(None),
                },
                NoteStatus::Spent => self.sync_spent(stored).await,
            };

            match result {
                Ok(Some(change)) => report.record(change),
                Ok(None) => {}
                Err(error) => {
                    warn!("sync of note {} failed: {}", commitment, error);
                    report.errors.push(NoteSyncError { commitment, error });
                }
            }
        }

        if !report.is_clean() {
            info!(
                "sync: {} updated ({} anchored, {} spent, {} orphaned, {} reverted, {} confirmed), {} errors",
                report.updated,
                report.anchored,
                report.spent,
                report.orphaned,
                report.reverted,
                report.confirmed,
                report.errors.len()
            );
        }
        report
    }

    async fn sync_deposit(&self, stored: &StoredNote, now: u64) -> Result<Option<Change>, PoolError> {
        let commitment = stored.commitment();
        let limit = self.config.query_timeout;

        if let Some(event) = query(limit, self.ledger.deposit_event(&commitment)).await? {
            let changed = self
                .store
                .set_anchored(&commitment, event.merkle_index, event.block, &event.tx_hash)
                .await?;
            return Ok(changed.then_some(Change::Anchored));
        }

        if stored.status != NoteStatus::Pending {
            return Ok(None);
        }

        if let Some(tx_hash) = &stored.deposit_tx_hash {
            match query(limit, self.ledger.transaction_status(tx_hash)).await? {
                TxStatus::Pending => return Ok(None),
                TxStatus::Failed { reason } => {
                    let changed = self.store.mark_orphaned(&commitment, &reason).await?;
                    return Ok(changed.then_some(Change::Orphaned));
                }
                TxStatus::Confirmed { .. } | TxStatus::Unknown => {}
            }
        }

        let age = now.saturating_sub(stored.created_at);
        if age >= self.config.orphan_after.as_secs() {
            let changed = self
                .store
                .mark_orphaned(&commitment, "deposit not observed on the ledger")
                .await?;
            return Ok(changed.then_some(Change::Orphaned));
        }

        Ok(None)
    }

    async fn sync_anchored(
        &self,
        stored: &StoredNote,
        root: &[u8; 32],
    ) -> Result<Option<Change>, PoolError> {
        let commitment = stored.commitment();
        let hash = stored.note.nullifier_hash(root);

        if !query(self.config.query_timeout, self.ledger.is_nullifier_spent(&hash)).await? {
            return Ok(None);
        }

        debug!("nullifier hash of {} observed on chain", commitment);
        match self.store.mark_spent(&commitment).await? {
            SpendOutcome::Marked => Ok(Some(Change::Spent)),
            SpendOutcome::AlreadySpent => Ok(None),
        }
    }

    async fn sync_spent(&self, stored: &StoredNote) -> Result<Option<Change>, PoolError> {
        let Some(spend) = stored.spend.as_ref().filter(|s| !s.confirmed) else {
            return Ok(None);
        };
        let commitment = stored.commitment();
        let limit = self.config.query_timeout;

        match query(limit, self.ledger.transaction_status(&spend.tx_hash)).await? {
            TxStatus::Confirmed { .. } => {
                let changed = self.store.confirm_spend(&commitment, &spend.tx_hash).await?;
                Ok(changed.then_some(Change::Confirmed))
            }
            TxStatus::Failed { reason } => {
                if query(limit, self.ledger.is_nullifier_spent(&spend.nullifier_hash)).await? {
                    return Ok(None);
                }
                warn!(
                    "withdrawal {} of note {} failed on chain: {}",
                    spend.tx_hash, commitment, reason
                );
                let changed = self.store.revert_spend(&commitment, &spend.tx_hash).await?;
                Ok(changed.then_some(Change::Reverted))
            }
            TxStatus::Pending | TxStatus::Unknown => Ok(None),
        }
    }
}

// Sync Service

enum SyncCommand {
    SyncNow(oneshot::Sender<SyncReport>),
    Shutdown,
}

/// Runs [`SyncEngine::reconcile`] on an interval and on demand
pub struct SyncService {
    command_tx: mpsc::Sender<SyncCommand>,
    task: JoinHandle<()>,
}

impl SyncService {
    pub fn start(engine: SyncEngine, interval: Duration) -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<SyncCommand>(16);

        let task = tokio::spawn(async move {
            // First pass after one interval; callers wanting one now use sync_now
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    cmd = command_rx.recv() => match cmd {
                        Some(SyncCommand::SyncNow(reply)) => {
                            let report = engine.reconcile().await;
                            let _ = reply.send(report);
                        }
                        Some(SyncCommand::Shutdown) | None => {
                            info!("sync service shutting down");
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        let report = engine.reconcile().await;
                        for failure in &report.errors {
                            if !failure.error.is_retryable() {
                                error!("note {} needs attention: {}", failure.commitment, failure.error);
                            }
                        }
                    }
                }
            }
        });

        Self { command_tx, task }
    }

    /// Run a pass now and wait for its report
    pub async fn sync_now(&self) -> Result<SyncReport, PoolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SyncCommand::SyncNow(reply_tx))
            .await
            .map_err(|_| PoolError::ServiceStopped)?;
        reply_rx.await.map_err(|_| PoolError::ServiceStopped)
    }

    /// Stop the loop and wait for an in-progress pass to finish
    pub async fn shutdown(self) -> Result<(), PoolError> {
        self.command_tx
            .send(SyncCommand::Shutdown)
            .await
            .map_err(|_| PoolError::ServiceStopped)?;
        self.task.await.map_err(|_| PoolError::ServiceStopped)
    }
}
