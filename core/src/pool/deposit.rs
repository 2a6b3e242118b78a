//! Deposit Orchestrator
//!
//! The note is persisted as `Pending` before the deposit is broadcast, so a
//! crash after broadcast still leaves a locally trackable note. `deposit`
//! returns right after submission; confirmation runs in a spawned task and
//! anything it misses is picked up by the sync engine.

use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;

use shroud_privacy::{Commitment, Note};

use super::DepositConfig;
use crate::error::{ErrorClass, PoolError};
use crate::ledger::{DepositEvent, LedgerClient, LedgerError, TxHandle};
use crate::signer::Signer;
use crate::storage::NoteStore;

/// Outcome of waiting for a deposit transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Anchored(DepositEvent),
    /// The ledger explicitly rejected the deposit
    Orphaned { reason: String },
    /// No answer within the confirmation timeout; the note stays pending
    Pending,
}

#[derive(Debug)]
pub struct DepositReceipt {
    pub note: Note,
    pub tx_hash: String,
    /// Background confirmation; dropping it does not cancel the task
    pub confirmation: JoinHandle<Result<Confirmation, PoolError>>,
}

#[derive(Clone)]
pub struct DepositOrchestrator {
    store: Arc<NoteStore>,
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn Signer>,
    config: DepositConfig,
}

impl DepositOrchestrator {
    pub fn new(
        store: Arc<NoteStore>,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        config: DepositConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            signer,
            config,
        }
    }

    /// Generate a note for `amount`, persist it and broadcast the deposit
    pub async fn deposit(&self, amount: u128) -> Result<DepositReceipt, PoolError> {
        let note = Note::generate(amount)?;
        let commitment = note.commitment();

        self.store.add(note.clone()).await?;
        info!("deposit note {} persisted as pending ({} units)", commitment, amount);

        let submitted = tokio::time::timeout(
            self.config.submit_timeout,
            self.ledger
                .submit_deposit(&commitment, note.amount(), self.signer.as_ref()),
        )
        .await;

        let tx = match submitted {
            Ok(Ok(tx)) => tx,
            Ok(Err(err)) => {
                let err = PoolError::from_submission(err);
                if err.class() == ErrorClass::Rejected {
                    return Err(self.orphan_rejected(&commitment, err).await);
                }
                warn!("deposit {} not submitted, note stays pending: {}", commitment, err);
                return Err(err);
            }
            Err(_) => {
                warn!(
                    "deposit {} submission timed out, note stays pending",
                    commitment
                );
                return Err(PoolError::Timeout {
                    operation: "deposit submission",
                });
            }
        };

        self.store.record_deposit_tx(&commitment, &tx.tx_hash).await?;
        info!("deposit {} submitted in tx {}", commitment, tx.tx_hash);

        let this = self.clone();
        let handle = tx.clone();
        let confirmation = tokio::spawn(async move { this.confirm(&commitment, &handle).await });

        Ok(DepositReceipt {
            note,
            tx_hash: tx.tx_hash,
            confirmation,
        })
    }

    /// Orphan the note of a deposit the ledger refused. The rejection is
    /// what the caller sees even if the store cannot record it.
    async fn orphan_rejected(&self, commitment: &Commitment, err: PoolError) -> PoolError {
        if let Err(store_err) = self.store.mark_orphaned(commitment, &err.to_string()).await {
            warn!(
                "deposit {} was rejected but could not be orphaned: {}",
                commitment, store_err
            );
        }
        err
    }

    /// Wait for `tx` and record the outcome. Only an explicit confirmation
    /// or rejection changes the note; timeouts and outages leave it pending.
    pub async fn confirm(
        &self,
        commitment: &Commitment,
        tx: &TxHandle,
    ) -> Result<Confirmation, PoolError> {
        let waited =
            tokio::time::timeout(self.config.confirmation_timeout, self.ledger.wait_for_deposit(tx))
                .await;

        match waited {
            Ok(Ok(event)) => {
                self.store
                    .set_anchored(commitment, event.merkle_index, event.block, &event.tx_hash)
                    .await?;
                Ok(Confirmation::Anchored(event))
            }
            Ok(Err(LedgerError::Rejected(reason))) => {
                self.store.mark_orphaned(commitment, &reason).await?;
                Ok(Confirmation::Orphaned { reason })
            }
            Ok(Err(err)) if err.is_transient() => {
                warn!("confirmation of {} interrupted: {}", commitment, err);
                Ok(Confirmation::Pending)
            }
            Ok(Err(err)) => Err(PoolError::from_query(err)),
            Err(_) => {
                info!(
                    "deposit {} not confirmed within {:?}, left for sync",
                    commitment, self.config.confirmation_timeout
                );
                Ok(Confirmation::Pending)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::signer::KeypairSigner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rejection_survives_orphaning_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(NoteStore::open(dir.path()).unwrap());
        let deposits = DepositOrchestrator::new(
            store.clone(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(KeypairSigner::from_seed(&[7u8; 32])),
            DepositConfig::default(),
        );

        // Unknown to the store, so orphaning it fails
        let stranger = Commitment([9u8; 32]);
        let err = deposits
            .orphan_rejected(&stranger, PoolError::LedgerRejected("nonce too low".into()))
            .await;

        assert!(matches!(err, PoolError::LedgerRejected(ref m) if m == "nonce too low"));
        assert!(store.notes().await.is_empty());
    }
}
