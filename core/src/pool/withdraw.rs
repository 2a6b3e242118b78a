//! Withdrawal Orchestrator
//!
//! ```text
//!  reserve note ─► fee check ─► root + path ─► verify path ─► nullifier hash
//!       │                                                        │
//!       │                        spent on chain? ─ yes ─► mark spent, fail
//!       ▼                                                        │ no
//!  release on drop ◄─ mark spent ◄─ submit ◄─ prove (blocking) ◄─┘
//! ```
//!
//! The note is marked spent as soon as submission succeeds; the sync engine
//! reverts that if the withdrawal later fails on chain.

use std::sync::Arc;

use log::{debug, info, warn};

use shroud_privacy::{Commitment, Note, NoteValue, NullifierHash};

use super::{WithdrawConfig, query};
use crate::error::PoolError;
use crate::ledger::{Address, LedgerClient, WithdrawalRequest};
use crate::prover::{Proof, Prover, Witness};
use crate::signer::Signer;
use crate::storage::{NoteStore, SpendOutcome, SpendRecord, SpendReservation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    pub tx_hash: String,
    pub commitment: Commitment,
    pub nullifier_hash: NullifierHash,
    pub root: [u8; 32],
    pub recipient: Address,
    pub fee: NoteValue,
    /// Amount the recipient receives
    pub withdraw_amount: NoteValue,
}

#[derive(Clone)]
pub struct WithdrawalOrchestrator {
    store: Arc<NoteStore>,
    ledger: Arc<dyn LedgerClient>,
    prover: Arc<dyn Prover>,
    signer: Arc<dyn Signer>,
    config: WithdrawConfig,
}

impl WithdrawalOrchestrator {
    pub fn new(
        store: Arc<NoteStore>,
        ledger: Arc<dyn LedgerClient>,
        prover: Arc<dyn Prover>,
        signer: Arc<dyn Signer>,
        config: WithdrawConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            prover,
            signer,
            config,
        }
    }

    /// Spend `note` to `recipient`, paying `fee` out of the note amount
    pub async fn withdraw(
        &self,
        note: &Note,
        recipient: Address,
        fee: u128,
    ) -> Result<WithdrawalReceipt, PoolError> {
        let reservation = self.store.reserve(&note.commitment()).await?;
        self.spend_reserved(&reservation, recipient, fee).await
    }

    /// Withdraw `value` using the first note (insertion order) that covers it
    pub async fn withdraw_value(
        &self,
        value: u128,
        recipient: Address,
        fee: u128,
    ) -> Result<WithdrawalReceipt, PoolError> {
        if value == 0 {
            return Err(PoolError::InvalidAmount);
        }
        let reservation = self.store.select_note(NoteValue(value)).await?;
        debug!(
            "selected note {} ({} units) for withdrawal of {}",
            reservation.commitment(),
            reservation.note().amount(),
            value
        );
        self.spend_reserved(&reservation, recipient, fee).await
    }

    /// Run the pipeline for a note this caller holds the reservation on.
    /// The reservation is released by the caller once this returns.
    async fn spend_reserved(
        &self,
        reservation: &SpendReservation<'_>,
        recipient: Address,
        fee: u128,
    ) -> Result<WithdrawalReceipt, PoolError> {
        let note: &Note = &reservation.note().note;
        let commitment = reservation.commitment();

        let fee = NoteValue(fee);
        let withdraw_amount = note.amount().checked_sub(fee).ok_or(PoolError::InvalidFee {
            fee,
            amount: note.amount(),
        })?;

        let limit = self.config.query_timeout;
        let root = query(limit, self.ledger.current_root()).await?;
        let path = query(limit, self.ledger.merkle_path(&commitment)).await?;
        if !path.verify(&commitment, &root) {
            warn!("merkle path for {} does not reach root {}", commitment, hex::encode(root));
            return Err(PoolError::InvalidMerklePath(commitment));
        }

        let nullifier_hash = note.nullifier_hash(&root);
        if query(limit, self.ledger.is_nullifier_spent(&nullifier_hash)).await? {
            warn!("note {} already spent on chain, updating local state", commitment);
            self.store.mark_spent(&commitment).await?;
            return Err(PoolError::AlreadySpentOnChain(nullifier_hash));
        }

        let witness = Witness {
            secret: *note.secret(),
            nullifier: *note.nullifier(),
            amount: note.amount(),
            siblings: path.siblings,
            indices: path.indices,
            root,
            nullifier_hash,
            recipient,
            fee,
            withdraw_amount,
        };
        let proof = self.prove(witness).await?;
        debug!("proof for {} generated ({} bytes)", commitment, proof.as_bytes().len());

        let request = WithdrawalRequest {
            proof,
            root,
            nullifier_hash,
            recipient,
            fee,
        };
        let submitted = tokio::time::timeout(
            self.config.submit_timeout,
            self.ledger
                .submit_withdrawal(&request, self.signer.as_ref()),
        )
        .await;
        let tx = match submitted {
            Ok(Ok(tx)) => tx,
            Ok(Err(err)) => return Err(PoolError::from_submission(err)),
            Err(_) => {
                return Err(PoolError::Timeout {
                    operation: "withdrawal submission",
                });
            }
        };
        info!("withdrawal of {} submitted in tx {}", commitment, tx.tx_hash);

        let record = SpendRecord {
            tx_hash: tx.tx_hash.clone(),
            nullifier_hash,
            root,
            confirmed: false,
        };
        if self.store.mark_spent_with(&commitment, record).await? == SpendOutcome::AlreadySpent {
            debug!("note {} was already marked spent by sync", commitment);
        }

        Ok(WithdrawalReceipt {
            tx_hash: tx.tx_hash,
            commitment,
            nullifier_hash,
            root,
            recipient,
            fee,
            withdraw_amount,
        })
    }

    /// Run the prover off the async workers, bounded by the proof timeout
    async fn prove(&self, witness: Witness) -> Result<Proof, PoolError> {
        let prover = self.prover.clone();
        let proving = tokio::task::spawn_blocking(move || prover.prove(&witness));

        match tokio::time::timeout(self.config.proof_timeout, proving).await {
            Ok(Ok(Ok(proof))) => Ok(proof),
            Ok(Ok(Err(err))) => Err(PoolError::ProofGenerationFailed(err.to_string())),
            Ok(Err(join)) => Err(PoolError::ProofGenerationFailed(format!(
                "prover task failed: {}",
                join
            ))),
            Err(_) => Err(PoolError::Timeout {
                operation: "proof generation",
            }),
        }
    }
}
