//! In-process ledger
//!
//! Runs the pool contract's bookkeeping against a real Poseidon tree:
//! deposits and withdrawals are queued as pending transactions and applied
//! by [`InMemoryLedger::mine`] (or at submission time with auto-mining).
//! Fault switches let tests simulate RPC outages, reverts and spends made
//! by other wallets.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Notify;

use shroud_privacy::{Commitment, MerklePath, MerkleTree, NoteValue, NullifierHash, RootHistory};

use super::{DepositEvent, LedgerClient, LedgerError, TxHandle, TxStatus, WithdrawalRequest};
use crate::signer::{Signer, verify_signature};

/// Roots a withdrawal may reference, matching the pool contract
const ROOT_HISTORY_SIZE: usize = 30;

enum PendingTx {
    Deposit { commitment: Commitment, tx_hash: String },
    Withdrawal { nullifier_hash: NullifierHash, tx_hash: String },
}

struct LedgerState {
    tree: MerkleTree,
    roots: RootHistory,
    block: u64,
    tx_counter: u64,
    auto_mine: bool,
    available: bool,
    /// Spendable funds of the depositing account; `None` is unlimited
    funds: Option<u128>,
    reject_next: Option<String>,
    fail_next: Option<String>,
    mempool: Vec<PendingTx>,
    deposits: HashMap<Commitment, DepositEvent>,
    deposit_txs: HashMap<String, Commitment>,
    nullifiers: HashSet<NullifierHash>,
    withdrawal_txs: HashMap<String, NullifierHash>,
    txs: HashMap<String, TxStatus>,
}

impl LedgerState {
    fn next_tx_hash(&mut self, kind: &[u8], payload: &[u8]) -> String {
        self.tx_counter += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind);
        hasher.update(payload);
        hasher.update(&self.tx_counter.to_le_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    fn take_injected_fault(&mut self) -> Result<(), LedgerError> {
        if let Some(reason) = self.fail_next.take() {
            return Err(LedgerError::Unavailable(reason));
        }
        if let Some(reason) = self.reject_next.take() {
            return Err(LedgerError::Rejected(reason));
        }
        Ok(())
    }

    /// Apply every queued transaction in a new block
    fn mine(&mut self) -> u64 {
        self.block += 1;
        let block = self.block;

        for tx in std::mem::take(&mut self.mempool) {
            match tx {
                PendingTx::Deposit { commitment, tx_hash } => {
                    let status = self.apply_deposit(commitment, &tx_hash, block);
                    self.txs.insert(tx_hash, status);
                }
                PendingTx::Withdrawal {
                    nullifier_hash,
                    tx_hash,
                } => {
                    let status = if self.nullifiers.insert(nullifier_hash) {
                        self.withdrawal_txs.insert(tx_hash.clone(), nullifier_hash);
                        TxStatus::Confirmed { block }
                    } else {
                        TxStatus::Failed {
                            reason: "nullifier already spent".into(),
                        }
                    };
                    self.txs.insert(tx_hash, status);
                }
            }
        }

        block
    }

    fn apply_deposit(&mut self, commitment: Commitment, tx_hash: &str, block: u64) -> TxStatus {
        if self.deposits.contains_key(&commitment) {
            return TxStatus::Failed {
                reason: "commitment already deposited".into(),
            };
        }
        let Some(merkle_index) = self.tree.insert(&commitment) else {
            return TxStatus::Failed {
                reason: "merkle tree is full".into(),
            };
        };
        self.roots.push(self.tree.root());
        self.deposits.insert(
            commitment,
            DepositEvent {
                commitment,
                merkle_index,
                block,
                tx_hash: tx_hash.to_string(),
            },
        );
        self.deposit_txs.insert(tx_hash.to_string(), commitment);
        TxStatus::Confirmed { block }
    }
}

pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    mined: Notify,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let tree = MerkleTree::new();
        let mut roots = RootHistory::new(ROOT_HISTORY_SIZE);
        roots.push(tree.root());

        Self {
            state: Mutex::new(LedgerState {
                tree,
                roots,
                block: 0,
                tx_counter: 0,
                auto_mine: false,
                available: true,
                funds: None,
                reject_next: None,
                fail_next: None,
                mempool: Vec::new(),
                deposits: HashMap::new(),
                deposit_txs: HashMap::new(),
                nullifiers: HashSet::new(),
                withdrawal_txs: HashMap::new(),
                txs: HashMap::new(),
            }),
            mined: Notify::new(),
        }
    }

    /// Mine a block after every accepted submission
    pub fn with_auto_mine(self) -> Self {
        self.with_state_mut(|s| s.auto_mine = true);
        self
    }

    /// Limit the depositing account's funds
    pub fn with_funds(self, amount: u128) -> Self {
        self.with_state_mut(|s| s.funds = Some(amount));
        self
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Run `f` against the ledger as an RPC call would: fails while the
    /// ledger is marked unavailable
    fn call<T>(
        &self,
        f: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        self.with_state_mut(|s| {
            if !s.available {
                return Err(LedgerError::Unavailable("connection refused".into()));
            }
            f(s)
        })
    }

    /// Seal the mempool into a block and wake confirmation waiters
    pub fn mine(&self) -> u64 {
        let block = self.with_state_mut(LedgerState::mine);
        debug!("in-memory ledger mined block {}", block);
        self.mined.notify_waiters();
        block
    }

    pub fn set_available(&self, available: bool) {
        self.with_state_mut(|s| s.available = available);
        if !available {
            self.mined.notify_waiters();
        }
    }

    /// The next submission reverts with `reason`
    pub fn reject_next_submission(&self, reason: &str) {
        self.with_state_mut(|s| s.reject_next = Some(reason.to_string()));
    }

    /// The next submission fails at the transport layer
    pub fn fail_next_submission(&self, reason: &str) {
        self.with_state_mut(|s| s.fail_next = Some(reason.to_string()));
    }

    /// Insert a deposit made by another wallet
    pub fn record_external_deposit(&self, commitment: Commitment) -> Option<DepositEvent> {
        self.with_state_mut(|s| {
            let tx_hash = s.next_tx_hash(b"external-deposit", commitment.as_bytes());
            s.block += 1;
            let block = s.block;
            let status = s.apply_deposit(commitment, &tx_hash, block);
            s.txs.insert(tx_hash, status);
            s.deposits.get(&commitment).cloned()
        })
    }

    /// Spend a nullifier hash outside this wallet
    pub fn spend_nullifier(&self, hash: NullifierHash) {
        self.with_state_mut(|s| s.nullifiers.insert(hash));
    }

    /// Mark a confirmed withdrawal as reverted and release its nullifier
    pub fn revert_withdrawal(&self, tx_hash: &str, reason: &str) -> bool {
        self.with_state_mut(|s| {
            let Some(hash) = s.withdrawal_txs.remove(tx_hash) else {
                return false;
            };
            s.nullifiers.remove(&hash);
            s.txs.insert(
                tx_hash.to_string(),
                TxStatus::Failed {
                    reason: reason.to_string(),
                },
            );
            true
        })
    }

    /// Drop a queued (unmined) withdrawal, as if it was evicted from the mempool
    pub fn fail_pending_withdrawal(&self, tx_hash: &str, reason: &str) -> bool {
        self.with_state_mut(|s| {
            let before = s.mempool.len();
            s.mempool.retain(
                |tx| !matches!(tx, PendingTx::Withdrawal { tx_hash: h, .. } if h == tx_hash),
            );
            if s.mempool.len() == before {
                return false;
            }
            s.txs.insert(
                tx_hash.to_string(),
                TxStatus::Failed {
                    reason: reason.to_string(),
                },
            );
            true
        })
    }

    fn after_submit(&self) {
        let auto = self.with_state_mut(|s| s.auto_mine);
        if auto {
            self.mine();
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn sign_checked(signer: &dyn Signer, payload: &[u8]) -> Result<(), LedgerError> {
    let signature = signer
        .sign(payload)
        .map_err(|e| LedgerError::Signing(e.to_string()))?;
    if !verify_signature(&signer.address(), payload, &signature) {
        return Err(LedgerError::Rejected("invalid signature".into()));
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit_deposit(
        &self,
        commitment: &Commitment,
        value: NoteValue,
        signer: &dyn Signer,
    ) -> Result<TxHandle, LedgerError> {
        let mut payload = commitment.0.to_vec();
        payload.extend_from_slice(&value.as_u128().to_le_bytes());
        sign_checked(signer, &payload)?;

        let tx_hash = self.call(|s| {
            s.take_injected_fault()?;
            if let Some(funds) = s.funds {
                if value.as_u128() > funds {
                    return Err(LedgerError::InsufficientFunds(format!(
                        "insufficient funds: balance {}, required {}",
                        funds, value
                    )));
                }
                s.funds = Some(funds - value.as_u128());
            }

            let tx_hash = s.next_tx_hash(b"deposit", &payload);
            s.mempool.push(PendingTx::Deposit {
                commitment: *commitment,
                tx_hash: tx_hash.clone(),
            });
            s.txs.insert(tx_hash.clone(), TxStatus::Pending);
            Ok(tx_hash)
        })?;

        debug!("deposit {} queued as {}", commitment, tx_hash);
        self.after_submit();
        Ok(TxHandle::new(tx_hash))
    }

    async fn submit_withdrawal(
        &self,
        request: &WithdrawalRequest,
        signer: &dyn Signer,
    ) -> Result<TxHandle, LedgerError> {
        let mut payload = request.nullifier_hash.0.to_vec();
        payload.extend_from_slice(&request.root);
        payload.extend_from_slice(request.recipient.as_bytes());
        payload.extend_from_slice(&request.fee.as_u128().to_le_bytes());
        sign_checked(signer, &payload)?;

        let tx_hash = self.call(|s| {
            s.take_injected_fault()?;
            if request.proof.is_empty() {
                return Err(LedgerError::Rejected("invalid withdraw proof".into()));
            }
            if !s.roots.is_valid(&request.root) {
                return Err(LedgerError::Rejected("cannot find your merkle root".into()));
            }
            if s.nullifiers.contains(&request.nullifier_hash) {
                return Err(LedgerError::Rejected("the note has been already spent".into()));
            }

            let tx_hash = s.next_tx_hash(b"withdraw", &payload);
            s.mempool.push(PendingTx::Withdrawal {
                nullifier_hash: request.nullifier_hash,
                tx_hash: tx_hash.clone(),
            });
            s.txs.insert(tx_hash.clone(), TxStatus::Pending);
            Ok(tx_hash)
        })?;

        debug!("withdrawal {} queued as {}", request.nullifier_hash, tx_hash);
        self.after_submit();
        Ok(TxHandle::new(tx_hash))
    }

    async fn current_root(&self) -> Result<[u8; 32], LedgerError> {
        self.call(|s| Ok(s.tree.root()))
    }

    async fn merkle_path(&self, commitment: &Commitment) -> Result<MerklePath, LedgerError> {
        self.call(|s| {
            s.tree
                .path_for(commitment)
                .ok_or(LedgerError::UnknownCommitment(*commitment))
        })
    }

    async fn is_nullifier_spent(&self, hash: &NullifierHash) -> Result<bool, LedgerError> {
        self.call(|s| Ok(s.nullifiers.contains(hash)))
    }

    async fn has_commitment(&self, commitment: &Commitment) -> Result<bool, LedgerError> {
        self.call(|s| Ok(s.deposits.contains_key(commitment)))
    }

    async fn deposit_event(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<DepositEvent>, LedgerError> {
        self.call(|s| Ok(s.deposits.get(commitment).cloned()))
    }

    async fn wait_for_deposit(&self, tx: &TxHandle) -> Result<DepositEvent, LedgerError> {
        loop {
            let notified = self.mined.notified();
            tokio::pin!(notified);
            // Register before checking so a mine() between the check and
            // the await is not missed
            notified.as_mut().enable();

            let resolved = self.call(|s| match s.txs.get(&tx.tx_hash) {
                Some(TxStatus::Confirmed { .. }) => s
                    .deposit_txs
                    .get(&tx.tx_hash)
                    .and_then(|c| s.deposits.get(c))
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| LedgerError::Rejected("transaction is not a deposit".into())),
                Some(TxStatus::Failed { reason }) => Err(LedgerError::Rejected(reason.clone())),
                Some(TxStatus::Pending) => Ok(None),
                Some(TxStatus::Unknown) | None => Err(LedgerError::Rejected(format!(
                    "unknown transaction {}",
                    tx.tx_hash
                ))),
            })?;

            if let Some(event) = resolved {
                return Ok(event);
            }
            notified.await;
        }
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, LedgerError> {
        self.call(|s| Ok(s.txs.get(tx_hash).cloned().unwrap_or(TxStatus::Unknown)))
    }
}
