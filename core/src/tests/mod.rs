//! Scenario tests for the note lifecycle against the in-process ledger

mod deposit;
mod withdraw;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use shroud_privacy::Note;

use crate::ledger::{Address, InMemoryLedger, LedgerClient};
use crate::pool::{
    Confirmation, DepositConfig, DepositOrchestrator, SyncConfig, SyncEngine, WithdrawConfig,
    WithdrawalOrchestrator,
};
use crate::prover::{MockProver, Prover};
use crate::signer::{KeypairSigner, Signer};
use crate::storage::NoteStore;

/// Store, ledger and collaborators wired together; the temp dir lives as
/// long as the harness
pub(crate) struct Harness {
    _dir: TempDir,
    pub store: Arc<NoteStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub prover: Arc<MockProver>,
    pub signer: Arc<KeypairSigner>,
}

impl Harness {
    pub fn new(ledger: InMemoryLedger) -> Self {
        Self::with_prover(ledger, MockProver::new())
    }

    pub fn with_prover(ledger: InMemoryLedger, prover: MockProver) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(NoteStore::open(dir.path()).unwrap());
        Self {
            _dir: dir,
            store,
            ledger: Arc::new(ledger),
            prover: Arc::new(prover),
            signer: Arc::new(KeypairSigner::from_seed(&[42u8; 32])),
        }
    }

    fn ledger_client(&self) -> Arc<dyn LedgerClient> {
        self.ledger.clone()
    }

    fn signer_handle(&self) -> Arc<dyn Signer> {
        self.signer.clone()
    }

    pub fn deposits(&self) -> DepositOrchestrator {
        self.deposits_with(DepositConfig::default())
    }

    pub fn deposits_with(&self, config: DepositConfig) -> DepositOrchestrator {
        DepositOrchestrator::new(
            self.store.clone(),
            self.ledger_client(),
            self.signer_handle(),
            config,
        )
    }

    pub fn withdrawals(&self) -> WithdrawalOrchestrator {
        self.withdrawals_with(WithdrawConfig::default())
    }

    pub fn withdrawals_with(&self, config: WithdrawConfig) -> WithdrawalOrchestrator {
        let prover: Arc<dyn Prover> = self.prover.clone();
        WithdrawalOrchestrator::new(
            self.store.clone(),
            self.ledger_client(),
            prover,
            self.signer_handle(),
            config,
        )
    }

    pub fn sync(&self) -> SyncEngine {
        self.sync_with(SyncConfig::default())
    }

    pub fn sync_with(&self, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(self.store.clone(), self.ledger_client(), config)
    }

    /// Deposit `amount`, mine it and wait until the note is anchored
    pub async fn anchored_note(&self, amount: u128) -> Note {
        let receipt = self.deposits().deposit(amount).await.unwrap();
        self.ledger.mine();
        let confirmation = receipt.confirmation.await.unwrap().unwrap();
        assert!(matches!(confirmation, Confirmation::Anchored(_)));
        receipt.note
    }
}

pub(crate) fn recipient() -> Address {
    Address([0x5Au8; 32])
}

pub(crate) fn short_confirmation() -> DepositConfig {
    DepositConfig {
        confirmation_timeout: Duration::from_millis(50),
        ..DepositConfig::default()
    }
}
