use std::time::Duration;

use shroud_privacy::{Note, NoteValue};

use super::{Harness, recipient};
use crate::error::{ErrorClass, PoolError};
use crate::ledger::{InMemoryLedger, LedgerClient};
use crate::pool::WithdrawConfig;
use crate::prover::MockProver;
use crate::storage::NoteStatus;

fn auto_mined() -> Harness {
    Harness::new(InMemoryLedger::new().with_auto_mine())
}

#[tokio::test]
async fn withdrawal_marks_note_spent() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;
    let before = h.store.balance().await.unwrap();

    let receipt = h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap();

    let stored = h.store.get(&note.commitment()).await.unwrap();
    assert!(stored.is_spent());
    let spend = stored.spend.unwrap();
    assert_eq!(spend.tx_hash, receipt.tx_hash);
    assert_eq!(spend.nullifier_hash, receipt.nullifier_hash);
    assert_eq!(
        h.store.balance().await.unwrap(),
        before.checked_sub(NoteValue(50)).unwrap()
    );
    assert!(h.ledger.is_nullifier_spent(&receipt.nullifier_hash).await.unwrap());
}

#[tokio::test]
async fn witness_carries_note_opening_and_public_inputs() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;

    let receipt = h.withdrawals().withdraw(&note, recipient(), 5).await.unwrap();
    let witness = h.prover.last_witness().unwrap();

    assert_eq!(&witness.secret, note.secret());
    assert_eq!(&witness.nullifier, note.nullifier());
    assert_eq!(witness.amount, NoteValue(50));
    assert_eq!(witness.fee, NoteValue(5));
    assert_eq!(witness.withdraw_amount, NoteValue(45));
    assert_eq!(witness.root, receipt.root);
    assert_eq!(witness.nullifier_hash, note.nullifier_hash(&receipt.root));
    assert_eq!(witness.recipient, recipient());
    assert_eq!(witness.siblings.len(), shroud_privacy::TREE_DEPTH);
    assert_eq!(receipt.withdraw_amount, NoteValue(45));
}

#[tokio::test]
async fn second_withdrawal_rejected_without_proving() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;
    let withdrawals = h.withdrawals();

    withdrawals.withdraw(&note, recipient(), 0).await.unwrap();
    let err = withdrawals.withdraw(&note, recipient(), 0).await.unwrap_err();

    assert!(matches!(err, PoolError::NoteAlreadySpent(c) if c == note.commitment()));
    assert_eq!(h.prover.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_submit_once() {
    let h = Harness::with_prover(
        InMemoryLedger::new().with_auto_mine(),
        MockProver::with_prove_time(200),
    );
    let note = h.anchored_note(50).await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let withdrawals = h.withdrawals();
        let note = note.clone();
        tasks.push(tokio::spawn(async move {
            withdrawals.withdraw(&note, recipient(), 0).await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(
                PoolError::AlreadySpent(_)
                | PoolError::NoteAlreadySpent(_)
                | PoolError::AlreadySpentOnChain(_),
            ) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.prover.calls(), 1);
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_value_withdrawals_use_distinct_notes() {
    let h = Harness::with_prover(
        InMemoryLedger::new().with_auto_mine(),
        MockProver::with_prove_time(200),
    );
    h.anchored_note(50).await;
    h.anchored_note(60).await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let withdrawals = h.withdrawals();
        tasks.push(tokio::spawn(async move {
            withdrawals.withdraw_value(40, recipient(), 0).await
        }));
    }

    let mut spent = Vec::new();
    for task in tasks {
        spent.push(task.await.unwrap().unwrap().commitment);
    }

    assert_ne!(spent[0], spent[1]);
    assert_eq!(h.prover.calls(), 2);
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(0));
}

#[tokio::test]
async fn fee_larger_than_note_rejected() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;

    let err = h.withdrawals().withdraw(&note, recipient(), 51).await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::InvalidFee {
            fee: NoteValue(51),
            amount: NoteValue(50)
        }
    ));
    assert_eq!(h.prover.calls(), 0);
    assert_eq!(
        h.store.get(&note.commitment()).await.unwrap().status,
        NoteStatus::Anchored
    );
}

#[tokio::test]
async fn unanchored_and_unknown_notes_rejected() {
    let h = Harness::new(InMemoryLedger::new());
    let receipt = h.deposits().deposit(20).await.unwrap();

    let err = h
        .withdrawals()
        .withdraw(&receipt.note, recipient(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::NoteNotAnchored(_)));

    let stranger = Note::generate(20).unwrap();
    let err = h.withdrawals().withdraw(&stranger, recipient(), 0).await.unwrap_err();
    assert!(matches!(err, PoolError::NoteNotFound(_)));
    assert_eq!(h.prover.calls(), 0);
}

#[tokio::test]
async fn spend_observed_on_chain_updates_local_state() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;

    let root = h.ledger.current_root().await.unwrap();
    h.ledger.spend_nullifier(note.nullifier_hash(&root));

    let err = h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap_err();
    assert!(matches!(err, PoolError::AlreadySpentOnChain(_)));
    assert_eq!(err.class(), ErrorClass::Rejected);
    assert_eq!(h.prover.calls(), 0);
    assert!(h.store.get(&note.commitment()).await.unwrap().is_spent());
}

#[tokio::test]
async fn prover_failure_leaves_note_spendable() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;

    h.prover.set_failing(true);
    let err = h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap_err();
    assert!(matches!(err, PoolError::ProofGenerationFailed(_)));
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(50));

    // Reservation was released; the retry goes through
    h.prover.set_failing(false);
    h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap();
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(0));
}

#[tokio::test]
async fn proof_timeout_is_transient() {
    let h = Harness::with_prover(
        InMemoryLedger::new().with_auto_mine(),
        MockProver::with_prove_time(500),
    );
    let note = h.anchored_note(50).await;

    let config = WithdrawConfig {
        proof_timeout: Duration::from_millis(20),
        ..WithdrawConfig::default()
    };
    let err = h
        .withdrawals_with(config)
        .withdraw(&note, recipient(), 0)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PoolError::Timeout {
            operation: "proof generation"
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(
        h.store.get(&note.commitment()).await.unwrap().status,
        NoteStatus::Anchored
    );
}

#[tokio::test]
async fn rejected_withdrawal_does_not_spend() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;

    h.ledger.reject_next_submission("invalid withdraw proof");
    let err = h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap_err();

    assert!(matches!(err, PoolError::LedgerRejected(_)));
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(50));
}

#[tokio::test]
async fn ledger_outage_is_retryable() {
    let h = auto_mined();
    let note = h.anchored_note(50).await;

    h.ledger.set_available(false);
    let err = h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.prover.calls(), 0);

    h.ledger.set_available(true);
    h.withdrawals().withdraw(&note, recipient(), 0).await.unwrap();
}

#[tokio::test]
async fn withdraw_value_picks_first_covering_note() {
    let h = auto_mined();
    h.anchored_note(10).await;
    let fifty = h.anchored_note(50).await;
    h.anchored_note(80).await;

    let receipt = h
        .withdrawals()
        .withdraw_value(40, recipient(), 0)
        .await
        .unwrap();
    assert_eq!(receipt.commitment, fifty.commitment());

    let err = h
        .withdrawals()
        .withdraw_value(100, recipient(), 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PoolError::NoSuitableNote {
            requested: NoteValue(100)
        }
    ));
}
