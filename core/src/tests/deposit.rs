use shroud_privacy::NoteValue;

use super::{Harness, short_confirmation};
use crate::error::{ErrorClass, PoolError};
use crate::ledger::InMemoryLedger;
use crate::pool::Confirmation;
use crate::storage::NoteStatus;

#[tokio::test]
async fn deposit_persists_pending_before_confirmation() {
    let h = Harness::new(InMemoryLedger::new());
    let receipt = h.deposits().deposit(100).await.unwrap();
    let c = receipt.note.commitment();

    let stored = h.store.get(&c).await.unwrap();
    assert_eq!(stored.status, NoteStatus::Pending);
    assert_eq!(stored.deposit_tx_hash.as_deref(), Some(receipt.tx_hash.as_str()));
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(0));
    assert_eq!(h.store.pending_balance().await.unwrap(), NoteValue(100));

    h.ledger.mine();
    let confirmation = receipt.confirmation.await.unwrap().unwrap();
    let Confirmation::Anchored(event) = confirmation else {
        panic!("expected anchored, got {:?}", confirmation);
    };
    assert_eq!(event.merkle_index, 0);

    let stored = h.store.get(&c).await.unwrap();
    assert_eq!(stored.status, NoteStatus::Anchored);
    assert_eq!(stored.merkle_index(), Some(0));
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(100));
}

#[tokio::test]
async fn zero_amount_rejected_before_persisting() {
    let h = Harness::new(InMemoryLedger::new());
    let err = h.deposits().deposit(0).await.unwrap_err();

    assert!(matches!(err, PoolError::InvalidAmount));
    assert_eq!(err.class(), ErrorClass::Validation);
    assert!(h.store.notes().await.is_empty());
}

#[tokio::test]
async fn submission_failure_keeps_note_pending() {
    let h = Harness::new(InMemoryLedger::new());
    h.ledger.fail_next_submission("connection reset");

    let err = h.deposits().deposit(30).await.unwrap_err();
    assert!(matches!(err, PoolError::SubmissionFailed(_)));
    assert!(err.is_retryable());

    let notes = h.store.notes().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].status, NoteStatus::Pending);
    assert!(notes[0].deposit_tx_hash.is_none());
}

#[tokio::test]
async fn rejected_deposit_orphans_note() {
    let h = Harness::new(InMemoryLedger::new());
    h.ledger.reject_next_submission("execution reverted");

    let err = h.deposits().deposit(30).await.unwrap_err();
    assert!(matches!(err, PoolError::LedgerRejected(ref m) if m == "execution reverted"));
    assert!(!err.is_retryable());

    let notes = h.store.notes().await;
    assert_eq!(notes[0].status, NoteStatus::Orphaned);
    assert_eq!(h.store.pending_balance().await.unwrap(), NoteValue(0));
}

#[tokio::test]
async fn insufficient_funds_surfaced_verbatim() {
    let h = Harness::new(InMemoryLedger::new().with_funds(10));

    let err = h.deposits().deposit(100).await.unwrap_err();
    match err {
        PoolError::InsufficientFunds(msg) => {
            assert_eq!(msg, "insufficient funds: balance 10, required 100")
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(h.store.notes().await[0].status, NoteStatus::Orphaned);
}

#[tokio::test]
async fn confirmation_timeout_leaves_note_pending() {
    let h = Harness::new(InMemoryLedger::new());
    let receipt = h.deposits_with(short_confirmation()).deposit(40).await.unwrap();

    let confirmation = receipt.confirmation.await.unwrap().unwrap();
    assert_eq!(confirmation, Confirmation::Pending);

    let c = receipt.note.commitment();
    assert_eq!(h.store.get(&c).await.unwrap().status, NoteStatus::Pending);

    // A later sync pass anchors it once the block lands
    h.ledger.mine();
    let report = h.sync().reconcile().await;
    assert_eq!(report.anchored, 1);
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(40));
}

#[tokio::test]
async fn outage_during_confirmation_leaves_note_pending() {
    let h = Harness::new(InMemoryLedger::new());
    let receipt = h.deposits().deposit(40).await.unwrap();

    h.ledger.set_available(false);
    let confirmation = receipt.confirmation.await.unwrap().unwrap();
    assert_eq!(confirmation, Confirmation::Pending);
    assert_eq!(
        h.store.get(&receipt.note.commitment()).await.unwrap().status,
        NoteStatus::Pending
    );
}

#[tokio::test]
async fn every_deposit_gets_a_fresh_note() {
    let h = Harness::new(InMemoryLedger::new().with_auto_mine());
    let a = h.deposits().deposit(5).await.unwrap();
    let b = h.deposits().deposit(5).await.unwrap();

    assert_ne!(a.note.commitment(), b.note.commitment());
    a.confirmation.await.unwrap().unwrap();
    b.confirmation.await.unwrap().unwrap();
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(10));
}

#[tokio::test]
async fn deposit_larger_than_u64_anchors() {
    let h = Harness::new(InMemoryLedger::new().with_auto_mine());
    let amount = u64::MAX as u128 + 1_000;

    let note = h.anchored_note(amount).await;
    assert_eq!(note.amount(), NoteValue(amount));
    assert_eq!(h.store.balance().await.unwrap(), NoteValue(amount));
}
