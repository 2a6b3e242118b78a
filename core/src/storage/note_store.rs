//! Note Store
//!
//! The only owner of persisted note state. Every mutation takes the single
//! writer lock, writes RocksDB first and only then updates the in-memory
//! index, so a failed write leaves both views unchanged.
//!
//! In-flight withdrawals hold a [`SpendReservation`] on their note. A second
//! withdrawal of the same note fails at reservation time, before any proof
//! is generated.

use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashSet;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use shroud_privacy::{Commitment, Note, NoteValue};

use super::db::RocksDbStore;
use super::record::{Anchor, NoteRecord, NoteStatus, SpendRecord, StoredNote};
use crate::error::PoolError;

/// Result of a spend-marking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendOutcome {
    /// The note moved to `Spent`
    Marked,
    /// The note was already spent; nothing changed
    AlreadySpent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    /// Records whose commitment was already in the store
    pub skipped: usize,
}

struct NoteIndex {
    order: Vec<Commitment>,
    notes: HashMap<Commitment, StoredNote>,
    next_seq: u64,
}

impl NoteIndex {
    fn get(&self, commitment: &Commitment) -> Result<&StoredNote, PoolError> {
        self.notes
            .get(commitment)
            .ok_or(PoolError::NoteNotFound(*commitment))
    }

    fn ordered(&self) -> impl Iterator<Item = &StoredNote> {
        self.order.iter().filter_map(|c| self.notes.get(c))
    }
}

pub struct NoteStore {
    db: RocksDbStore,
    state: Mutex<NoteIndex>,
    reserved: DashSet<Commitment>,
}

/// Exclusive claim on a note for the duration of one withdrawal.
/// Released on drop, including when the withdrawal future is cancelled.
pub struct SpendReservation<'a> {
    store: &'a NoteStore,
    stored: StoredNote,
}

impl SpendReservation<'_> {
    pub fn commitment(&self) -> Commitment {
        self.stored.commitment()
    }

    /// The note as it was when the reservation was granted
    pub fn note(&self) -> &StoredNote {
        &self.stored
    }
}

impl Drop for SpendReservation<'_> {
    fn drop(&mut self) {
        let commitment = self.stored.commitment();
        self.store.reserved.remove(&commitment);
        debug!("released spend reservation on {}", commitment);
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl NoteStore {
    /// Open (or create) the store and load every note into memory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PoolError> {
        let db = RocksDbStore::open(path)?;

        let mut order = Vec::new();
        let mut notes = HashMap::new();
        for record in db.load_notes()? {
            let stored = StoredNote::try_from(record)?;
            let commitment = stored.commitment();
            if notes.insert(commitment, stored).is_some() {
                return Err(PoolError::CorruptRecord(format!(
                    "commitment {} stored twice",
                    commitment
                )));
            }
            order.push(commitment);
        }
        let next_seq = db.next_sequence()?.max(order.len() as u64);

        info!("note store opened with {} notes", order.len());

        Ok(Self {
            db,
            state: Mutex::new(NoteIndex {
                order,
                notes,
                next_seq,
            }),
            reserved: DashSet::new(),
        })
    }

    /// Append a note in the `Pending` state
    pub async fn add(&self, note: Note) -> Result<StoredNote, PoolError> {
        let mut state = self.state.lock().await;
        let commitment = note.commitment();
        if state.notes.contains_key(&commitment) {
            return Err(PoolError::DuplicateCommitment(commitment));
        }

        let stored = StoredNote::pending(note, unix_now());
        self.db
            .insert_notes(state.next_seq, &[(commitment, NoteRecord::from(&stored))])?;

        state.next_seq += 1;
        state.order.push(commitment);
        state.notes.insert(commitment, stored.clone());
        debug!("note {} persisted as pending", commitment);

        Ok(stored)
    }

    /// Load, mutate, persist and publish one note under the writer lock.
    /// `f` returns whether it changed anything; unchanged notes are not rewritten.
    async fn update<T, F>(&self, commitment: &Commitment, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(&mut StoredNote) -> Result<(T, bool), PoolError>,
    {
        let mut state = self.state.lock().await;
        let mut stored = state.get(commitment)?.clone();

        let (out, changed) = f(&mut stored)?;
        if changed {
            self.db.put_note(commitment, &NoteRecord::from(&stored))?;
            state.notes.insert(*commitment, stored);
        }
        Ok(out)
    }

    pub async fn record_deposit_tx(
        &self,
        commitment: &Commitment,
        tx_hash: &str,
    ) -> Result<(), PoolError> {
        self.update(commitment, |stored| {
            if stored.deposit_tx_hash.as_deref() == Some(tx_hash) {
                return Ok(((), false));
            }
            stored.deposit_tx_hash = Some(tx_hash.to_string());
            Ok(((), true))
        })
        .await
    }

    /// Record the confirmed deposit position. Returns `false` when the note
    /// already carries the same anchor.
    pub async fn set_anchored(
        &self,
        commitment: &Commitment,
        merkle_index: u64,
        block: u64,
        tx_hash: &str,
    ) -> Result<bool, PoolError> {
        self.update(commitment, |stored| {
            if stored.merkle_index() == Some(merkle_index) {
                return Ok((false, false));
            }
            let from = stored.status;
            if !matches!(from, NoteStatus::Pending | NoteStatus::Orphaned) {
                return Err(PoolError::InvalidTransition {
                    commitment: *commitment,
                    from,
                    to: NoteStatus::Anchored,
                });
            }

            stored.status = NoteStatus::Anchored;
            stored.anchor = Some(Anchor {
                merkle_index,
                block,
                tx_hash: tx_hash.to_string(),
            });
            info!(
                "note {} anchored at index {} (block {})",
                commitment, merkle_index, block
            );
            Ok((true, true))
        })
        .await
    }

    /// Move a pending note to `Orphaned`. Returns `false` if it already was.
    pub async fn mark_orphaned(
        &self,
        commitment: &Commitment,
        reason: &str,
    ) -> Result<bool, PoolError> {
        self.update(commitment, |stored| match stored.status {
            NoteStatus::Orphaned => Ok((false, false)),
            NoteStatus::Pending => {
                stored.status = NoteStatus::Orphaned;
                warn!("note {} orphaned: {}", commitment, reason);
                Ok((true, true))
            }
            from => Err(PoolError::InvalidTransition {
                commitment: *commitment,
                from,
                to: NoteStatus::Orphaned,
            }),
        })
        .await
    }

    /// Mark an anchored note spent. Idempotent: a spent note reports
    /// [`SpendOutcome::AlreadySpent`] instead of failing.
    pub async fn mark_spent(&self, commitment: &Commitment) -> Result<SpendOutcome, PoolError> {
        self.spend(commitment, None).await
    }

    /// Mark spent and keep the withdrawal that spent it
    pub async fn mark_spent_with(
        &self,
        commitment: &Commitment,
        record: SpendRecord,
    ) -> Result<SpendOutcome, PoolError> {
        self.spend(commitment, Some(record)).await
    }

    async fn spend(
        &self,
        commitment: &Commitment,
        record: Option<SpendRecord>,
    ) -> Result<SpendOutcome, PoolError> {
        self.update(commitment, |stored| match stored.status {
            NoteStatus::Spent => Ok((SpendOutcome::AlreadySpent, false)),
            NoteStatus::Anchored => {
                stored.status = NoteStatus::Spent;
                stored.spend = record;
                info!("note {} marked spent", commitment);
                Ok((SpendOutcome::Marked, true))
            }
            from => Err(PoolError::InvalidTransition {
                commitment: *commitment,
                from,
                to: NoteStatus::Spent,
            }),
        })
        .await
    }

    /// Flag withdrawal `tx_hash` as confirmed on chain. Nothing changes
    /// unless it is still the note's recorded spend.
    pub async fn confirm_spend(
        &self,
        commitment: &Commitment,
        tx_hash: &str,
    ) -> Result<bool, PoolError> {
        self.update(commitment, |stored| match stored.spend.as_mut() {
            Some(spend) if spend.tx_hash == tx_hash && !spend.confirmed => {
                spend.confirmed = true;
                Ok((true, true))
            }
            _ => Ok((false, false)),
        })
        .await
    }

    /// Undo the optimistic spend made by withdrawal `tx_hash` after it failed
    /// on chain. A note spent again by a later withdrawal is left alone.
    pub async fn revert_spend(
        &self,
        commitment: &Commitment,
        tx_hash: &str,
    ) -> Result<bool, PoolError> {
        self.update(commitment, |stored| {
            if stored.status != NoteStatus::Spent {
                return Ok((false, false));
            }
            if stored.spend.as_ref().is_none_or(|s| s.tx_hash != tx_hash) {
                debug!(
                    "not reverting {}: its spend is no longer withdrawal {}",
                    commitment, tx_hash
                );
                return Ok((false, false));
            }
            stored.status = NoteStatus::Anchored;
            stored.spend = None;
            warn!("spend of note {} reverted, note is spendable again", commitment);
            Ok((true, true))
        })
        .await
    }

    /// Claim a note for a withdrawal
    pub async fn reserve(&self, commitment: &Commitment) -> Result<SpendReservation<'_>, PoolError> {
        let state = self.state.lock().await;
        let stored = state.get(commitment)?;
        match stored.status {
            NoteStatus::Spent => return Err(PoolError::NoteAlreadySpent(*commitment)),
            NoteStatus::Anchored if stored.anchor.is_some() => {}
            _ => return Err(PoolError::NoteNotAnchored(*commitment)),
        }

        if !self.reserved.insert(*commitment) {
            return Err(PoolError::AlreadySpent(*commitment));
        }
        debug!("reserved note {} for withdrawal", commitment);

        Ok(SpendReservation {
            store: self,
            stored: stored.clone(),
        })
    }

    pub async fn get(&self, commitment: &Commitment) -> Option<StoredNote> {
        self.state.lock().await.notes.get(commitment).cloned()
    }

    /// All notes in insertion order
    pub async fn notes(&self) -> Vec<StoredNote> {
        self.state.lock().await.ordered().cloned().collect()
    }

    /// Spendable notes (anchored, not spent) in insertion order
    pub async fn unspent_notes(&self) -> Vec<StoredNote> {
        let state = self.state.lock().await;
        state.ordered().filter(|n| n.is_spendable()).cloned().collect()
    }

    pub async fn pending_notes(&self) -> Vec<StoredNote> {
        let state = self.state.lock().await;
        state
            .ordered()
            .filter(|n| n.status == NoteStatus::Pending)
            .cloned()
            .collect()
    }

    /// Sum over [`Self::unspent_notes`]
    pub async fn balance(&self) -> Result<NoteValue, PoolError> {
        let state = self.state.lock().await;
        sum(state.ordered().filter(|n| n.is_spendable()))
    }

    /// Sum over notes still waiting for their deposit to confirm
    pub async fn pending_balance(&self) -> Result<NoteValue, PoolError> {
        let state = self.state.lock().await;
        sum(state.ordered().filter(|n| n.status == NoteStatus::Pending))
    }

    /// Reserve the first spendable, unreserved note (insertion order)
    /// covering `value`. Selection and reservation happen under the writer
    /// lock, so concurrent callers never pick the same note.
    pub async fn select_note(&self, value: NoteValue) -> Result<SpendReservation<'_>, PoolError> {
        let state = self.state.lock().await;
        for stored in state.ordered() {
            if !stored.is_spendable() || stored.amount() < value {
                continue;
            }
            if self.reserved.insert(stored.commitment()) {
                debug!("selected and reserved note {} for {}", stored.commitment(), value);
                return Ok(SpendReservation {
                    store: self,
                    stored: stored.clone(),
                });
            }
        }
        Err(PoolError::NoSuitableNote { requested: value })
    }

    /// Every note in backup form, insertion order
    pub async fn export(&self) -> Vec<NoteRecord> {
        let state = self.state.lock().await;
        state.ordered().map(NoteRecord::from).collect()
    }

    /// Merge backup records. The whole batch is validated before anything is
    /// written; notes already present are left untouched.
    pub async fn import(&self, records: Vec<NoteRecord>) -> Result<ImportSummary, PoolError> {
        let mut incoming = Vec::with_capacity(records.len());
        for record in records {
            incoming.push(StoredNote::try_from(record)?);
        }

        let mut state = self.state.lock().await;
        let mut summary = ImportSummary::default();
        let mut fresh: Vec<StoredNote> = Vec::new();

        for stored in incoming {
            let commitment = stored.commitment();
            if fresh.iter().any(|n| n.commitment() == commitment) {
                return Err(PoolError::DuplicateCommitment(commitment));
            }
            if state.notes.contains_key(&commitment) {
                summary.skipped += 1;
                continue;
            }
            fresh.push(stored);
        }

        if !fresh.is_empty() {
            let batch: Vec<_> = fresh
                .iter()
                .map(|n| (n.commitment(), NoteRecord::from(n)))
                .collect();
            self.db.insert_notes(state.next_seq, &batch)?;

            state.next_seq += fresh.len() as u64;
            for stored in fresh {
                let commitment = stored.commitment();
                state.order.push(commitment);
                state.notes.insert(commitment, stored);
                summary.added += 1;
            }
        }

        info!(
            "imported {} notes ({} already present)",
            summary.added, summary.skipped
        );
        Ok(summary)
    }
}

fn sum<'a>(notes: impl Iterator<Item = &'a StoredNote>) -> Result<NoteValue, PoolError> {
    notes.try_fold(NoteValue::ZERO, |acc, n| {
        acc.checked_add(n.amount()).ok_or(PoolError::AmountOverflow)
    })
}
