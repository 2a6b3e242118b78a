//! Stored note model and its JSON record form
//!
//! The record form is shared by the RocksDB column family and the backup
//! export, so a file written by `export` can be fed straight to `import`.
//!
//! ```json
//! {
//!   "secret": "0a1b…", "nullifier": "2c3d…", "commitment": "4e5f…",
//!   "amount": "100", "spent": false, "merkleIndex": 5,
//!   "anchorBlock": 1000, "anchorTxHash": "…", "status": "anchored",
//!   "createdAt": 1767225600, "depositTxHash": "…", "spend": null
//! }
//! ```

use serde::{Deserialize, Serialize};

use shroud_privacy::{Commitment, Note, NoteValue, NullifierHash, bytes32_from_hex};

use crate::error::PoolError;

/// Lifecycle position of a stored note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    /// Persisted, deposit not yet observed on the ledger
    Pending,
    /// Deposit confirmed; merkle index known; spendable
    Anchored,
    /// Withdrawal submitted (or observed on chain)
    Spent,
    /// Deposit rejected or never observed
    Orphaned,
}

impl NoteStatus {
    /// Allowed edges of the note state machine
    pub fn can_transition_to(self, next: NoteStatus) -> bool {
        use NoteStatus::*;
        matches!(
            (self, next),
            (Pending, Anchored)
                | (Pending, Orphaned)
                | (Orphaned, Anchored)
                | (Anchored, Spent)
                | (Spent, Anchored)
        )
    }
}

/// Confirmed position of a deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub merkle_index: u64,
    pub block: u64,
    pub tx_hash: String,
}

/// Withdrawal that spent a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRecord {
    pub tx_hash: String,
    /// Nullifier hash published by the withdrawal (bound to `root`)
    pub nullifier_hash: NullifierHash,
    pub root: [u8; 32],
    /// Set once the ledger reports the transaction confirmed
    pub confirmed: bool,
}

/// A note plus the wallet's bookkeeping about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    pub note: Note,
    pub status: NoteStatus,
    pub anchor: Option<Anchor>,
    /// Unix seconds
    pub created_at: u64,
    pub deposit_tx_hash: Option<String>,
    pub spend: Option<SpendRecord>,
}

impl StoredNote {
    pub fn pending(note: Note, created_at: u64) -> Self {
        Self {
            note,
            status: NoteStatus::Pending,
            anchor: None,
            created_at,
            deposit_tx_hash: None,
            spend: None,
        }
    }

    pub fn commitment(&self) -> Commitment {
        self.note.commitment()
    }

    pub fn amount(&self) -> NoteValue {
        self.note.amount()
    }

    pub fn is_spent(&self) -> bool {
        self.status == NoteStatus::Spent
    }

    pub fn merkle_index(&self) -> Option<u64> {
        self.anchor.as_ref().map(|a| a.merkle_index)
    }

    /// Counts towards the spendable balance
    pub fn is_spendable(&self) -> bool {
        self.status == NoteStatus::Anchored && self.anchor.is_some()
    }
}

/// Serialized note (backup and on-disk format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub secret: String,
    pub nullifier: String,
    pub commitment: String,
    /// Decimal string
    pub amount: String,
    pub spent: bool,
    /// -1 while unanchored
    pub merkle_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_tx_hash: Option<String>,
    /// Absent in backups that only carry the `spent` flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spend: Option<SpendEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendEntry {
    pub tx_hash: String,
    pub nullifier_hash: String,
    pub root: String,
    #[serde(default)]
    pub confirmed: bool,
}

impl From<&StoredNote> for NoteRecord {
    fn from(stored: &StoredNote) -> Self {
        let note = &stored.note;
        Self {
            secret: hex::encode(note.secret()),
            nullifier: hex::encode(note.nullifier()),
            commitment: note.commitment().to_hex(),
            amount: note.amount().to_string(),
            spent: stored.is_spent(),
            merkle_index: stored
                .anchor
                .as_ref()
                .map_or(-1, |a| a.merkle_index as i64),
            anchor_block: stored.anchor.as_ref().map(|a| a.block),
            anchor_tx_hash: stored.anchor.as_ref().map(|a| a.tx_hash.clone()),
            status: Some(stored.status),
            created_at: stored.created_at,
            deposit_tx_hash: stored.deposit_tx_hash.clone(),
            spend: stored.spend.as_ref().map(|s| SpendEntry {
                tx_hash: s.tx_hash.clone(),
                nullifier_hash: s.nullifier_hash.to_hex(),
                root: hex::encode(s.root),
                confirmed: s.confirmed,
            }),
        }
    }
}

impl TryFrom<NoteRecord> for StoredNote {
    type Error = PoolError;

    /// Validates the record and recomputes its commitment
    fn try_from(record: NoteRecord) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| PoolError::CorruptRecord(format!("{} ({})", what, record.commitment));

        let secret = bytes32_from_hex(&record.secret).map_err(|_| corrupt("bad secret"))?;
        let nullifier = bytes32_from_hex(&record.nullifier).map_err(|_| corrupt("bad nullifier"))?;
        let claimed = Commitment::from_hex(&record.commitment).map_err(|_| corrupt("bad commitment"))?;
        let amount: u128 = record.amount.parse().map_err(|_| corrupt("bad amount"))?;

        let note = Note::from_parts(secret, nullifier, amount)
            .map_err(|e| corrupt(&e.to_string()))?;
        if note.commitment() != claimed {
            return Err(corrupt("commitment does not match secret/nullifier/amount"));
        }

        let anchor = match record.merkle_index {
            -1 => None,
            i if i >= 0 => Some(Anchor {
                merkle_index: i as u64,
                block: record.anchor_block.unwrap_or_default(),
                tx_hash: record.anchor_tx_hash.clone().unwrap_or_default(),
            }),
            _ => return Err(corrupt("negative merkle index")),
        };

        let status = match record.status {
            Some(status) => status,
            None if record.spent => NoteStatus::Spent,
            None if anchor.is_some() => NoteStatus::Anchored,
            None => NoteStatus::Pending,
        };

        if record.spent != (status == NoteStatus::Spent) {
            return Err(corrupt("spent flag disagrees with status"));
        }
        let needs_anchor = matches!(status, NoteStatus::Anchored | NoteStatus::Spent);
        if needs_anchor != anchor.is_some() {
            return Err(corrupt("merkle index disagrees with status"));
        }

        let spend = match record.spend {
            Some(entry) => Some(SpendRecord {
                tx_hash: entry.tx_hash,
                nullifier_hash: NullifierHash::from_hex(&entry.nullifier_hash)
                    .map_err(|_| corrupt("bad spend nullifier hash"))?,
                root: bytes32_from_hex(&entry.root).map_err(|_| corrupt("bad spend root"))?,
                confirmed: entry.confirmed,
            }),
            None => None,
        };

        Ok(StoredNote {
            note,
            status,
            anchor,
            created_at: record.created_at,
            deposit_tx_hash: record.deposit_tx_hash,
            spend,
        })
    }
}
