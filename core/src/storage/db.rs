use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use shroud_privacy::Commitment;

use super::record::NoteRecord;

const CF_NOTES: &str = "notes";
const CF_NOTE_ORDER: &str = "note_order";
const CF_META: &str = "store_meta";

const KEY_NEXT_SEQ: &[u8] = b"next_seq";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rocksdb: {0}")]
    Rocks(#[from] rocksdb::Error),

    #[error("record serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("column family '{0}' missing")]
    MissingColumnFamily(&'static str),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

/// A thread-safe wrapper around RocksDB holding the note records.
///
/// `note_order` maps a big-endian insertion sequence to a commitment so a
/// plain forward iteration yields notes in insertion order.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![
            ColumnFamilyDescriptor::new(CF_NOTES, Options::default()),
            ColumnFamilyDescriptor::new(CF_NOTE_ORDER, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    /// Every record in insertion order
    pub fn load_notes(&self) -> Result<Vec<NoteRecord>, StorageError> {
        let notes_cf = self.cf(CF_NOTES)?;
        let order_cf = self.cf(CF_NOTE_ORDER)?;

        let mut records = Vec::new();
        for entry in self.db.iterator_cf(order_cf, IteratorMode::Start) {
            let (seq, commitment) = entry?;
            let bytes = self.db.get_cf(notes_cf, &commitment)?.ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "order entry {} points at missing note {}",
                    hex::encode(&seq),
                    hex::encode(&commitment)
                ))
            })?;
            records.push(serde_json::from_slice(&bytes)?);
        }

        Ok(records)
    }

    /// Sequence number the next inserted note receives
    pub fn next_sequence(&self) -> Result<u64, StorageError> {
        let meta_cf = self.cf(CF_META)?;
        match self.db.get_cf(meta_cf, KEY_NEXT_SEQ)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corrupt(format!("next_seq has {} bytes", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    /// Append notes starting at sequence `first_seq` in one atomic batch
    pub fn insert_notes(
        &self,
        first_seq: u64,
        records: &[(Commitment, NoteRecord)],
    ) -> Result<(), StorageError> {
        let notes_cf = self.cf(CF_NOTES)?;
        let order_cf = self.cf(CF_NOTE_ORDER)?;
        let meta_cf = self.cf(CF_META)?;

        let mut batch = WriteBatch::default();
        let mut seq = first_seq;
        for (commitment, record) in records {
            batch.put_cf(notes_cf, commitment.as_bytes(), serde_json::to_vec(record)?);
            batch.put_cf(order_cf, seq.to_be_bytes(), commitment.as_bytes());
            seq += 1;
        }
        batch.put_cf(meta_cf, KEY_NEXT_SEQ, seq.to_be_bytes());

        self.db.write(batch)?;
        Ok(())
    }

    /// Overwrite an existing note record
    pub fn put_note(&self, commitment: &Commitment, record: &NoteRecord) -> Result<(), StorageError> {
        let notes_cf = self.cf(CF_NOTES)?;
        self.db
            .put_cf(notes_cf, commitment.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }
}
