pub mod db;
pub mod note_store;
pub mod record;

pub use db::{RocksDbStore, StorageError};
pub use note_store::{ImportSummary, NoteStore, SpendOutcome, SpendReservation};
pub use record::{Anchor, NoteRecord, NoteStatus, SpendEntry, SpendRecord, StoredNote};
