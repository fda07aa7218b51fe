//! Record store trait — the persistence surface the engines run against.
//!
//! Implementations live in `labitbu-storage` (SQLite for production, memory
//! for tests). Uniqueness on `(txid, vin)` is the store's responsibility:
//! re-inserting an already seen input must be a silent no-op so block replay
//! stays idempotent.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{NewRecord, Record};

/// CRUD surface over persisted labitbu records plus the singleton cursor.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record unless `(txid, vin)` already exists. Returns `true`
    /// when a row was actually inserted.
    async fn insert_if_absent(&self, record: &NewRecord) -> Result<bool, IndexerError>;

    /// All records for a transaction id.
    async fn find_by_txid(&self, txid: &str) -> Result<Vec<Record>, IndexerError>;

    /// Records whose sat has not been resolved yet.
    async fn find_unresolved_sat(&self) -> Result<Vec<Record>, IndexerError>;

    /// Records with a sat but no inscription assigned.
    async fn find_resolved_sat_no_inscription(&self) -> Result<Vec<Record>, IndexerError>;

    /// Records carrying an inscription id (validation sweep input).
    async fn find_with_inscription(&self) -> Result<Vec<Record>, IndexerError>;

    /// Distinct txids of records bound to `sat`.
    async fn find_txids_for_sat(&self, sat: u64) -> Result<Vec<String>, IndexerError>;

    /// Every record, newest first.
    async fn find_all(&self) -> Result<Vec<Record>, IndexerError>;

    /// Set a record's resolved sat.
    async fn update_sat(&self, id: i64, sat: u64) -> Result<(), IndexerError>;

    /// Set or clear a record's inscription id.
    async fn update_inscription(
        &self,
        id: i64,
        inscription_id: Option<&str>,
    ) -> Result<(), IndexerError>;

    /// Watermark below which all blocks are fully scanned. 0 when never set.
    async fn get_cursor(&self) -> Result<u64, IndexerError>;

    /// Advance the watermark. Only the poller calls this, only after a
    /// block's records are durably written.
    async fn set_cursor(&self, height: u64) -> Result<(), IndexerError>;

    /// Force buffered writes to stable storage.
    async fn checkpoint(&self) -> Result<(), IndexerError>;
}
