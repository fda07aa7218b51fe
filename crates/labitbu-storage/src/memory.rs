//! In-memory record store for tests and ephemeral runs.
//!
//! Same semantics as the SQLite backend, including `(txid, vin)` dedup, with
//! everything behind one `Mutex`.

use std::sync::Mutex;

use async_trait::async_trait;

use labitbu_core::error::IndexerError;
use labitbu_core::store::RecordStore;
use labitbu_core::types::{NewRecord, Record};

#[derive(Default)]
struct Inner {
    records: Vec<Record>,
    next_id: i64,
    cursor: u64,
}

/// Record store backed by a `Vec` behind a mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_if_absent(&self, record: &NewRecord) -> Result<bool, IndexerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .records
            .iter()
            .any(|r| r.txid == record.txid && r.vin == record.vin)
        {
            return Ok(false);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(Record {
            id,
            txid: record.txid.clone(),
            vin: record.vin,
            sat: None,
            checksum: record.checksum.clone(),
            inscription_id: None,
        });
        Ok(true)
    }

    async fn find_by_txid(&self, txid: &str) -> Result<Vec<Record>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.txid == txid)
            .cloned()
            .collect())
    }

    async fn find_unresolved_sat(&self) -> Result<Vec<Record>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.sat.is_none())
            .cloned()
            .collect())
    }

    async fn find_resolved_sat_no_inscription(&self) -> Result<Vec<Record>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.sat.is_some() && r.inscription_id.is_none())
            .cloned()
            .collect())
    }

    async fn find_with_inscription(&self) -> Result<Vec<Record>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.inscription_id.is_some())
            .cloned()
            .collect())
    }

    async fn find_txids_for_sat(&self, sat: u64) -> Result<Vec<String>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        let mut txids: Vec<String> = inner
            .records
            .iter()
            .filter(|r| r.sat == Some(sat))
            .map(|r| r.txid.clone())
            .collect();
        txids.sort();
        txids.dedup();
        Ok(txids)
    }

    async fn find_all(&self) -> Result<Vec<Record>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        let mut records = inner.records.clone();
        records.reverse();
        Ok(records)
    }

    async fn update_sat(&self, id: i64, sat: u64) -> Result<(), IndexerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.records.iter_mut().find(|r| r.id == id) {
            r.sat = Some(sat);
        }
        Ok(())
    }

    async fn update_inscription(
        &self,
        id: i64,
        inscription_id: Option<&str>,
    ) -> Result<(), IndexerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.records.iter_mut().find(|r| r.id == id) {
            r.inscription_id = inscription_id.map(str::to_string);
        }
        Ok(())
    }

    async fn get_cursor(&self) -> Result<u64, IndexerError> {
        Ok(self.inner.lock().unwrap().cursor)
    }

    async fn set_cursor(&self, height: u64) -> Result<(), IndexerError> {
        self.inner.lock().unwrap().cursor = height;
        Ok(())
    }

    async fn checkpoint(&self) -> Result<(), IndexerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dedup_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let rec = NewRecord {
            txid: "tx-a".into(),
            vin: 0,
            checksum: "c1".into(),
        };
        assert!(store.insert_if_absent(&rec).await.unwrap());
        assert!(!store.insert_if_absent(&rec).await.unwrap());
        assert_eq!(store.find_by_txid("tx-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_cursor().await.unwrap(), 0);
        store.set_cursor(42).await.unwrap();
        assert_eq!(store.get_cursor().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn update_and_query_lifecycle() {
        let store = MemoryStore::new();
        store
            .insert_if_absent(&NewRecord {
                txid: "tx-a".into(),
                vin: 0,
                checksum: "c1".into(),
            })
            .await
            .unwrap();
        let id = store.find_by_txid("tx-a").await.unwrap()[0].id;

        store.update_sat(id, 5000).await.unwrap();
        assert!(store.find_unresolved_sat().await.unwrap().is_empty());
        assert_eq!(
            store.find_resolved_sat_no_inscription().await.unwrap().len(),
            1
        );

        store.update_inscription(id, Some("i0")).await.unwrap();
        assert_eq!(store.find_with_inscription().await.unwrap().len(), 1);

        store.update_inscription(id, None).await.unwrap();
        assert!(store.find_with_inscription().await.unwrap().is_empty());
        assert_eq!(store.find_txids_for_sat(5000).await.unwrap(), vec!["tx-a"]);
    }
}
