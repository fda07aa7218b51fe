//! SQLite record store.
//!
//! Persists labitbu records and the indexer cursor to a single SQLite file.
//! Uses `sqlx` with WAL mode; the `(txid, vin)` unique index makes record
//! insertion idempotent, which is what lets the poller replay a block after a
//! crash without creating duplicates.
//!
//! # Usage
//! ```rust,no_run
//! use labitbu_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./data/labitbu.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use labitbu_core::error::IndexerError;
use labitbu_core::store::RecordStore;
use labitbu_core::types::{NewRecord, Record};

/// Aggregate counts over the record table, for the export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub with_sat: u64,
    pub with_inscription: u64,
    pub unique_checksums: u64,
}

/// SQLite-backed record store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./labitbu.db"`) or a full SQLite
    /// URL (`"sqlite:./labitbu.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to one connection so every query sees the same database. All
    /// data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables, indexes, and the singleton cursor row.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        // WAL mode; the poller checkpoints it explicitly after each block.
        self.exec("PRAGMA journal_mode=WAL;").await?;
        self.exec("PRAGMA synchronous=NORMAL;").await?;

        self.exec(
            "CREATE TABLE IF NOT EXISTS labitbus (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                txid           TEXT    NOT NULL,
                vin            INTEGER NOT NULL,
                sat            INTEGER,
                checksum       TEXT    NOT NULL,
                inscription_id TEXT
            );",
        )
        .await?;

        self.exec(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_labitbus_unique
             ON labitbus (txid, vin);",
        )
        .await?;

        // Indexes for the enrichment query patterns
        self.exec("CREATE INDEX IF NOT EXISTS idx_labitbus_txid ON labitbus (txid);")
            .await?;
        self.exec("CREATE INDEX IF NOT EXISTS idx_labitbus_sat ON labitbus (sat);")
            .await?;
        self.exec("CREATE INDEX IF NOT EXISTS idx_labitbus_checksum ON labitbus (checksum);")
            .await?;
        self.exec(
            "CREATE INDEX IF NOT EXISTS idx_labitbus_inscription_id
             ON labitbus (inscription_id);",
        )
        .await?;

        self.exec(
            "CREATE TABLE IF NOT EXISTS indexer_state (
                last_block_height INTEGER NOT NULL
            );",
        )
        .await?;

        // Seed the singleton cursor row exactly once.
        self.exec(
            "INSERT INTO indexer_state (last_block_height)
             SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM indexer_state);",
        )
        .await?;

        Ok(())
    }

    async fn exec(&self, sql: &str) -> Result<(), IndexerError> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Record {
        Record {
            id: row.get("id"),
            txid: row.get("txid"),
            vin: row.get::<i64, _>("vin") as u32,
            sat: row.get::<Option<i64>, _>("sat").map(|s| s as u64),
            checksum: row.get("checksum"),
            inscription_id: row.get("inscription_id"),
        }
    }

    async fn select_records(&self, sql: &str) -> Result<Vec<Record>, IndexerError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    /// Wipe all records and reset the cursor to 0.
    ///
    /// Operational escape hatch; nothing in the engines calls this.
    pub async fn reset(&self) -> Result<(), IndexerError> {
        self.exec("DELETE FROM labitbus;").await?;
        self.exec("UPDATE indexer_state SET last_block_height = 0;")
            .await?;
        Ok(())
    }

    /// Aggregate counts for the export file.
    pub async fn stats(&self) -> Result<StoreStats, IndexerError> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COUNT(sat) AS with_sat,
                COUNT(inscription_id) AS with_inscription,
                COUNT(DISTINCT checksum) AS unique_checksums
             FROM labitbus",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(StoreStats {
            total: row.get::<i64, _>("total") as u64,
            with_sat: row.get::<i64, _>("with_sat") as u64,
            with_inscription: row.get::<i64, _>("with_inscription") as u64,
            unique_checksums: row.get::<i64, _>("unique_checksums") as u64,
        })
    }

    /// Close the underlying pool. Called on graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_if_absent(&self, record: &NewRecord) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO labitbus (txid, vin, checksum) VALUES (?, ?, ?)",
        )
        .bind(&record.txid)
        .bind(record.vin as i64)
        .bind(&record.checksum)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!(txid = %record.txid, vin = record.vin, "record stored");
        }
        Ok(inserted)
    }

    async fn find_by_txid(&self, txid: &str) -> Result<Vec<Record>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM labitbus WHERE txid = ? ORDER BY vin")
            .bind(txid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn find_unresolved_sat(&self) -> Result<Vec<Record>, IndexerError> {
        self.select_records("SELECT * FROM labitbus WHERE sat IS NULL ORDER BY id")
            .await
    }

    async fn find_resolved_sat_no_inscription(&self) -> Result<Vec<Record>, IndexerError> {
        self.select_records(
            "SELECT * FROM labitbus
             WHERE sat IS NOT NULL AND inscription_id IS NULL ORDER BY id",
        )
        .await
    }

    async fn find_with_inscription(&self) -> Result<Vec<Record>, IndexerError> {
        self.select_records(
            "SELECT * FROM labitbus WHERE inscription_id IS NOT NULL ORDER BY id",
        )
        .await
    }

    async fn find_txids_for_sat(&self, sat: u64) -> Result<Vec<String>, IndexerError> {
        let rows = sqlx::query("SELECT DISTINCT txid FROM labitbus WHERE sat = ?")
            .bind(sat as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get("txid")).collect())
    }

    async fn find_all(&self) -> Result<Vec<Record>, IndexerError> {
        self.select_records("SELECT * FROM labitbus ORDER BY id DESC")
            .await
    }

    async fn update_sat(&self, id: i64, sat: u64) -> Result<(), IndexerError> {
        sqlx::query("UPDATE labitbus SET sat = ? WHERE id = ?")
            .bind(sat as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn update_inscription(
        &self,
        id: i64,
        inscription_id: Option<&str>,
    ) -> Result<(), IndexerError> {
        sqlx::query("UPDATE labitbus SET inscription_id = ? WHERE id = ?")
            .bind(inscription_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_cursor(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT last_block_height FROM indexer_state LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(row
            .map(|r| r.get::<i64, _>("last_block_height") as u64)
            .unwrap_or(0))
    }

    async fn set_cursor(&self, height: u64) -> Result<(), IndexerError> {
        sqlx::query("UPDATE indexer_state SET last_block_height = ?")
            .bind(height as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        debug!(height, "cursor advanced");
        Ok(())
    }

    async fn checkpoint(&self) -> Result<(), IndexerError> {
        self.exec("PRAGMA wal_checkpoint(FULL);").await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
