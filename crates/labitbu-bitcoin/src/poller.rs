//! Block polling engine.
//!
//! Advances the indexing cursor block by block, feeding every transaction
//! through the payload extractor and persisting matches. Blocks commit in
//! strictly increasing height order; the cursor only moves past a block once
//! its records are durably written, so an interrupted run replays work that
//! the `(txid, vin)` unique constraint then deduplicates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use labitbu_core::config::Config;
use labitbu_core::error::IndexerError;
use labitbu_core::extract::scan_transaction;
use labitbu_core::store::RecordStore;

use crate::client::ChainClient;

/// Engine state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Between cycles; nothing in flight.
    Idle,
    /// Querying cursor and chain tip.
    FetchingLatest,
    /// Processing a block range in order.
    CatchingUp,
    /// A cycle failed; waiting out the retry delay.
    ErrorBackoff,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingLatest => write!(f, "fetching-latest"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::ErrorBackoff => write!(f, "error-backoff"),
        }
    }
}

/// What a single polling cycle accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Tip did not exceed the cursor; nothing to do.
    CaughtUp,
    /// Processed the inclusive height range, inserting `records` new records.
    Processed { from: u64, to: u64, records: u64 },
    /// Shutdown was requested mid-range; completed work is committed.
    Interrupted,
}

/// The block polling engine.
pub struct Poller<C, S> {
    client: C,
    store: Arc<S>,
    config: Config,
    state: PollerState,
}

impl<C: ChainClient, S: RecordStore> Poller<C, S> {
    pub fn new(client: C, store: Arc<S>, config: Config) -> Self {
        Self {
            client,
            store,
            config,
            state: PollerState::Idle,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    fn set_state(&mut self, next: PollerState) {
        if next != self.state {
            debug!(from = %self.state, to = %next, "poller state");
            self.state = next;
        }
    }

    /// Run polling cycles until shutdown is signalled.
    ///
    /// Delays `poll_interval_ms` between cycles and `error_retry_delay_ms`
    /// after a failed one. Shutdown is honored between blocks, never
    /// mid-block.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        info!(start_height = self.config.start_height, "poller started");

        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, poller stopping");
                return Ok(());
            }

            let delay = match self.cycle(Some(&shutdown)).await {
                Ok(CycleOutcome::Interrupted) => continue,
                Ok(outcome) => {
                    if let CycleOutcome::Processed { from, to, records } = outcome {
                        info!(from, to, records, "catch-up range complete");
                    }
                    Duration::from_millis(self.config.poll_interval_ms)
                }
                Err(err) => {
                    warn!(%err, "polling cycle failed");
                    Duration::from_millis(self.config.error_retry_delay_ms)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Run exactly one polling cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, IndexerError> {
        self.cycle(None).await
    }

    async fn cycle(
        &mut self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleOutcome, IndexerError> {
        self.set_state(PollerState::FetchingLatest);

        let mut cursor = self.store.get_cursor().await?;
        if cursor == 0 {
            cursor = self.config.start_height;
        }

        let tip = match self.client.tip_height().await {
            Ok(tip) => tip,
            Err(err) => {
                self.set_state(PollerState::ErrorBackoff);
                return Err(err);
            }
        };

        if tip <= cursor {
            debug!(cursor, tip, "caught up, waiting for new blocks");
            self.set_state(PollerState::Idle);
            return Ok(CycleOutcome::CaughtUp);
        }

        self.set_state(PollerState::CatchingUp);
        info!(from = cursor, to = tip, "processing block range");

        let mut records = 0u64;
        let mut height = cursor;
        while height <= tip {
            if shutdown.map(|s| *s.borrow()).unwrap_or(false) {
                // Completed blocks stay committed; the next run resumes here.
                if height > cursor {
                    self.store.set_cursor(height).await?;
                }
                self.set_state(PollerState::Idle);
                return Ok(CycleOutcome::Interrupted);
            }

            match self.process_block(height).await {
                Ok(inserted) => {
                    records += inserted;
                    height += 1;
                }
                Err(err) => {
                    warn!(height, %err, "block processing failed, aborting range");
                    // Don't lose completed work: move the cursor to just past
                    // the last fully committed block before backing off.
                    if height > cursor {
                        self.store.set_cursor(height).await?;
                    }
                    self.set_state(PollerState::ErrorBackoff);
                    return Err(err);
                }
            }
        }

        self.store.set_cursor(tip + 1).await?;
        self.set_state(PollerState::Idle);
        Ok(CycleOutcome::Processed {
            from: cursor,
            to: tip,
            records,
        })
    }

    /// Scan one block and durably commit any matches.
    async fn process_block(&self, height: u64) -> Result<u64, IndexerError> {
        let transactions = self.client.block_transactions(height).await?;
        debug!(height, txs = transactions.len(), "scanning block");

        let mut inserted = 0u64;
        for tx in &transactions {
            for detection in scan_transaction(tx) {
                info!(txid = %tx.txid, vin = detection.vin, "found labitbu payload");
                if self
                    .store
                    .insert_if_absent(&detection.into_record(&tx.txid))
                    .await?
                {
                    inserted += 1;
                }
            }
        }

        // Block is only complete once its writes are on stable storage.
        self.store.checkpoint().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChainClient;
    use labitbu_core::types::{TxInput, WitnessTx};
    use labitbu_core::LABITBU_INTERNAL_KEY;
    use labitbu_storage::MemoryStore;

    fn config(start_height: u64) -> Config {
        Config {
            start_height,
            ..Config::default()
        }
    }

    fn qualifying_tx(txid: &str) -> WitnessTx {
        let mut cb = vec![0xc0];
        cb.extend_from_slice(&LABITBU_INTERNAL_KEY);
        cb.extend_from_slice(b"RIFF");
        cb.extend_from_slice(&[0x7a; 32]);
        cb.resize(8193, 0);
        WitnessTx {
            txid: txid.to_string(),
            vin: vec![TxInput {
                witness: vec![vec![0x01], vec![0x51], cb],
            }],
        }
    }

    fn plain_tx(txid: &str) -> WitnessTx {
        WitnessTx {
            txid: txid.to_string(),
            vin: vec![TxInput { witness: vec![] }],
        }
    }

    #[tokio::test]
    async fn one_cycle_indexes_range_and_advances_cursor() {
        let mut client = MockChainClient::new();
        client.tip = 101;
        client.blocks.insert(100, vec![plain_tx("boring")]);
        client.blocks.insert(101, vec![qualifying_tx("labitbu-tx")]);

        let store = Arc::new(MemoryStore::new());
        let mut poller = Poller::new(client, store.clone(), config(100));

        let outcome = poller.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Processed {
                from: 100,
                to: 101,
                records: 1
            }
        );

        let records = store.find_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].txid, "labitbu-tx");
        assert_eq!(records[0].vin, 0);
        assert!(records[0].sat.is_none());
        assert_eq!(store.get_cursor().await.unwrap(), 102);
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test]
    async fn caught_up_when_tip_equals_cursor() {
        let mut client = MockChainClient::new();
        client.tip = 500;

        let store = Arc::new(MemoryStore::new());
        store.set_cursor(500).await.unwrap();
        let mut poller = Poller::new(client, store.clone(), config(100));

        assert_eq!(poller.run_cycle().await.unwrap(), CycleOutcome::CaughtUp);
        assert_eq!(store.get_cursor().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let mut client = MockChainClient::new();
        client.tip = 101;
        client.blocks.insert(100, vec![qualifying_tx("dup-tx")]);
        client.blocks.insert(101, vec![]);

        let store = Arc::new(MemoryStore::new());
        let mut poller = Poller::new(client, store.clone(), config(100));
        poller.run_cycle().await.unwrap();

        // Force a replay of the same range.
        store.set_cursor(100).await.unwrap();
        let outcome = poller.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Processed {
                from: 100,
                to: 101,
                records: 0
            }
        );
        assert_eq!(store.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_completed_blocks() {
        let mut client = MockChainClient::new();
        client.tip = 103;
        client.blocks.insert(100, vec![qualifying_tx("first")]);
        client.blocks.insert(101, vec![qualifying_tx("second")]);
        // 102 missing: block fetch fails there.
        client.blocks.insert(103, vec![qualifying_tx("never-reached")]);

        let store = Arc::new(MemoryStore::new());
        let mut poller = Poller::new(client, store.clone(), config(100));

        let err = poller.run_cycle().await.unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(_)));
        assert_eq!(poller.state(), PollerState::ErrorBackoff);

        // Blocks 100 and 101 committed; cursor stops just past them.
        assert_eq!(store.get_cursor().await.unwrap(), 102);
        assert_eq!(store.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tip_failure_leaves_cursor_untouched() {
        let mut client = MockChainClient::new();
        client.fail_tip = true;

        let store = Arc::new(MemoryStore::new());
        let mut poller = Poller::new(client, store.clone(), config(100));

        assert!(poller.run_cycle().await.is_err());
        assert_eq!(poller.state(), PollerState::ErrorBackoff);
        assert_eq!(store.get_cursor().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_honored_between_blocks() {
        let mut client = MockChainClient::new();
        client.tip = 200;
        for h in 100..=200 {
            client.blocks.insert(h, vec![]);
        }

        let store = Arc::new(MemoryStore::new());
        let mut poller = Poller::new(client, store.clone(), config(100));

        let (tx, rx) = watch::channel(true);
        drop(tx);
        let outcome = poller.cycle(Some(&rx)).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Interrupted);
        assert_eq!(store.get_cursor().await.unwrap(), 0);
    }
}
