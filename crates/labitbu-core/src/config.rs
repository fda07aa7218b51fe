//! Indexer configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the labitbu indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path.
    pub db_path: String,
    /// Bitcoin Core JSON-RPC endpoint.
    pub bitcoind_rpc_url: String,
    /// Optional `user:password` for bitcoind RPC basic auth.
    pub bitcoind_rpc_auth: Option<String>,
    /// ord server base URL (recursive endpoints enabled).
    pub ord_api_url: String,
    /// esplora/electrs base URL (outspend lookups).
    pub esplora_api_url: String,
    /// First block to scan when no cursor has ever been written.
    pub start_height: u64,
    /// Delay between polling cycles when caught up (milliseconds).
    pub poll_interval_ms: u64,
    /// Delay before retrying a cycle after an error (milliseconds).
    pub error_retry_delay_ms: u64,
    /// Timeout for tip-height queries (seconds).
    pub tip_timeout_secs: u64,
    /// Timeout for output/inscription/metadata lookups (seconds).
    pub lookup_timeout_secs: u64,
    /// Maximum number of spends to follow when tracing a sat.
    pub max_trace_depth: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./data/labitbu.db".into(),
            bitcoind_rpc_url: "http://127.0.0.1:8332".into(),
            bitcoind_rpc_auth: None,
            ord_api_url: "http://0.0.0.0".into(),
            esplora_api_url: "https://mempool.space/api".into(),
            start_height: 908_070,
            poll_interval_ms: 1_000,
            error_retry_delay_ms: 5_000,
            tip_timeout_secs: 30,
            lookup_timeout_secs: 10,
            max_trace_depth: 10,
        }
    }
}
