//! HTTP implementation of [`ChainClient`] backed by `reqwest`.
//!
//! Talks to three services:
//! - Bitcoin Core JSON-RPC (`getblockhash`, `getblock` at verbosity 2) for
//!   block transaction lists
//! - the ord server REST API for tip height, outputs, and inscription data
//! - an esplora/electrs API for outspend lookups
//!
//! Timeouts are per request: tip-height queries get the long timeout, all
//! lookup calls the short one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use labitbu_core::config::Config;
use labitbu_core::error::IndexerError;
use labitbu_core::types::{TxInput, WitnessTx};

use crate::client::{ChainClient, InscriptionDetail, OutputInfo, Outspend};

/// JSON-RPC request envelope for Bitcoin Core.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

// ─── Raw Bitcoin Core block JSON ─────────────────────────────────────────────

/// `getblock <hash> 2` response, reduced to the fields we consume.
#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(default)]
    tx: Vec<RawTx>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    txid: String,
    #[serde(default)]
    vin: Vec<RawVin>,
}

#[derive(Debug, Deserialize)]
struct RawVin {
    /// Witness elements as hex strings. Absent for coinbase and
    /// pre-segwit inputs.
    #[serde(default)]
    txinwitness: Option<Vec<String>>,
}

fn raw_tx_to_witness_tx(raw: RawTx) -> WitnessTx {
    let txid = raw.txid;
    let vin = raw
        .vin
        .into_iter()
        .map(|input| TxInput {
            witness: decode_witness(&txid, input.txinwitness),
        })
        .collect();
    WitnessTx { txid, vin }
}

/// Decode a witness stack from hex. An element that fails to decode drops the
/// whole input's witness (fail closed: the extractor will skip it).
fn decode_witness(txid: &str, elements: Option<Vec<String>>) -> Vec<Vec<u8>> {
    let Some(elements) = elements else {
        return Vec::new();
    };
    let mut decoded = Vec::with_capacity(elements.len());
    for element in &elements {
        match hex::decode(element) {
            Ok(bytes) => decoded.push(bytes),
            Err(err) => {
                warn!(%txid, %err, "undecodable witness element, skipping input");
                return Vec::new();
            }
        }
    }
    decoded
}

/// ord `/sat/{sat}` response, reduced to the inscription listing.
#[derive(Debug, Deserialize)]
struct SatInfo {
    #[serde(default)]
    inscriptions: Vec<String>,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Production [`ChainClient`] over HTTP.
pub struct HttpChainClient {
    http: reqwest::Client,
    config: Config,
    rpc_id: AtomicU64,
}

impl HttpChainClient {
    pub fn new(config: Config) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;
        Ok(Self {
            http,
            config,
            rpc_id: AtomicU64::new(1),
        })
    }

    fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.config.lookup_timeout_secs)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        timeout: Duration,
    ) -> Result<T, IndexerError> {
        let resp = self
            .http
            .get(&url)
            .timeout(timeout)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IndexerError::Rpc(format!(
                "GET {url}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| IndexerError::Decode(e.to_string()))
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, IndexerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.rpc_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self
            .http
            .post(&self.config.bitcoind_rpc_url)
            .timeout(self.lookup_timeout())
            .json(&request);

        if let Some(auth) = &self.config.bitcoind_rpc_auth {
            if let Some((user, password)) = auth.split_once(':') {
                builder = builder.basic_auth(user, Some(password));
            }
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IndexerError::Rpc(format!(
                "{method}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| IndexerError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(IndexerError::Rpc(format!(
                "{method}: {} (code {})",
                err.message, err.code
            )));
        }
        body.result
            .ok_or_else(|| IndexerError::Rpc(format!("{method}: missing result")))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        let url = format!("{}/blockheight", self.config.ord_api_url);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(self.config.tip_timeout_secs))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IndexerError::Rpc(format!(
                "GET {url}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;
        body.trim()
            .parse::<u64>()
            .map_err(|e| IndexerError::Decode(format!("blockheight {body:?}: {e}")))
    }

    async fn block_transactions(&self, height: u64) -> Result<Vec<WitnessTx>, IndexerError> {
        let hash = self
            .rpc_call("getblockhash", json!([height]))
            .await?
            .as_str()
            .ok_or_else(|| IndexerError::Decode("getblockhash: non-string result".into()))?
            .to_string();

        let raw = self.rpc_call("getblock", json!([hash, 2])).await?;
        let block: RawBlock =
            serde_json::from_value(raw).map_err(|e| IndexerError::Decode(e.to_string()))?;

        Ok(block.tx.into_iter().map(raw_tx_to_witness_tx).collect())
    }

    async fn output(&self, txid: &str, vout: u32) -> Result<OutputInfo, IndexerError> {
        let url = format!("{}/output/{txid}:{vout}", self.config.ord_api_url);
        self.get_json(url, self.lookup_timeout()).await
    }

    async fn outspend(&self, txid: &str, vout: u32) -> Result<Outspend, IndexerError> {
        let url = format!("{}/tx/{txid}/outspend/{vout}", self.config.esplora_api_url);
        self.get_json(url, self.lookup_timeout()).await
    }

    async fn inscriptions_for_sat(&self, sat: u64) -> Result<Vec<String>, IndexerError> {
        let url = format!("{}/sat/{sat}", self.config.ord_api_url);
        let info: SatInfo = self.get_json(url, self.lookup_timeout()).await?;
        Ok(info.inscriptions)
    }

    async fn inscription_detail(
        &self,
        inscription_id: &str,
    ) -> Result<InscriptionDetail, IndexerError> {
        let url = format!("{}/r/inscription/{inscription_id}", self.config.ord_api_url);
        self.get_json(url, self.lookup_timeout()).await
    }

    async fn inscription_metadata(
        &self,
        inscription_id: &str,
    ) -> Result<Option<String>, IndexerError> {
        let url = format!("{}/r/metadata/{inscription_id}", self.config.ord_api_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.lookup_timeout())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(IndexerError::Rpc(format!(
                "GET {url}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let metadata: String = resp
            .json()
            .await
            .map_err(|e| IndexerError::Decode(e.to_string()))?;
        Ok(if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        })
    }
}
