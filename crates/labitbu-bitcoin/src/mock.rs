//! Scriptable [`ChainClient`] for engine tests.

use std::collections::HashMap;

use async_trait::async_trait;

use labitbu_core::error::IndexerError;
use labitbu_core::types::WitnessTx;

use crate::client::{ChainClient, InscriptionDetail, OutputInfo, Outspend};

/// Mock client: every map is keyed the way the real endpoints are addressed,
/// and a missing entry behaves like a failing network call (except sat
/// listings and metadata, which are legitimately empty/absent).
#[derive(Default)]
pub(crate) struct MockChainClient {
    pub tip: u64,
    pub fail_tip: bool,
    pub blocks: HashMap<u64, Vec<WitnessTx>>,
    /// Keyed `"txid:vout"`.
    pub outputs: HashMap<String, OutputInfo>,
    /// Keyed `"txid:vout"`.
    pub outspends: HashMap<String, Outspend>,
    pub sat_inscriptions: HashMap<u64, Vec<String>>,
    pub details: HashMap<String, InscriptionDetail>,
    pub metadata: HashMap<String, String>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&mut self, txid: &str, vout: u32, output: OutputInfo) {
        self.outputs.insert(format!("{txid}:{vout}"), output);
    }

    pub fn set_outspend(&mut self, txid: &str, vout: u32, outspend: Outspend) {
        self.outspends.insert(format!("{txid}:{vout}"), outspend);
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        if self.fail_tip {
            return Err(IndexerError::Rpc("tip unavailable".into()));
        }
        Ok(self.tip)
    }

    async fn block_transactions(&self, height: u64) -> Result<Vec<WitnessTx>, IndexerError> {
        self.blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("no block at {height}")))
    }

    async fn output(&self, txid: &str, vout: u32) -> Result<OutputInfo, IndexerError> {
        self.outputs
            .get(&format!("{txid}:{vout}"))
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("no output {txid}:{vout}")))
    }

    async fn outspend(&self, txid: &str, vout: u32) -> Result<Outspend, IndexerError> {
        self.outspends
            .get(&format!("{txid}:{vout}"))
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("no outspend {txid}:{vout}")))
    }

    async fn inscriptions_for_sat(&self, sat: u64) -> Result<Vec<String>, IndexerError> {
        Ok(self.sat_inscriptions.get(&sat).cloned().unwrap_or_default())
    }

    async fn inscription_detail(
        &self,
        inscription_id: &str,
    ) -> Result<InscriptionDetail, IndexerError> {
        self.details
            .get(inscription_id)
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("no inscription {inscription_id}")))
    }

    async fn inscription_metadata(
        &self,
        inscription_id: &str,
    ) -> Result<Option<String>, IndexerError> {
        Ok(self.metadata.get(inscription_id).cloned())
    }
}
