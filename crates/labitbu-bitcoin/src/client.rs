//! Chain data client trait.
//!
//! Wraps everything the engines need from external services: block and
//! transaction retrieval (Bitcoin Core), output/outspend lookups and
//! inscription data (ord + esplora). The trait exists so the poller, resolver,
//! and reconciler can be tested against mocks.

use async_trait::async_trait;
use serde::Deserialize;

use labitbu_core::error::IndexerError;
use labitbu_core::types::WitnessTx;

/// An output as reported by the ord server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputInfo {
    /// Whether the output has been spent.
    pub spent: bool,
    /// Sat ranges `[start, end)` held by the output. Only present while the
    /// output is unspent and the ord index tracks ranges.
    #[serde(default)]
    pub sat_ranges: Option<Vec<(u64, u64)>>,
}

impl OutputInfo {
    /// First sat of the first range, the conventional identity of the output.
    pub fn first_sat(&self) -> Option<u64> {
        self.sat_ranges.as_ref()?.first().map(|range| range.0)
    }
}

/// Spend status of an output, as reported by esplora.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outspend {
    pub spent: bool,
    /// Spending transaction id. Absent while unspent.
    #[serde(default)]
    pub txid: Option<String>,
    /// Input index within the spending transaction. Absent while unspent.
    #[serde(default)]
    pub vin: Option<u32>,
}

/// Inscription detail, reduced to the field the reconciler consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InscriptionDetail {
    /// The inscription this one delegates its content to, if any.
    #[serde(default)]
    pub delegate: Option<String>,
}

/// Retrieval surface over the external chain services.
///
/// Every call is a network request with an explicit timeout; errors surface
/// as [`IndexerError::Rpc`] and each caller decides whether that is fatal
/// (block polling) or merely "unresolved for this run" (enrichment).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain tip height.
    async fn tip_height(&self) -> Result<u64, IndexerError>;

    /// Full transaction list of the block at `height`, with decoded
    /// witness stacks.
    async fn block_transactions(&self, height: u64) -> Result<Vec<WitnessTx>, IndexerError>;

    /// Output status and sat ranges for `txid:vout`.
    async fn output(&self, txid: &str, vout: u32) -> Result<OutputInfo, IndexerError>;

    /// Spend status of `txid:vout`.
    async fn outspend(&self, txid: &str, vout: u32) -> Result<Outspend, IndexerError>;

    /// Inscription ids currently bound to `sat`, in the ord server's
    /// listing order.
    async fn inscriptions_for_sat(&self, sat: u64) -> Result<Vec<String>, IndexerError>;

    /// Detail for one inscription.
    async fn inscription_detail(
        &self,
        inscription_id: &str,
    ) -> Result<InscriptionDetail, IndexerError>;

    /// Hex-encoded CBOR metadata of an inscription, `None` when the
    /// inscription carries no metadata.
    async fn inscription_metadata(
        &self,
        inscription_id: &str,
    ) -> Result<Option<String>, IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sat_from_ranges() {
        let output = OutputInfo {
            spent: false,
            sat_ranges: Some(vec![(5000, 5010), (9000, 9100)]),
        };
        assert_eq!(output.first_sat(), Some(5000));
    }

    #[test]
    fn first_sat_absent() {
        assert_eq!(OutputInfo::default().first_sat(), None);
        let empty = OutputInfo {
            spent: false,
            sat_ranges: Some(vec![]),
        };
        assert_eq!(empty.first_sat(), None);
    }
}
