//! Shared types for the indexing pipeline.

use serde::{Deserialize, Serialize};

// ─── Records ─────────────────────────────────────────────────────────────────

/// A persisted labitbu record: one embedded payload found in a transaction
/// input, identified by `(txid, vin)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Surrogate id assigned by the store at creation.
    pub id: i64,
    /// Transaction id (hex). Not unique on its own.
    pub txid: String,
    /// Index of the witness-bearing input within its transaction.
    pub vin: u32,
    /// Ordinal number of the sat the embedding is bound to, once resolved.
    pub sat: Option<u64>,
    /// Lowercase-hex SHA-256 of the embedded payload. Set at creation.
    pub checksum: String,
    /// Verified inscription id, once reconciled. May be cleared again if a
    /// later validation pass finds it invalid.
    pub inscription_id: Option<String>,
}

/// A record as produced by the poller, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub txid: String,
    pub vin: u32,
    pub checksum: String,
}

// ─── Transactions ────────────────────────────────────────────────────────────

/// One transaction input with its decoded witness stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Witness elements in stack order, raw bytes. Empty for pre-segwit and
    /// coinbase inputs.
    pub witness: Vec<Vec<u8>>,
}

/// A parsed transaction, reduced to what the payload extractor consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessTx {
    /// Transaction id (hex).
    pub txid: String,
    /// Inputs in order.
    pub vin: Vec<TxInput>,
}

/// One payload extractor match within a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Input index the payload was embedded in.
    pub vin: u32,
    /// Lowercase-hex SHA-256 of the payload.
    pub checksum: String,
}

impl Detection {
    /// Pair the detection with its transaction id to form an insertable record.
    pub fn into_record(self, txid: &str) -> NewRecord {
        NewRecord {
            txid: txid.to_string(),
            vin: self.vin,
            checksum: self.checksum,
        }
    }
}
