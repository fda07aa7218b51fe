//! labitbu-core — types and pure logic for the labitbu indexer.
//!
//! # Architecture
//!
//! ```text
//! cli → Poller (labitbu-bitcoin)
//!           ├── extract::scan_transaction   (this crate, pure)
//!           ├── ChainClient                 (labitbu-bitcoin, HTTP)
//!           └── RecordStore                 (trait here, backends in labitbu-storage)
//!       SatResolver / Reconciler (labitbu-bitcoin) enrich records the same way.
//! ```
//!
//! This crate does no I/O: the payload extractor is a deterministic function
//! over parsed witness data, and the store surface is a trait.

pub mod config;
pub mod error;
pub mod extract;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::IndexerError;
pub use extract::{scan_transaction, LABITBU_INTERNAL_KEY};
pub use store::RecordStore;
pub use types::{Detection, NewRecord, Record, TxInput, WitnessTx};
