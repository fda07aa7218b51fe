//! Bitcoin-facing side of the labitbu indexer.
//!
//! [`client::ChainClient`] abstracts the three upstream services (bitcoind
//! JSON-RPC, an ord server, and an esplora instance); [`http::HttpChainClient`]
//! is the production implementation. On top of the client sit the three
//! drivers: [`poller::Poller`] walks blocks and extracts embeddings,
//! [`resolver`] traces each reveal to its current sat, and [`reconciler`]
//! attaches and re-validates inscriptions.

pub mod client;
pub mod http;
pub mod poller;
pub mod reconciler;
pub mod resolver;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ChainClient, InscriptionDetail, OutputInfo, Outspend};
pub use http::HttpChainClient;
pub use poller::{CycleOutcome, Poller, PollerState};
pub use reconciler::{assign_inscriptions, check_candidate, validate_assigned, SweepReport};
pub use resolver::{populate_sats, resolve_sat};
