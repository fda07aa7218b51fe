//! Storage backends for the labitbu indexer.
//!
//! The [`labitbu_core::store::RecordStore`] trait is implemented by:
//! - [`sqlite::SqliteStore`] — production backend, single SQLite file
//! - [`memory::MemoryStore`] — tests and ephemeral runs

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreStats};
