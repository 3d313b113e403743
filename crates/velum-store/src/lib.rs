//! # velum-store
//!
//! SQLite persistence layer for the velum messaging core.
//!
//! This crate provides:
//! - Per-user key-pair storage with rotation (at most one current pair)
//! - One-way migration out of the legacy plain-file key scheme
//! - A local public-key directory (publish/lookup)
//! - Connection pool management with embedded migrations
//!
//! Each storage abstraction is a trait with a SQLite and an in-memory
//! implementation, so the session layer can be exercised without a database.
//!
//! ## Example
//!
//! ```rust,ignore
//! use velum_crypto::Keypair;
//! use velum_store::{connect, KeyPairRecord, KeyPairStore, SqliteKeyPairStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("velum.db").await?;
//!     let store = SqliteKeyPairStore::new(pool);
//!
//!     let keypair = tokio::task::spawn_blocking(Keypair::generate).await??;
//!     let stored = store.put(KeyPairRecord::new("alice", keypair)).await?;
//!
//!     println!("Stored key pair: {}", stored.key_id);
//!     Ok(())
//! }
//! ```
pub mod directory;
pub mod key_pairs;
pub mod legacy;
pub mod memory;
pub mod migrate;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use the cached key pairs
pub mod test_fixtures;

// Re-export core types
pub use velum_core::*;

pub use directory::{KeyDirectory, MemoryKeyDirectory, SqliteKeyDirectory};
pub use key_pairs::{KeyPairRecord, KeyPairStore, KeyPairSummary, SqliteKeyPairStore};
pub use legacy::{FsLegacyKeyStore, LegacyKeyRecord, LegacyKeyStore, MemoryLegacyKeyStore};
pub use memory::MemoryKeyPairStore;
pub use migrate::LegacyKeyMigrator;
pub use pool::{connect, connect_with_config, PoolConfig};
