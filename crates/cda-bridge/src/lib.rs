//! Commit orchestration for the certified data-availability bridge.
//!
//! The [`CommitOrchestrator`] is the one place where the batch store, the
//! ledger, and the certificate verifier meet. A commit reads the assembled
//! payload, hashes it locally, stores it in the ledger, fetches the
//! ledger's certified record back, and verifies it against the local digest
//! before finalizing the batch. Reads by digest run the same fetch and
//! verification and never return unverified data.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cda_batch::{BatchStore, InMemoryBatchStore};
//! use cda_bridge::{BridgeConfig, CommitOrchestrator};
//! use cda_crypto::SigningKey;
//! use cda_ledger::InMemoryLedger;
//! use cda_types::{BatchSpec, OwnerId};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let owner = OwnerId::from_text("bkyz2-fmaaa-aaaaa-qaaaq-cai").unwrap();
//! let ledger = InMemoryLedger::new(owner.clone(), SigningKey::generate());
//! let store = Arc::new(InMemoryBatchStore::new());
//! let bridge = CommitOrchestrator::new(store.clone(), Arc::new(ledger), BridgeConfig::new(owner));
//!
//! let id = store.create_batch(BatchSpec::with_timeout(300)).unwrap();
//! store.append_chunk(id, b"hello world").unwrap();
//! let receipt = bridge.commit_batch(id).await.unwrap();
//! let fetched = bridge.fetch_by_digest(&receipt.digest).await.unwrap();
//! assert_eq!(fetched.record.data, b"hello world");
//! # });
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use orchestrator::{CommitOrchestrator, FetchedRecord};
