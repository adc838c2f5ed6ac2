//! HTTP server for the certified data-availability bridge.
//!
//! Exposes the chunked store over JSON-RPC (`/rpc`) and verified reads over
//! REST (`/get-by-hash/{digest}`), backed by an in-memory certified ledger.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod rpc;
pub mod server;
pub mod state;

pub use config::{LedgerConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::DaServer;
pub use state::{AppState, Limits};
