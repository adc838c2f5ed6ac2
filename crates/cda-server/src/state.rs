use std::sync::Arc;

use cda_bridge::CommitOrchestrator;

use crate::config::ServerConfig;

/// Request size limits enforced at the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_chunk_size: u64,
    pub max_batch_size: u64,
}

impl From<&ServerConfig> for Limits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            max_batch_size: config.max_batch_size,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<CommitOrchestrator>,
    pub limits: Limits,
}

impl AppState {
    pub fn new(bridge: Arc<CommitOrchestrator>, limits: Limits) -> Self {
        Self { bridge, limits }
    }
}
