use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use cda_batch::InMemoryBatchStore;
use cda_bridge::CommitOrchestrator;
use cda_crypto::SigningKey;
use cda_ledger::{InMemoryLedger, LedgerClient};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::{AppState, Limits};

/// Subnet id the local ledger delegates to when `ledger.delegated` is set.
const LOCAL_SUBNET_ID: &[u8] = b"cda-local-subnet";

/// Data-availability bridge server backed by the local certified ledger.
pub struct DaServer {
    config: ServerConfig,
    state: AppState,
    root_public_key: Vec<u8>,
}

impl DaServer {
    /// Wire the batch store, local ledger, and orchestrator from `config`.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let owner = config.owner_id()?;
        let mut ledger = InMemoryLedger::new(owner, config.signing_key()?);
        if config.ledger.delegated {
            ledger = ledger
                .with_delegation(LOCAL_SUBNET_ID.to_vec(), SigningKey::generate())
                .map_err(|e| ServerError::Config(format!("ledger delegation: {e}")))?;
        }
        let root_public_key = ledger.root_public_key();

        let bridge = CommitOrchestrator::new(
            Arc::new(InMemoryBatchStore::new()),
            Arc::new(ledger),
            config.bridge_config()?,
        );
        let state = AppState::new(Arc::new(bridge), Limits::from(&config));
        Ok(Self {
            config,
            state,
            root_public_key,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The key clients need to verify records offline.
    pub fn root_public_key(&self) -> &[u8] {
        &self.root_public_key
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            owner = %self.config.owner,
            root_key = %hex::encode(&self.root_public_key),
            delegated = self.config.ledger.delegated,
            "cda server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
