use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cda_bridge::BridgeConfig;
use cda_crypto::SigningKey;
use cda_types::OwnerId;

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually loaded from a TOML file.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Owner identity in principal text form.
    pub owner: String,
    /// Deadline for each ledger store and fetch, in milliseconds.
    pub upstream_timeout_ms: u64,
    /// Reject certificates older than this many seconds.
    pub max_certificate_age_secs: Option<u64>,
    pub max_chunk_size: u64,
    pub max_batch_size: u64,
    pub ledger: LedgerConfig,
}

/// Settings for the local certified ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// 32-byte hex seed of the root signing key. Random when absent.
    pub signing_seed: Option<String>,
    /// Issue certificates through a subnet delegation.
    pub delegated: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            owner: "bkyz2-fmaaa-aaaaa-qaaaq-cai".into(),
            upstream_timeout_ms: 30_000,
            max_certificate_age_secs: None,
            max_chunk_size: 1024 * 1024,
            max_batch_size: 64 * 1024 * 1024,
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn owner_id(&self) -> ServerResult<OwnerId> {
        OwnerId::from_text(&self.owner).map_err(|e| ServerError::Config(format!("owner: {e}")))
    }

    /// The orchestrator settings this configuration implies.
    pub fn bridge_config(&self) -> ServerResult<BridgeConfig> {
        let mut config = BridgeConfig::new(self.owner_id()?)
            .with_upstream_timeout(Duration::from_millis(self.upstream_timeout_ms));
        if let Some(secs) = self.max_certificate_age_secs {
            config = config.with_max_certificate_age(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// The local ledger's root signing key.
    pub fn signing_key(&self) -> ServerResult<SigningKey> {
        match &self.ledger.signing_seed {
            None => Ok(SigningKey::generate()),
            Some(seed) => {
                let bytes = hex::decode(seed.trim_start_matches("0x"))
                    .map_err(|e| ServerError::Config(format!("ledger.signing_seed: {e}")))?;
                let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
                    ServerError::Config(format!("ledger.signing_seed: expected 32 bytes, got {}", b.len()))
                })?;
                Ok(SigningKey::from_bytes(seed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.upstream_timeout_ms, 30_000);
        assert_eq!(c.max_chunk_size, 1 << 20);
        assert_eq!(c.max_batch_size, 64 << 20);
        assert!(!c.ledger.delegated);
        assert!(c.owner_id().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(ServerConfig::from_toml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let c = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"
            upstream_timeout_ms = 500

            [ledger]
            delegated = true
            signing_seed = "0707070707070707070707070707070707070707070707070707070707070707"
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert!(c.ledger.delegated);
        assert_eq!(
            c.bridge_config().unwrap().upstream_timeout,
            Duration::from_millis(500)
        );
        assert_eq!(
            c.signing_key().unwrap().verifying_key(),
            SigningKey::from_bytes([7; 32]).verifying_key()
        );
    }

    #[test]
    fn bad_values_are_config_errors() {
        let c = ServerConfig {
            owner: "not-a-principal".into(),
            ..Default::default()
        };
        assert!(matches!(c.owner_id(), Err(ServerError::Config(_))));

        let c = ServerConfig {
            ledger: LedgerConfig {
                signing_seed: Some("abcd".into()),
                delegated: false,
            },
            ..Default::default()
        };
        assert!(matches!(c.signing_key(), Err(ServerError::Config(_))));
        assert!(ServerConfig::from_toml("bind_addr = 5").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cda.toml");
        std::fs::write(&path, "max_chunk_size = 16\n").unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap().max_chunk_size, 16);
    }
}
