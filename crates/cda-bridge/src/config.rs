use std::time::Duration;

use serde::{Deserialize, Serialize};

use cda_types::OwnerId;

/// Configuration for the commit orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// The namespace the ledger certifies our data under.
    pub owner: OwnerId,
    /// Deadline applied to each ledger `store` and `fetch`.
    pub upstream_timeout: Duration,
    /// Reject certificates older than this. `None` disables the check.
    pub max_certificate_age: Option<Duration>,
}

impl BridgeConfig {
    /// Defaults for `owner`: 30 second upstream deadline, no age limit.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            upstream_timeout: Duration::from_secs(30),
            max_certificate_age: None,
        }
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_max_certificate_age(mut self, age: Duration) -> Self {
        self.max_certificate_age = Some(age);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_serde() {
        let owner = OwnerId::from_text("bkyz2-fmaaa-aaaaa-qaaaq-cai").unwrap();
        let config = BridgeConfig::new(owner.clone())
            .with_upstream_timeout(Duration::from_millis(250))
            .with_max_certificate_age(Duration::from_secs(60));
        assert_eq!(config.upstream_timeout, Duration::from_millis(250));

        let json = serde_json::to_string(&config).unwrap();
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.owner, owner);
        assert_eq!(back.max_certificate_age, Some(Duration::from_secs(60)));
    }
}
