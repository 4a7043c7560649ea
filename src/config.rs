// Configuration management module
// This file handles loading and parsing of configuration settings
// from environment variables

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

/// Fallback watch deadline when `pending_tx_timeout_secs` is unset.
pub const DEFAULT_PENDING_TX_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Semicolon-separated chain endpoints, e.g.
    /// `1=https://mainnet.example;10=https://optimism.example`
    pub rpc_endpoints: String,
    /// Deadline for a watched pending transaction to report a status, seconds
    pub pending_tx_timeout_secs: Option<u64>,
    /// Comma-separated processor names whose swap leg waits for approval
    /// confirmation before building, extending the built-in set
    pub approval_confirmation_overrides: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn rpc_endpoints(&self) -> Result<HashMap<u64, Url>> {
        let mut endpoints = HashMap::new();
        for entry in self.rpc_endpoints.split(';').filter(|s| !s.is_empty()) {
            let (chain, url) = entry
                .split_once('=')
                .with_context(|| format!("malformed rpc endpoint entry: {entry}"))?;
            let chain_id: u64 = chain
                .trim()
                .parse()
                .with_context(|| format!("invalid chain id: {chain}"))?;
            let url = Url::parse(url.trim())
                .with_context(|| format!("invalid rpc url for chain {chain_id}"))?;
            if endpoints.insert(chain_id, url).is_some() {
                bail!("duplicate rpc endpoint for chain {chain_id}");
            }
        }
        Ok(endpoints)
    }

    pub fn pending_tx_timeout(&self) -> Duration {
        self.pending_tx_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PENDING_TX_TIMEOUT)
    }

    pub fn approval_confirmation_overrides(&self) -> HashSet<String> {
        self.approval_confirmation_overrides
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_list() {
        let cfg = AppConfig {
            rpc_endpoints: "1=https://mainnet.example;10=https://optimism.example".into(),
            pending_tx_timeout_secs: Some(30),
            approval_confirmation_overrides: Some("Paraswap, CBridge".into()),
        };
        let endpoints = cfg.rpc_endpoints().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[&1].host_str(), Some("mainnet.example"));
        assert_eq!(cfg.pending_tx_timeout(), Duration::from_secs(30));
        let overrides = cfg.approval_confirmation_overrides();
        assert!(overrides.contains("CBridge"));
    }

    #[test]
    fn rejects_duplicate_chain() {
        let cfg = AppConfig {
            rpc_endpoints: "1=https://a.example;1=https://b.example".into(),
            pending_tx_timeout_secs: None,
            approval_confirmation_overrides: None,
        };
        assert!(cfg.rpc_endpoints().is_err());
    }
}
