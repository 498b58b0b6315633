//! Configuration loading for the node runtime.
//!
//! Starts from [`SyncConfig::default`] and applies environment overrides.
//! Unparseable values are logged and ignored.

use qc_18_block_sync::SyncConfig;
use tracing::{info, warn};

/// Chain id: 64 hex chars, or any other label (hashed).
pub const ENV_CHAIN_ID: &str = "QC_SYNC_CHAIN_ID";
/// `true`/`1` to start with initial sync.
pub const ENV_INITIAL_SYNC: &str = "QC_SYNC_INITIAL";
/// Cap on outstanding block requests.
pub const ENV_MAX_BLOCK_REQUESTS: &str = "QC_SYNC_MAX_BLOCK_REQUESTS";
/// Cap on outstanding transaction requests.
pub const ENV_MAX_TX_REQUESTS: &str = "QC_SYNC_MAX_TX_REQUESTS";
/// Out-of-date window.
pub const ENV_WINDOW: &str = "QC_SYNC_WINDOW";

/// Load configuration from the process environment.
pub fn load_config() -> SyncConfig {
    config_from(|key| std::env::var(key).ok())
}

/// Load configuration from an arbitrary variable lookup.
pub fn config_from(lookup: impl Fn(&str) -> Option<String>) -> SyncConfig {
    let mut config = SyncConfig::default();

    if let Some(value) = lookup(ENV_CHAIN_ID) {
        config.chain_id = parse_chain_id(&value);
        info!("Chain id from environment: {}", hex::encode(config.chain_id));
    }

    if let Some(value) = lookup(ENV_INITIAL_SYNC) {
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.initial_sync = true,
            "0" | "false" | "no" => config.initial_sync = false,
            other => warn!("{} must be a boolean, got {:?}", ENV_INITIAL_SYNC, other),
        }
    }

    if let Some(value) = lookup(ENV_MAX_BLOCK_REQUESTS) {
        match value.parse() {
            Ok(n) => config.max_block_requests = n,
            Err(_) => warn!("{} must be a number, got {:?}", ENV_MAX_BLOCK_REQUESTS, value),
        }
    }
    if let Some(value) = lookup(ENV_MAX_TX_REQUESTS) {
        match value.parse() {
            Ok(n) => config.max_transaction_requests = n,
            Err(_) => warn!("{} must be a number, got {:?}", ENV_MAX_TX_REQUESTS, value),
        }
    }
    if let Some(value) = lookup(ENV_WINDOW) {
        match value.parse() {
            Ok(n) => config.out_of_date_window = n,
            Err(_) => warn!("{} must be a number, got {:?}", ENV_WINDOW, value),
        }
    }

    config
}

fn parse_chain_id(value: &str) -> [u8; 32] {
    if value.len() == 64 {
        if let Ok(bytes) = hex::decode(value) {
            let mut id = [0u8; 32];
            id.copy_from_slice(&bytes);
            return id;
        }
    }
    SyncConfig::chain_id_from_label(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(env(&[]));
        assert_eq!(config.max_block_requests, 10);
        assert!(!config.initial_sync);
        assert_eq!(config.chain_id, SyncConfig::chain_id_from_label("qc-mainnet"));
    }

    #[test]
    fn test_overrides_applied() {
        let config = config_from(env(&[
            (ENV_CHAIN_ID, "qc-devnet"),
            (ENV_INITIAL_SYNC, "true"),
            (ENV_MAX_BLOCK_REQUESTS, "3"),
            (ENV_MAX_TX_REQUESTS, "5"),
            (ENV_WINDOW, "16"),
        ]));
        assert_eq!(config.chain_id, SyncConfig::chain_id_from_label("qc-devnet"));
        assert!(config.initial_sync);
        assert_eq!(config.max_block_requests, 3);
        assert_eq!(config.max_transaction_requests, 5);
        assert_eq!(config.out_of_date_window, 16);
    }

    #[test]
    fn test_hex_chain_id() {
        let hex_id = "ab".repeat(32);
        let config = config_from(env(&[(ENV_CHAIN_ID, hex_id.as_str())]));
        assert_eq!(config.chain_id, [0xab; 32]);
    }

    #[test]
    fn test_bad_values_ignored() {
        let config = config_from(env(&[
            (ENV_MAX_BLOCK_REQUESTS, "many"),
            (ENV_INITIAL_SYNC, "maybe"),
        ]));
        assert_eq!(config.max_block_requests, 10);
        assert!(!config.initial_sync);
    }
}
