#![forbid(unsafe_code)]

use reward_core::EthLedgerConfig;
use serde::Deserialize;
use std::fmt;
use std::fs;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RewardNodeConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_label")]
    pub label: String,
}

fn default_node_label() -> String {
    "reward-node".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            label: default_node_label(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Hex signing key material. Deserializes like a plain string but never
/// renders its contents through `Debug`.
#[derive(Clone, Deserialize, Default)]
#[serde(transparent)]
pub struct SecretString(pub String);

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: u64,
    #[serde(default = "default_ledger_timeout_ms")]
    pub timeout_ms: u64,
    /// Usually `env:REWARD_SIGNER_KEY` in the file rather than a literal.
    #[serde(default)]
    pub private_key: SecretString,
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_gas_price_gwei() -> u64 {
    10
}

fn default_ledger_timeout_ms() -> u64 {
    10_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: 0,
            contract_address: String::new(),
            gas_limit: default_gas_limit(),
            gas_price_gwei: default_gas_price_gwei(),
            timeout_ms: default_ledger_timeout_ms(),
            private_key: SecretString::default(),
        }
    }
}

impl LedgerConfig {
    pub fn to_eth_config(&self) -> EthLedgerConfig {
        EthLedgerConfig {
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            contract_address: self.contract_address.clone(),
            gas_limit: self.gas_limit,
            gas_price_gwei: self.gas_price_gwei,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_classifier_endpoint() -> String {
    "http://127.0.0.1:5005/classify".to_string()
}

fn default_classifier_timeout_ms() -> u64 {
    15_000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn resolve_env_refs(mut v: toml::Value) -> Result<toml::Value, String> {
    fn walk(v: &mut toml::Value) -> Result<(), String> {
        match v {
            toml::Value::String(s) => {
                if let Some(var) = s.strip_prefix("env:") {
                    let var = var.trim();
                    if var.is_empty() {
                        return Err("invalid env: reference (empty var name)".to_string());
                    }
                    let val = std::env::var(var)
                        .map_err(|_| format!("missing required environment variable: {var}"))?;
                    *s = val;
                }
            }
            toml::Value::Array(arr) => {
                for x in arr {
                    walk(x)?;
                }
            }
            toml::Value::Table(map) => {
                for (_, x) in map.iter_mut() {
                    walk(x)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    walk(&mut v)?;
    Ok(v)
}

pub fn load_config(path: &str) -> Result<RewardNodeConfig, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("failed to read config {path}: {e}"))?;
    let parsed: toml::Value =
        toml::from_str(&raw).map_err(|e| format!("failed to parse config {path}: {e}"))?;
    let resolved = resolve_env_refs(parsed)?;
    resolved
        .try_into::<RewardNodeConfig>()
        .map_err(|e| format!("failed to decode config {path}: {e}"))
}

impl RewardNodeConfig {
    pub fn validate_for_mode_eth(&self) -> Result<(), String> {
        if self.node.label.trim().is_empty() {
            return Err("node.label is empty".to_string());
        }
        if self.ledger.rpc_url.trim().is_empty() {
            return Err("ledger.rpc_url is required for --ledger-mode eth".to_string());
        }
        if self.ledger.chain_id == 0 {
            return Err("ledger.chain_id is required for --ledger-mode eth".to_string());
        }
        if self.ledger.contract_address.trim().is_empty() {
            return Err("ledger.contract_address is required for --ledger-mode eth".to_string());
        }
        if self.ledger.private_key.0.trim().is_empty() {
            return Err("ledger.private_key is required for --ledger-mode eth".to_string());
        }
        if self.classifier.endpoint.trim().is_empty() {
            return Err("classifier.endpoint is empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(contents.as_bytes()).expect("write");
        f
    }

    #[test]
    fn defaults_apply_for_a_minimal_file() {
        let f = write_config("[node]\nlabel = \"scorer-1\"\n");
        let cfg = load_config(f.path().to_str().unwrap()).expect("config");
        assert_eq!(cfg.node.label, "scorer-1");
        assert_eq!(cfg.server.bind_address, "0.0.0.0:3000");
        assert!(cfg.server.metrics_enabled);
        assert_eq!(cfg.ledger.gas_limit, 300_000);
        assert_eq!(cfg.ledger.gas_price_gwei, 10);
        assert_eq!(cfg.classifier.endpoint, "http://127.0.0.1:5005/classify");
    }

    #[test]
    fn env_refs_resolve_into_string_fields() {
        std::env::set_var("REWARD_NODE_TEST_KEY_A", "0xabc123");
        let f = write_config(
            "[ledger]\nrpc_url = \"http://127.0.0.1:8545\"\nprivate_key = \"env:REWARD_NODE_TEST_KEY_A\"\n",
        );
        let cfg = load_config(f.path().to_str().unwrap()).expect("config");
        assert_eq!(cfg.ledger.private_key.0, "0xabc123");
    }

    #[test]
    fn missing_env_ref_is_an_error() {
        let f = write_config("[ledger]\nprivate_key = \"env:REWARD_NODE_TEST_KEY_UNSET\"\n");
        let err = load_config(f.path().to_str().unwrap()).unwrap_err();
        assert!(err.contains("REWARD_NODE_TEST_KEY_UNSET"));
    }

    #[test]
    fn debug_output_never_contains_key_material() {
        std::env::set_var("REWARD_NODE_TEST_KEY_B", "deadbeefcafe");
        let f = write_config(
            "[ledger]\nrpc_url = \"http://127.0.0.1:8545\"\nprivate_key = \"env:REWARD_NODE_TEST_KEY_B\"\n",
        );
        let cfg = load_config(f.path().to_str().unwrap()).expect("config");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("deadbeefcafe"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn eth_mode_validation_requires_ledger_fields() {
        let mut cfg = RewardNodeConfig::default();
        assert!(cfg.validate_for_mode_eth().is_err());

        cfg.ledger.rpc_url = "http://127.0.0.1:8545".to_string();
        cfg.ledger.chain_id = 11_155_111;
        cfg.ledger.contract_address = "0x1111111111111111111111111111111111111111".to_string();
        assert!(cfg.validate_for_mode_eth().is_err());

        cfg.ledger.private_key = SecretString("0xabc".to_string());
        assert!(cfg.validate_for_mode_eth().is_ok());
    }
}
