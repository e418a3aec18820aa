//! Client configuration
//!
//! Loaded from TOML, optionally overlaid with environment variables:
//! - `CARDANO_TX_NETWORK`: `mainnet`, `preprod`, `preview` or `custom`
//! - `CARDANO_TX_MAX_FEE_ITERATIONS`: fee fixed-point bound

use crate::types::{Network, ProtocolParameters, SlotConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: Network,

    /// Overrides the network's known slot schedule (emulators, devnets)
    #[serde(default)]
    pub slot_config: Option<SlotConfig>,

    #[serde(default)]
    pub builder: BuilderSettings,

    /// Applied on top of the provider's protocol parameters
    #[serde(default)]
    pub protocol_overrides: ProtocolOverrides,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning of the completion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    #[serde(default = "default_max_fee_iterations")]
    pub max_fee_iterations: u32,

    /// Re-balancing rounds (coin selection, evaluation, collateral re-plan)
    #[serde(default = "default_max_balance_attempts")]
    pub max_balance_attempts: u32,

    /// Lovelace posted as collateral when scripts run
    #[serde(default = "default_collateral_amount")]
    pub collateral_amount: u64,

    #[serde(default = "default_true")]
    pub coin_selection: bool,

    /// Prefer a configured local evaluator over the provider's
    #[serde(default = "default_true")]
    pub local_uplc_eval: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolOverrides {
    pub min_fee_a: Option<u64>,
    pub min_fee_b: Option<u64>,
    pub coins_per_utxo_byte: Option<u64>,
    pub max_tx_size: Option<u64>,
    pub max_collateral_inputs: Option<u64>,
    pub collateral_percentage: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,

    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_max_fee_iterations() -> u32 { 10 }
fn default_max_balance_attempts() -> u32 { 8 }
fn default_collateral_amount() -> u64 { 5_000_000 }
fn default_true() -> bool { true }
fn default_log_filter() -> String { "info".to_string() }

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            max_fee_iterations: default_max_fee_iterations(),
            max_balance_attempts: default_max_balance_attempts(),
            collateral_amount: default_collateral_amount(),
            coin_selection: default_true(),
            local_uplc_eval: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: default_log_filter(),
        }
    }
}

impl ProtocolOverrides {
    pub fn apply(&self, params: &mut ProtocolParameters) {
        if let Some(v) = self.min_fee_a {
            params.min_fee_a = v;
        }
        if let Some(v) = self.min_fee_b {
            params.min_fee_b = v;
        }
        if let Some(v) = self.coins_per_utxo_byte {
            params.coins_per_utxo_byte = v;
        }
        if let Some(v) = self.max_tx_size {
            params.max_tx_size = v;
        }
        if let Some(v) = self.max_collateral_inputs {
            params.max_collateral_inputs = v;
        }
        if let Some(v) = self.collateral_percentage {
            params.collateral_percentage = v;
        }
    }
}

impl Config {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Slot schedule in effect: the override, else the network's
    pub fn slot_config(&self) -> SlotConfig {
        self.slot_config.unwrap_or_else(|| self.network.slot_config())
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(network) = std::env::var("CARDANO_TX_NETWORK") {
            self.network = network
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("CARDANO_TX_NETWORK")?;
        }
        if let Ok(iterations) = std::env::var("CARDANO_TX_MAX_FEE_ITERATIONS") {
            self.builder.max_fee_iterations = iterations
                .parse()
                .context("CARDANO_TX_MAX_FEE_ITERATIONS")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.builder.max_fee_iterations == 0 {
            anyhow::bail!("builder.max_fee_iterations must be at least 1");
        }
        if self.builder.max_balance_attempts == 0 {
            anyhow::bail!("builder.max_balance_attempts must be at least 1");
        }
        if let Some(slot_config) = &self.slot_config {
            if slot_config.slot_length_ms == 0 {
                anyhow::bail!("slot_config.slot_length_ms must be positive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network, Network::Preprod);
        assert_eq!(config.builder.max_fee_iterations, 10);
        assert_eq!(config.builder.collateral_amount, 5_000_000);
        assert!(config.builder.coin_selection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
network = "preview"

[builder]
max_fee_iterations = 4

[protocol_overrides]
min_fee_b = 1000
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.network, Network::Preview);
        assert_eq!(config.builder.max_fee_iterations, 4);
        assert_eq!(config.builder.max_balance_attempts, 8);

        let mut params = ProtocolParameters::default();
        config.protocol_overrides.apply(&mut params);
        assert_eq!(params.min_fee_b, 1000);
        assert_eq!(params.min_fee_a, 44);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut config = Config::default();
        config.builder.max_fee_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "network = \"preview\"\n\n[logging]\njson = true\nfilter = \"warn\"").unwrap();
        let path = file.path().to_str().unwrap();

        std::env::set_var("CARDANO_TX_NETWORK", "mainnet");
        std::env::set_var("CARDANO_TX_MAX_FEE_ITERATIONS", "3");
        let config = Config::from_file_with_env(path).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.builder.max_fee_iterations, 3);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "warn");

        std::env::set_var("CARDANO_TX_MAX_FEE_ITERATIONS", "0");
        assert!(Config::from_file_with_env(path).is_err());
        std::env::set_var("CARDANO_TX_MAX_FEE_ITERATIONS", "many");
        assert!(Config::from_file_with_env(path).is_err());

        std::env::remove_var("CARDANO_TX_NETWORK");
        std::env::remove_var("CARDANO_TX_MAX_FEE_ITERATIONS");
        assert_eq!(Config::from_file_with_env(path).unwrap().network, Network::Preview);
    }

    #[test]
    fn test_slot_config_override() {
        let mut config = Config::for_network(Network::Mainnet);
        assert_eq!(config.slot_config(), Network::Mainnet.slot_config());
        let custom = SlotConfig {
            zero_time_ms: 42,
            zero_slot: 0,
            slot_length_ms: 1000,
        };
        config.slot_config = Some(custom);
        assert_eq!(config.slot_config(), custom);
    }
}
