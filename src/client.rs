//! Client entry point
//!
//! [`CardanoClient`] fetches protocol parameters once, holds the selected
//! wallet and opens build sessions. Each [`CardanoClient::new_tx`] call gets
//! a snapshot of the current collaborators, so selecting another wallet
//! later does not affect sessions that are already open.

use crate::address::Address;
use crate::config::Config;
use crate::provider::{Provider, ProviderError, ScriptEvaluator};
use crate::tx_builder::{SessionConfig, TxBuilder};
use crate::types::{Network, ProtocolParameters, SlotConfig, Utxo};
use crate::wallet::{ExternalWallet, KeyWallet, Wallet, WalletError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

pub struct CardanoClient {
    session: RwLock<SessionConfig>,
    config: Config,
}

impl CardanoClient {
    pub async fn new(provider: Arc<dyn Provider>, config: Config) -> Result<Self, ProviderError> {
        let mut params = provider.get_protocol_parameters().await?;
        config.protocol_overrides.apply(&mut params);

        let session = SessionConfig::new(config.network, params, provider)
            .with_slot_config(config.slot_config())
            .with_settings(config.builder.clone());

        info!(
            network = ?config.network,
            min_fee_a = session.params.min_fee_a,
            min_fee_b = session.params.min_fee_b,
            "🔌 Cardano client initialized"
        );
        Ok(Self {
            session: RwLock::new(session),
            config,
        })
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn select_wallet(&self, wallet: Arc<dyn Wallet>) {
        self.session.write().wallet = Some(wallet);
    }

    /// Key wallet with an enterprise address on the client's network
    pub fn select_wallet_from_private_key(&self, private_key: &str) -> Result<(), WalletError> {
        let provider = self.provider();
        let wallet = KeyWallet::from_private_key(private_key, self.config.network, provider)?;
        self.select_wallet(Arc::new(wallet));
        Ok(())
    }

    /// Read-only wallet: sessions can balance against it but not sign
    pub fn select_wallet_from_address(&self, address: Address, utxos: Option<Vec<Utxo>>) {
        let wallet = ExternalWallet::new(address, utxos, self.provider());
        self.select_wallet(Arc::new(wallet));
    }

    pub fn with_evaluator(self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.session.write().evaluator = Some(evaluator);
        self
    }

    pub fn with_slot_config(self, slot_config: SlotConfig) -> Self {
        self.session.write().slot_config = slot_config;
        self
    }

    pub fn new_tx(&self) -> TxBuilder {
        TxBuilder::new(Arc::new(self.session.read().clone()))
    }

    pub fn wallet(&self) -> Option<Arc<dyn Wallet>> {
        self.session.read().wallet.clone()
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.session.read().provider.clone()
    }

    pub fn protocol_parameters(&self) -> ProtocolParameters {
        self.session.read().params.clone()
    }

    pub fn slot_config(&self) -> SlotConfig {
        self.session.read().slot_config
    }

    /// `None` before the chain's zero time
    pub fn unix_time_to_slot(&self, unix_ms: u64) -> Option<u64> {
        self.session.read().slot_config.unix_time_to_slot(unix_ms)
    }
}
