//! Shared fixtures for integration tests
#![allow(dead_code)]

use cardano_tx::{
    Address, Assets, CardanoClient, Config, Credential, Emulator, EmulatorAccount, KeyHash, KeyWallet, Network,
    Script, ScriptType,
};
use std::sync::Arc;

pub const WALLET_KEY: &str = "0707070707070707070707070707070707070707070707070707070707070707";
pub const OTHER_KEY: &str = "0909090909090909090909090909090909090909090909090909090909090909";

pub fn address_of(private_key: &str) -> Address {
    KeyWallet::from_private_key(private_key, Network::Custom, Arc::new(Emulator::new(vec![])))
        .expect("valid key")
        .payment_address()
}

pub fn key_hash_of(private_key: &str) -> KeyHash {
    KeyWallet::from_private_key(private_key, Network::Custom, Arc::new(Emulator::new(vec![])))
        .expect("valid key")
        .key_hash()
}

pub fn receiver() -> Address {
    Address::enterprise(0, Credential::Key(KeyHash::new([0x42; 28])))
}

/// Reward address sharing the wallet's key
pub fn wallet_reward_address() -> Address {
    Address::reward(0, Credential::Key(key_hash_of(WALLET_KEY)))
}

pub fn always_true_v3() -> Script {
    Script::new(ScriptType::PlutusV3, vec![0x46, 0x01, 0x00, 0x00, 0x22, 0x00, 0x11])
}

pub fn script_address(script: &Script) -> Address {
    Address::enterprise(0, Credential::Script(script.hash()))
}

pub fn config_for(emulator: &Emulator) -> Config {
    Config {
        network: Network::Custom,
        slot_config: Some(emulator.slot_config()),
        ..Config::default()
    }
}

/// Emulator funding the wallet with `utxos` outputs of the given lovelace
pub async fn funded(utxos: &[u64]) -> (Arc<Emulator>, CardanoClient) {
    let wallet = address_of(WALLET_KEY);
    let accounts = utxos
        .iter()
        .map(|lovelace| EmulatorAccount::new(wallet.clone(), Assets::from_lovelace(*lovelace)))
        .collect();
    client_with(Emulator::new(accounts)).await
}

pub async fn client_with(emulator: Emulator) -> (Arc<Emulator>, CardanoClient) {
    let emulator = Arc::new(emulator);
    let client = CardanoClient::new(emulator.clone(), config_for(&emulator))
        .await
        .expect("client");
    client
        .select_wallet_from_private_key(WALLET_KEY)
        .expect("wallet");
    (emulator, client)
}
