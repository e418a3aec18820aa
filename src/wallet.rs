//! Wallet collaborators: key-backed signing wallet and read-only address wallet

use crate::address::{Address, Credential};
use crate::codec::{CborCodec, CodecError, TxCodec};
use crate::hash::{KeyHash, TxHash};
use crate::provider::{Provider, ProviderError};
use crate::transaction::{Transaction, VkeyWitness, WitnessSet};
use crate::types::{Network, Utxo};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum WalletError {
    #[error("Wallet provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Wallet cannot {0}")]
    Unsupported(&'static str),

    #[error("Wallet codec error: {0}")]
    Codec(#[from] CodecError),
}

#[async_trait]
pub trait Wallet: Send + Sync {
    async fn address(&self) -> Result<Address, WalletError>;

    async fn get_utxos(&self) -> Result<Vec<Utxo>, WalletError>;

    /// Witness set holding this wallet's signatures over the body hash
    async fn sign_tx(&self, tx: &Transaction) -> Result<WitnessSet, WalletError>;

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxHash, WalletError>;
}

/// Parse a hex-encoded 32-byte ed25519 seed
pub fn signing_key_from_hex(private_key: &str) -> Result<SigningKey, WalletError> {
    let bytes = hex::decode(private_key).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| WalletError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Sign a body hash, producing one vkey witness
pub fn make_vkey_witness(key: &SigningKey, tx_hash: &TxHash) -> VkeyWitness {
    VkeyWitness {
        vkey: key.verifying_key().to_bytes(),
        signature: key.sign(tx_hash.as_bytes()).to_bytes(),
    }
}

/// Single-key wallet with an enterprise address
pub struct KeyWallet {
    key: SigningKey,
    network_id: u8,
    provider: Arc<dyn Provider>,
    codec: Arc<dyn TxCodec>,
}

impl KeyWallet {
    pub fn new(key: SigningKey, network: Network, provider: Arc<dyn Provider>) -> Self {
        Self {
            key,
            network_id: network.network_id(),
            provider,
            codec: Arc::new(CborCodec::new()),
        }
    }

    pub fn from_private_key(
        private_key: &str,
        network: Network,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, WalletError> {
        Ok(Self::new(signing_key_from_hex(private_key)?, network, provider))
    }

    /// Fresh random key
    pub fn generate(network: Network, provider: Arc<dyn Provider>) -> Self {
        let seed: [u8; 32] = rand::random();
        Self::new(SigningKey::from_bytes(&seed), network, provider)
    }

    pub fn with_codec(mut self, codec: Arc<dyn TxCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn key_hash(&self) -> KeyHash {
        KeyHash::of_vkey(self.key.verifying_key().as_bytes())
    }

    pub fn payment_address(&self) -> Address {
        Address::enterprise(self.network_id, Credential::Key(self.key_hash()))
    }
}

impl std::fmt::Debug for KeyWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyWallet")
            .field("address", &self.payment_address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Wallet for KeyWallet {
    async fn address(&self) -> Result<Address, WalletError> {
        Ok(self.payment_address())
    }

    async fn get_utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        Ok(self.provider.get_utxos(&self.payment_address()).await?)
    }

    async fn sign_tx(&self, tx: &Transaction) -> Result<WitnessSet, WalletError> {
        let tx_hash = self.codec.hash_body(&tx.body)?;
        Ok(WitnessSet {
            vkey_witnesses: vec![make_vkey_witness(&self.key, &tx_hash)],
            ..WitnessSet::default()
        })
    }

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxHash, WalletError> {
        Ok(self.provider.submit_tx(tx_cbor).await?)
    }
}

/// Address-only wallet: supplies UTxOs and a change address, cannot sign
pub struct ExternalWallet {
    address: Address,
    utxos: Option<Vec<Utxo>>,
    provider: Arc<dyn Provider>,
}

impl ExternalWallet {
    /// `utxos` pins the wallet's UTxO set instead of querying the provider
    pub fn new(address: Address, utxos: Option<Vec<Utxo>>, provider: Arc<dyn Provider>) -> Self {
        Self {
            address,
            utxos,
            provider,
        }
    }
}

#[async_trait]
impl Wallet for ExternalWallet {
    async fn address(&self) -> Result<Address, WalletError> {
        Ok(self.address.clone())
    }

    async fn get_utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        match &self.utxos {
            Some(utxos) => Ok(utxos.clone()),
            None => Ok(self.provider.get_utxos(&self.address).await?),
        }
    }

    async fn sign_tx(&self, _tx: &Transaction) -> Result<WitnessSet, WalletError> {
        Err(WalletError::Unsupported("sign transactions"))
    }

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxHash, WalletError> {
        Ok(self.provider.submit_tx(tx_cbor).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Emulator;
    use crate::transaction::TransactionBody;
    use ed25519_dalek::{Signature, Verifier};

    fn provider() -> Arc<dyn Provider> {
        Arc::new(Emulator::new(vec![]))
    }

    #[test]
    fn test_private_key_parsing() {
        assert!(signing_key_from_hex(&"11".repeat(32)).is_ok());
        assert!(matches!(
            signing_key_from_hex("abcd"),
            Err(WalletError::InvalidKey(_))
        ));
        assert!(signing_key_from_hex("not hex").is_err());
    }

    #[test]
    fn test_address_commits_to_key_hash() {
        let wallet = KeyWallet::from_private_key(&"22".repeat(32), Network::Mainnet, provider()).unwrap();
        let addr = wallet.payment_address();
        assert_eq!(addr.network_id(), Some(1));
        assert_eq!(addr.payment_credential(), Some(Credential::Key(wallet.key_hash())));
    }

    #[tokio::test]
    async fn test_signature_verifies_over_body_hash() {
        let wallet = KeyWallet::from_private_key(&"33".repeat(32), Network::Preview, provider()).unwrap();
        let tx = Transaction::new(TransactionBody::default(), WitnessSet::default());
        let witnesses = wallet.sign_tx(&tx).await.unwrap();
        let witness = &witnesses.vkey_witnesses[0];
        assert_eq!(witness.key_hash(), wallet.key_hash());

        let hash = CborCodec::new().hash_body(&tx.body).unwrap();
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&witness.vkey).unwrap();
        assert!(vk
            .verify(hash.as_bytes(), &Signature::from_bytes(&witness.signature))
            .is_ok());
    }

    #[tokio::test]
    async fn test_external_wallet_cannot_sign() {
        let addr = Address::enterprise(0, Credential::Key(KeyHash::new([1; 28])));
        let wallet = ExternalWallet::new(addr.clone(), Some(vec![]), provider());
        assert_eq!(wallet.address().await.unwrap(), addr);
        assert!(wallet.get_utxos().await.unwrap().is_empty());
        let tx = Transaction::new(TransactionBody::default(), WitnessSet::default());
        assert!(matches!(
            wallet.sign_tx(&tx).await,
            Err(WalletError::Unsupported(_))
        ));
    }
}
