//! Staged Cardano transaction builder
//!
//! Describe a transaction as a sequence of stages (spend, pay, mint,
//! delegate, withdraw, constrain) and let the completion engine select
//! wallet inputs, resolve redeemer indices, evaluate scripts, converge the
//! fee and hand back a transaction ready for signing and submission.
//!
//! Chain access goes through the [`Provider`] trait; the in-memory
//! [`Emulator`] implements it for tests and local development.

pub mod address;
pub mod assets;
pub mod client;
pub mod codec;
pub mod config;
pub mod hash;
pub mod metadata;
pub mod metrics;
pub mod observability;
pub mod provider;
pub mod structured_logging;
pub mod transaction;
pub mod tx_builder;
pub mod types;
pub mod wallet;

pub use address::{Address, AddressError, Credential};
pub use assets::{AssetName, Assets, Unit};
pub use client::CardanoClient;
pub use codec::{CborCodec, CodecError, TxCodec};
pub use config::{BuilderSettings, Config};
pub use hash::{AuxiliaryDataHash, DatumHash, KeyHash, PolicyId, ScriptHash, TxHash};
pub use metadata::{AuxiliaryData, Metadatum};
pub use provider::{Emulator, EmulatorAccount, Provider, ProviderError, ScriptEvaluator};
pub use transaction::{Anchor, Certificate, DRep, PoolId, Transaction, TransactionOutput, WitnessSet};
pub use tx_builder::{
    ChainResult, CompleteOptions, OutputData, RedeemerBuilder, RedeemerSpec, SignError, SubmitError,
    TxBuilder, TxBuilderError, TxSignBuilder, TxSigned,
};
pub use types::{
    ExUnits, NativeScript, Network, OutRef, PlutusData, ProtocolParameters, Rational, RedeemerTag,
    Script, ScriptType, SlotConfig, Utxo,
};
pub use wallet::{ExternalWallet, KeyWallet, Wallet, WalletError};
