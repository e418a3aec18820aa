//! Chain-data provider and script-evaluator collaborators
//!
//! The builder only ever reaches the chain through these traits. Concrete
//! backends (HTTP indexers, node bridges) live outside this crate; the
//! in-memory [`Emulator`] ships here for tests and local development.

mod emulator;
mod errors;

pub use emulator::{Emulator, EmulatorAccount};
pub use errors::ProviderError;

use crate::address::Address;
use crate::assets::Unit;
use crate::hash::{DatumHash, TxHash};
use crate::types::{EvalRedeemer, OutRef, PlutusData, ProtocolParameters, SlotConfig, Utxo};
use async_trait::async_trait;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn get_protocol_parameters(&self) -> Result<ProtocolParameters, ProviderError>;

    async fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ProviderError>;

    async fn get_utxos_with_unit(
        &self,
        address: &Address,
        unit: &Unit,
    ) -> Result<Vec<Utxo>, ProviderError>;

    /// The single UTxO holding `unit` (NFT lookup)
    async fn get_utxo_by_unit(&self, unit: &Unit) -> Result<Utxo, ProviderError>;

    async fn get_utxos_by_out_ref(&self, out_refs: &[OutRef]) -> Result<Vec<Utxo>, ProviderError>;

    async fn get_datum(&self, hash: &DatumHash) -> Result<PlutusData, ProviderError>;

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxHash, ProviderError>;

    /// Execution units per redeemer; `additional_utxos` covers inputs the
    /// backend may not know about yet (chained transactions)
    async fn evaluate_tx(
        &self,
        tx_cbor: &[u8],
        additional_utxos: &[Utxo],
    ) -> Result<Vec<EvalRedeemer>, ProviderError>;

    /// Whether the transaction reached the ledger
    async fn await_tx(&self, tx_hash: &TxHash) -> Result<bool, ProviderError>;
}

/// Local UPLC engine, invoked as an opaque function
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        tx_cbor: &[u8],
        utxos: &[Utxo],
        params: &ProtocolParameters,
        slot_config: &SlotConfig,
    ) -> Result<Vec<EvalRedeemer>, ProviderError>;
}
