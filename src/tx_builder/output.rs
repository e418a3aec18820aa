//! Results of chained builds
//!
//! A chained build hands back, next to the signable transaction, the wallet
//! UTxO set as it will look once the transaction lands: the inputs it spends
//! are gone and the outputs paying back to the wallet are new UTxOs. Feeding
//! that set into the next session's `preset_wallet_inputs` builds a
//! dependent transaction without waiting for confirmation. `next_trace`
//! carries the session's correlation id into that next session.

use super::sign::TxSignBuilder;
use crate::address::Address;
use crate::hash::TxHash;
use crate::observability::TraceContext;
use crate::transaction::{DatumOption, Transaction};
use crate::types::{OutRef, Utxo};
use std::collections::BTreeSet;

pub struct ChainResult {
    /// Wallet UTxOs after the transaction is applied
    pub wallet_utxos: Vec<Utxo>,
    /// Every output of the transaction, as a UTxO
    pub derived_outputs: Vec<Utxo>,
    pub tx: TxSignBuilder,
    /// Hand to [`TxBuilder::with_trace`](super::TxBuilder::with_trace) for the dependent build
    pub next_trace: TraceContext,
}

impl std::fmt::Debug for ChainResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainResult")
            .field("wallet_utxos", &self.wallet_utxos.len())
            .field("derived_outputs", &self.derived_outputs.len())
            .field("tx_hash", &self.tx.to_hash())
            .field("correlation_id", self.next_trace.correlation_id())
            .finish()
    }
}

/// Outputs of `tx` as the UTxOs the ledger will create
pub fn derive_outputs(tx: &Transaction, tx_hash: TxHash) -> Vec<Utxo> {
    tx.body
        .outputs
        .iter()
        .enumerate()
        .map(|(index, output)| {
            let mut utxo = Utxo::new(
                OutRef::new(tx_hash, index as u64),
                output.address.clone(),
                output.value.clone(),
            );
            match &output.datum {
                Some(DatumOption::Hash(hash)) => utxo.datum_hash = Some(*hash),
                Some(DatumOption::Inline(datum)) => utxo.datum = Some(datum.clone()),
                None => {}
            }
            utxo.script_ref = output.script_ref.clone();
            utxo
        })
        .collect()
}

/// `wallet_utxos` minus what `tx` spends, plus its outputs to `wallet_address`
pub(crate) fn next_wallet_utxos(
    wallet_utxos: Vec<Utxo>,
    tx: &Transaction,
    derived: &[Utxo],
    wallet_address: &Address,
) -> Vec<Utxo> {
    let spent: BTreeSet<OutRef> = tx.body.inputs.iter().copied().collect();
    wallet_utxos
        .into_iter()
        .filter(|u| !spent.contains(&u.out_ref))
        .chain(derived.iter().filter(|u| &u.address == wallet_address).cloned())
        .collect()
}
