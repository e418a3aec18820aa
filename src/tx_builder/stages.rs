//! Stage operations: read, collect, pay, mint, metadata, interval and signers
//!
//! Each stage validates what it can from its arguments alone and either
//! records pure metadata on the context or enqueues a [`Program`] for the
//! work that needs protocol parameters, the provider, or the full set of
//! attached scripts.

use super::context::{BuilderContext, ContextSnapshot};
use super::errors::TxBuilderError;
use super::fee::ensure_min_ada;
use super::intent::{Mutation, Program};
use super::redeemer::RedeemerSpec;
use crate::address::{Address, Credential};
use crate::assets::Assets;
use crate::hash::DatumHash;
use crate::metadata::Metadatum;
use crate::transaction::{DatumOption, TransactionOutput};
use crate::types::{PlutusData, Script, SlotConfig, Utxo};

/// Datum and script reference options of a payment, as supplied
#[derive(Debug, Clone, Default)]
pub struct OutputData {
    pub hash: Option<DatumHash>,
    /// Datum to hash into the output and carry in the witness set
    pub as_hash: Option<PlutusData>,
    pub inline: Option<PlutusData>,
    pub script_ref: Option<Script>,
}

impl OutputData {
    pub fn hash(hash: DatumHash) -> Self {
        Self {
            hash: Some(hash),
            ..Self::default()
        }
    }

    pub fn as_hash(datum: PlutusData) -> Self {
        Self {
            as_hash: Some(datum),
            ..Self::default()
        }
    }

    pub fn inline(datum: PlutusData) -> Self {
        Self {
            inline: Some(datum),
            ..Self::default()
        }
    }

    pub fn with_script_ref(mut self, script: Script) -> Self {
        self.script_ref = Some(script);
        self
    }

    /// At most one datum form may be set
    pub fn datum(&self) -> Result<Option<OutputDatum>, TxBuilderError> {
        match (&self.hash, &self.as_hash, &self.inline) {
            (None, None, None) => Ok(None),
            (Some(hash), None, None) => Ok(Some(OutputDatum::Hash(*hash))),
            (None, Some(datum), None) => Ok(Some(OutputDatum::AsHash(datum.clone()))),
            (None, None, Some(datum)) => Ok(Some(OutputDatum::Inline(datum.clone()))),
            _ => Err(TxBuilderError::InvalidOutputDatum(
                "hash, as_hash and inline are mutually exclusive".to_string(),
            )),
        }
    }
}

/// Validated datum placement of an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDatum {
    Hash(DatumHash),
    AsHash(PlutusData),
    Inline(PlutusData),
}

pub(crate) fn read_from(ctx: &mut BuilderContext, utxos: Vec<Utxo>) {
    for utxo in utxos {
        ctx.add_reference_input(utxo);
    }
}

pub(crate) fn collect_from(
    ctx: &mut BuilderContext,
    utxos: Vec<Utxo>,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    if utxos.is_empty() {
        return Err(TxBuilderError::EmptyUtxos { stage: "collect_from" });
    }
    // Scripts carried by the inputs themselves witness their own spends
    for utxo in &utxos {
        if let Some(script) = &utxo.script_ref {
            ctx.register_reference_script(script.clone());
        }
    }
    ctx.enqueue(Program::new("collect_from", move |snapshot| async move {
        let mut mutations = Vec::with_capacity(utxos.len());
        for utxo in utxos {
            mutations.extend(resolve_spend(&snapshot, utxo, redeemer.clone()).await?);
        }
        Ok(mutations)
    }));
    Ok(())
}

async fn resolve_spend(
    snapshot: &ContextSnapshot,
    mut utxo: Utxo,
    redeemer: Option<RedeemerSpec>,
) -> Result<Vec<Mutation>, TxBuilderError> {
    let purpose = format!("spending {}", utxo.out_ref);
    let redeemer = match utxo.address.payment_credential() {
        Some(credential) => snapshot.witness_redeemer(&credential, redeemer, &purpose)?,
        None => None,
    };

    let mut mutations = Vec::new();
    if let (Some(_), Some(hash)) = (&redeemer, utxo.datum_hash) {
        let datum = match utxo.datum.clone() {
            Some(datum) => datum,
            None => snapshot
                .provider
                .get_datum(&hash)
                .await
                .map_err(|e| TxBuilderError::MissingDatum {
                    hash,
                    source: Some(e),
                })?,
        };
        if datum.hash() != hash {
            return Err(TxBuilderError::MissingDatum { hash, source: None });
        }
        utxo.datum = Some(datum.clone());
        mutations.push(Mutation::AddDatum(datum));
    }
    mutations.push(Mutation::AddInput { utxo, redeemer });
    Ok(mutations)
}

pub(crate) fn pay(
    ctx: &mut BuilderContext,
    address: Address,
    datum: Option<OutputDatum>,
    script_ref: Option<Script>,
    assets: Assets,
) {
    ctx.enqueue(Program::new("pay", move |snapshot| async move {
        if address.is_reward() {
            return Err(TxBuilderError::InvalidOutput(format!(
                "reward address {} cannot hold outputs",
                address
            )));
        }
        if !assets.is_non_negative() {
            return Err(TxBuilderError::InvalidOutput(format!("negative quantities in {}", assets)));
        }

        let mut mutations = Vec::with_capacity(2);
        let mut output = TransactionOutput::new(address, assets);
        output.script_ref = script_ref;
        output.datum = match datum {
            None => None,
            Some(OutputDatum::Hash(hash)) => Some(DatumOption::Hash(hash)),
            Some(OutputDatum::Inline(data)) => Some(DatumOption::Inline(data)),
            Some(OutputDatum::AsHash(data)) => {
                let hash = data.hash();
                mutations.push(Mutation::AddDatum(data));
                Some(DatumOption::Hash(hash))
            }
        };
        ensure_min_ada(snapshot.codec.as_ref(), &snapshot.params, &mut output)?;
        mutations.insert(0, Mutation::AddOutput(output));
        Ok(mutations)
    }));
}

pub(crate) fn mint_assets(
    ctx: &mut BuilderContext,
    assets: Assets,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    if assets.lovelace() != 0 {
        return Err(TxBuilderError::InvalidMint("lovelace cannot be minted".to_string()));
    }
    let policies = assets.policies();
    let policy = match policies.len() {
        0 => return Err(TxBuilderError::InvalidMint("no non-zero quantities to mint".to_string())),
        1 => policies.into_iter().next().ok_or_else(|| TxBuilderError::internal("policy set emptied"))?,
        count => return Err(TxBuilderError::MultiplePolicies { count }),
    };
    if redeemer.as_ref().is_some_and(RedeemerSpec::is_self_index) {
        return Err(TxBuilderError::InvalidRedeemerBuilder(
            "self-index redeemers are only valid when collecting inputs".to_string(),
        ));
    }

    ctx.enqueue(Program::new("mint_assets", move |snapshot| async move {
        let purpose = format!("minting policy {}", policy);
        let redeemer = snapshot.witness_redeemer(&Credential::Script(policy), redeemer, &purpose)?;
        Ok(vec![Mutation::AddMint {
            policy,
            assets,
            redeemer,
        }])
    }));
    Ok(())
}

/// Limits are checked here; the label is written when the queue drains
pub(crate) fn attach_metadata(
    ctx: &mut BuilderContext,
    label: u64,
    metadatum: Metadatum,
) -> Result<(), TxBuilderError> {
    metadatum
        .validate()
        .map_err(|source| TxBuilderError::InvalidMetadata { label, source })?;
    ctx.enqueue(Program::new("attach_metadata", move |_snapshot| async move {
        Ok(vec![Mutation::AddMetadata { label, metadatum }])
    }));
    Ok(())
}

fn to_slot(slot_config: &SlotConfig, unix_ms: u64) -> Result<u64, TxBuilderError> {
    slot_config.unix_time_to_slot(unix_ms).ok_or_else(|| {
        TxBuilderError::InvalidInterval(format!(
            "{} is before the chain start {}",
            unix_ms, slot_config.zero_time_ms
        ))
    })
}

pub(crate) fn valid_from(ctx: &mut BuilderContext, slot_config: &SlotConfig, unix_ms: u64) -> Result<(), TxBuilderError> {
    let slot = to_slot(slot_config, unix_ms)?;
    if ctx.valid_to.is_some_and(|to| to <= slot) {
        return Err(TxBuilderError::InvalidInterval(format!(
            "lower bound slot {} is not before upper bound",
            slot
        )));
    }
    ctx.set_valid_from(slot);
    Ok(())
}

pub(crate) fn valid_to(ctx: &mut BuilderContext, slot_config: &SlotConfig, unix_ms: u64) -> Result<(), TxBuilderError> {
    let slot = to_slot(slot_config, unix_ms)?;
    if ctx.valid_from.is_some_and(|from| slot <= from) {
        return Err(TxBuilderError::InvalidInterval(format!(
            "upper bound slot {} is not after lower bound",
            slot
        )));
    }
    ctx.set_valid_to(slot);
    Ok(())
}

/// Payment key of an address, or the stake key of a reward address
pub(crate) fn add_signer(ctx: &mut BuilderContext, address: &Address) -> Result<(), TxBuilderError> {
    let credential = if address.is_reward() {
        address.stake_credential()
    } else {
        address.payment_credential()
    };
    match credential {
        Some(Credential::Key(key_hash)) => {
            ctx.add_required_signer(key_hash);
            Ok(())
        }
        Some(Credential::Script(hash)) => Err(TxBuilderError::InvalidSigner(format!(
            "{} is controlled by script {}",
            address, hash
        ))),
        None => Err(TxBuilderError::InvalidSigner(format!(
            "{} carries no key credential",
            address
        ))),
    }
}
