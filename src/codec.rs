//! Transaction serialization oracle
//!
//! The builder never touches bytes directly: sizes, hashes and wire forms all
//! go through a [`TxCodec`]. [`CborCodec`] is the reference implementation,
//! mapping the in-memory model onto the Conway CDDL with integer-keyed maps,
//! post-Alonzo output maps and the array form of redeemers.

use crate::address::{Address, Credential};
use crate::assets::{AssetName, Assets, Unit};
use crate::hash::{
    blake2b_256, AuxiliaryDataHash, DatumHash, KeyHash, PolicyId, ScriptDataHash, ScriptHash, TxHash,
};
use crate::metadata::{AuxiliaryData, Metadatum};
use crate::transaction::{
    Anchor, Certificate, DRep, DatumOption, Redeemer, Transaction, TransactionBody,
    TransactionOutput, VkeyWitness, WitnessSet,
};
use crate::types::{CostModels, ExUnits, OutRef, PlutusData, RedeemerTag, Script, ScriptType};
use serde_cbor::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("CBOR encoding failed: {0}")]
    Encode(String),

    #[error("CBOR decoding failed: {0}")]
    Decode(String),

    #[error("Malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Quantity {quantity} of {unit} does not fit the wire format")]
    InvalidQuantity { unit: String, quantity: i128 },
}

impl CodecError {
    fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

/// Canonical encode/decode and hashing for transactions
pub trait TxCodec: Send + Sync {
    fn encode_transaction(&self, tx: &Transaction) -> Result<Vec<u8>, CodecError>;

    fn decode_transaction(&self, bytes: &[u8]) -> Result<Transaction, CodecError>;

    fn encode_body(&self, body: &TransactionBody) -> Result<Vec<u8>, CodecError>;

    fn encode_output(&self, output: &TransactionOutput) -> Result<Vec<u8>, CodecError>;

    fn encode_auxiliary_data(&self, auxiliary_data: &AuxiliaryData) -> Result<Vec<u8>, CodecError>;

    /// Integrity hash binding redeemers, witness datums and cost models
    fn script_data_hash(
        &self,
        redeemers: &[Redeemer],
        datums: &[PlutusData],
        languages: &BTreeSet<ScriptType>,
        cost_models: &CostModels,
    ) -> Result<ScriptDataHash, CodecError>;

    fn hash_body(&self, body: &TransactionBody) -> Result<TxHash, CodecError> {
        Ok(TxHash::new(blake2b_256(&self.encode_body(body)?)))
    }

    fn hash_auxiliary_data(&self, auxiliary_data: &AuxiliaryData) -> Result<AuxiliaryDataHash, CodecError> {
        Ok(AuxiliaryDataHash::new(blake2b_256(
            &self.encode_auxiliary_data(auxiliary_data)?,
        )))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl CborCodec {
    pub fn new() -> Self {
        Self
    }
}

fn to_bytes(value: &Value) -> Result<Vec<u8>, CodecError> {
    serde_cbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

impl TxCodec for CborCodec {
    fn encode_transaction(&self, tx: &Transaction) -> Result<Vec<u8>, CodecError> {
        let value = Value::Array(vec![
            encode_body(&tx.body)?,
            encode_witness_set(&tx.witness_set)?,
            Value::Bool(tx.is_valid),
            match &tx.auxiliary_data {
                Some(auxiliary_data) => encode_auxiliary_data(auxiliary_data)?,
                None => Value::Null,
            },
        ]);
        to_bytes(&value)
    }

    fn decode_transaction(&self, bytes: &[u8]) -> Result<Transaction, CodecError> {
        let value: Value =
            serde_cbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        let items = array(&value, "transaction")?;
        if items.len() != 4 {
            return Err(CodecError::malformed(
                "transaction",
                format!("expected 4 elements, got {}", items.len()),
            ));
        }
        let is_valid = match &items[2] {
            Value::Bool(b) => *b,
            _ => return Err(CodecError::malformed("transaction", "is_valid must be a bool")),
        };
        let auxiliary_data = match &items[3] {
            Value::Null => None,
            other => Some(decode_auxiliary_data(other)?),
        };
        Ok(Transaction {
            body: decode_body(&items[0])?,
            witness_set: decode_witness_set(&items[1])?,
            is_valid,
            auxiliary_data,
        })
    }

    fn encode_body(&self, body: &TransactionBody) -> Result<Vec<u8>, CodecError> {
        to_bytes(&encode_body(body)?)
    }

    fn encode_output(&self, output: &TransactionOutput) -> Result<Vec<u8>, CodecError> {
        to_bytes(&encode_output(output)?)
    }

    fn encode_auxiliary_data(&self, auxiliary_data: &AuxiliaryData) -> Result<Vec<u8>, CodecError> {
        to_bytes(&encode_auxiliary_data(auxiliary_data)?)
    }

    fn script_data_hash(
        &self,
        redeemers: &[Redeemer],
        datums: &[PlutusData],
        languages: &BTreeSet<ScriptType>,
        cost_models: &CostModels,
    ) -> Result<ScriptDataHash, CodecError> {
        let mut preimage = Vec::new();
        if redeemers.is_empty() {
            // Datums without redeemers: empty redeemer map, empty language views
            preimage.push(0xa0);
            if !datums.is_empty() {
                preimage.extend(to_bytes(&plutus_data_list(datums))?);
            }
            preimage.push(0xa0);
        } else {
            preimage.extend(to_bytes(&Value::Array(
                redeemers.iter().map(encode_redeemer).collect(),
            ))?);
            if !datums.is_empty() {
                preimage.extend(to_bytes(&plutus_data_list(datums))?);
            }
            preimage.extend(language_views(languages, cost_models)?);
        }
        Ok(ScriptDataHash::new(blake2b_256(&preimage)))
    }
}

/// Language views in canonical key order: V2 (0x01), V3 (0x02), then V1,
/// whose key and value are double-wrapped bytes for historical reasons
fn language_views(
    languages: &BTreeSet<ScriptType>,
    cost_models: &CostModels,
) -> Result<Vec<u8>, CodecError> {
    let ordered: Vec<ScriptType> = [ScriptType::PlutusV2, ScriptType::PlutusV3, ScriptType::PlutusV1]
        .into_iter()
        .filter(|l| languages.contains(l))
        .collect();
    let mut out = vec![0xa0 | ordered.len() as u8];
    for language in ordered {
        let costs = cost_models.for_language(language);
        match language {
            ScriptType::PlutusV1 => {
                out.extend(to_bytes(&Value::Bytes(vec![0x00]))?);
                let mut list = vec![0x9f];
                for cost in costs {
                    list.extend(to_bytes(&Value::Integer(*cost as i128))?);
                }
                list.push(0xff);
                out.extend(to_bytes(&Value::Bytes(list))?);
            }
            ScriptType::PlutusV2 | ScriptType::PlutusV3 => {
                let key = if language == ScriptType::PlutusV2 { 1 } else { 2 };
                out.extend(to_bytes(&uint(key))?);
                out.extend(to_bytes(&Value::Array(
                    costs.iter().map(|c| Value::Integer(*c as i128)).collect(),
                ))?);
            }
            ScriptType::Native => {}
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Encoding

fn uint(n: u64) -> Value {
    Value::Integer(n as i128)
}

fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

fn keyed(entries: Vec<(u64, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (uint(k), v)).collect())
}

fn encode_out_ref(out_ref: &OutRef) -> Value {
    Value::Array(vec![
        bytes(out_ref.tx_hash.as_bytes()),
        uint(out_ref.output_index),
    ])
}

fn out_ref_list(refs: &[OutRef]) -> Value {
    Value::Array(refs.iter().map(encode_out_ref).collect())
}

fn quantity(unit: &Unit, qty: i128, signed: bool) -> Result<Value, CodecError> {
    let fits = if signed {
        i64::try_from(qty).is_ok()
    } else {
        u64::try_from(qty).is_ok()
    };
    if fits {
        Ok(Value::Integer(qty))
    } else {
        Err(CodecError::InvalidQuantity {
            unit: unit.to_string(),
            quantity: qty,
        })
    }
}

fn encode_multi_asset(assets: &Assets, signed: bool) -> Result<Value, CodecError> {
    let mut grouped: BTreeMap<PolicyId, BTreeMap<Value, Value>> = BTreeMap::new();
    for (unit, qty) in assets.iter() {
        if let Unit::Asset { policy, name } = unit {
            grouped
                .entry(*policy)
                .or_default()
                .insert(bytes(name.as_bytes()), quantity(unit, *qty, signed)?);
        }
    }
    Ok(Value::Map(
        grouped
            .into_iter()
            .map(|(policy, names)| (bytes(policy.as_bytes()), Value::Map(names)))
            .collect(),
    ))
}

fn encode_value(assets: &Assets) -> Result<Value, CodecError> {
    let coin = quantity(&Unit::Lovelace, assets.lovelace(), false)?;
    if assets.has_multi_assets() {
        Ok(Value::Array(vec![coin, encode_multi_asset(assets, false)?]))
    } else {
        Ok(coin)
    }
}

fn encode_script_ref(script: &Script) -> Result<Value, CodecError> {
    let inner = match script.script_type {
        ScriptType::Native => serde_cbor::from_slice::<Value>(&script.bytes)
            .map_err(|e| CodecError::malformed("native script", e.to_string()))?,
        _ => bytes(&script.bytes),
    };
    let wrapped = to_bytes(&Value::Array(vec![
        uint(script.script_type.hash_tag() as u64),
        inner,
    ]))?;
    Ok(Value::Tag(24, Box::new(Value::Bytes(wrapped))))
}

fn encode_output(output: &TransactionOutput) -> Result<Value, CodecError> {
    let mut entries = vec![
        (0, bytes(output.address.as_bytes())),
        (1, encode_value(&output.value)?),
    ];
    match &output.datum {
        Some(DatumOption::Hash(hash)) => {
            entries.push((2, Value::Array(vec![uint(0), bytes(hash.as_bytes())])));
        }
        Some(DatumOption::Inline(data)) => {
            let embedded = Value::Tag(24, Box::new(Value::Bytes(data.to_cbor())));
            entries.push((2, Value::Array(vec![uint(1), embedded])));
        }
        None => {}
    }
    if let Some(script) = &output.script_ref {
        entries.push((3, encode_script_ref(script)?));
    }
    Ok(keyed(entries))
}

fn encode_credential(cred: &Credential) -> Value {
    match cred {
        Credential::Key(hash) => Value::Array(vec![uint(0), bytes(hash.as_bytes())]),
        Credential::Script(hash) => Value::Array(vec![uint(1), bytes(hash.as_bytes())]),
    }
}

fn encode_drep(drep: &DRep) -> Value {
    match drep {
        DRep::Key(hash) => Value::Array(vec![uint(0), bytes(hash.as_bytes())]),
        DRep::Script(hash) => Value::Array(vec![uint(1), bytes(hash.as_bytes())]),
        DRep::AlwaysAbstain => Value::Array(vec![uint(2)]),
        DRep::AlwaysNoConfidence => Value::Array(vec![uint(3)]),
    }
}

fn encode_anchor(anchor: &Option<Anchor>) -> Value {
    match anchor {
        Some(anchor) => Value::Array(vec![
            Value::Text(anchor.url.clone()),
            bytes(&anchor.data_hash),
        ]),
        None => Value::Null,
    }
}

fn encode_certificate(cert: &Certificate) -> Value {
    let pool = |p: &KeyHash| bytes(p.as_bytes());
    let items = match cert {
        Certificate::StakeRegistration(c) => vec![uint(0), encode_credential(c)],
        Certificate::StakeDeregistration(c) => vec![uint(1), encode_credential(c)],
        Certificate::StakeDelegation { stake, pool: p } => {
            vec![uint(2), encode_credential(stake), pool(p)]
        }
        Certificate::VoteDelegation { stake, drep } => {
            vec![uint(9), encode_credential(stake), encode_drep(drep)]
        }
        Certificate::StakeVoteDelegation {
            stake,
            pool: p,
            drep,
        } => vec![uint(10), encode_credential(stake), pool(p), encode_drep(drep)],
        Certificate::StakeRegistrationDelegation {
            stake,
            pool: p,
            deposit,
        } => vec![uint(11), encode_credential(stake), pool(p), uint(*deposit)],
        Certificate::VoteRegistrationDelegation {
            stake,
            drep,
            deposit,
        } => vec![uint(12), encode_credential(stake), encode_drep(drep), uint(*deposit)],
        Certificate::StakeVoteRegistrationDelegation {
            stake,
            pool: p,
            drep,
            deposit,
        } => vec![
            uint(13),
            encode_credential(stake),
            pool(p),
            encode_drep(drep),
            uint(*deposit),
        ],
        Certificate::AuthCommitteeHot { cold, hot } => {
            vec![uint(14), encode_credential(cold), encode_credential(hot)]
        }
        Certificate::ResignCommitteeCold { cold, anchor } => {
            vec![uint(15), encode_credential(cold), encode_anchor(anchor)]
        }
        Certificate::DRepRegistration {
            drep,
            deposit,
            anchor,
        } => vec![
            uint(16),
            encode_credential(drep),
            uint(*deposit),
            encode_anchor(anchor),
        ],
        Certificate::DRepDeregistration { drep, refund } => {
            vec![uint(17), encode_credential(drep), uint(*refund)]
        }
        Certificate::DRepUpdate { drep, anchor } => {
            vec![uint(18), encode_credential(drep), encode_anchor(anchor)]
        }
    };
    Value::Array(items)
}

fn encode_body(body: &TransactionBody) -> Result<Value, CodecError> {
    let mut entries = vec![
        (0, out_ref_list(&body.inputs)),
        (
            1,
            Value::Array(
                body.outputs
                    .iter()
                    .map(encode_output)
                    .collect::<Result<_, _>>()?,
            ),
        ),
        (2, uint(body.fee)),
    ];
    if let Some(ttl) = body.ttl {
        entries.push((3, uint(ttl)));
    }
    if !body.certificates.is_empty() {
        entries.push((
            4,
            Value::Array(body.certificates.iter().map(encode_certificate).collect()),
        ));
    }
    if !body.withdrawals.is_empty() {
        entries.push((
            5,
            Value::Map(
                body.withdrawals
                    .iter()
                    .map(|(addr, amount)| (bytes(addr.as_bytes()), uint(*amount)))
                    .collect(),
            ),
        ));
    }
    if let Some(hash) = &body.auxiliary_data_hash {
        entries.push((7, bytes(hash.as_bytes())));
    }
    if let Some(start) = body.validity_start {
        entries.push((8, uint(start)));
    }
    if !body.mint.is_empty() {
        entries.push((9, encode_multi_asset(&body.mint, true)?));
    }
    if let Some(hash) = &body.script_data_hash {
        entries.push((11, bytes(hash.as_bytes())));
    }
    if !body.collateral.is_empty() {
        entries.push((13, out_ref_list(&body.collateral)));
    }
    if !body.required_signers.is_empty() {
        entries.push((
            14,
            Value::Array(
                body.required_signers
                    .iter()
                    .map(|k| bytes(k.as_bytes()))
                    .collect(),
            ),
        ));
    }
    if let Some(id) = body.network_id {
        entries.push((15, uint(id as u64)));
    }
    if let Some(output) = &body.collateral_return {
        entries.push((16, encode_output(output)?));
    }
    if let Some(total) = body.total_collateral {
        entries.push((17, uint(total)));
    }
    if !body.reference_inputs.is_empty() {
        entries.push((18, out_ref_list(&body.reference_inputs)));
    }
    Ok(keyed(entries))
}

fn metadatum_value(metadatum: &Metadatum) -> Value {
    match metadatum {
        Metadatum::Int(n) => Value::Integer(*n),
        Metadatum::Bytes(b) => bytes(b),
        Metadatum::Text(t) => Value::Text(t.clone()),
        Metadatum::List(items) => Value::Array(items.iter().map(metadatum_value).collect()),
        Metadatum::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (metadatum_value(k), metadatum_value(v)))
                .collect(),
        ),
    }
}

/// Shelley form: the bare label map
fn encode_auxiliary_data(auxiliary_data: &AuxiliaryData) -> Result<Value, CodecError> {
    let mut labels = BTreeMap::new();
    for (label, metadatum) in &auxiliary_data.metadata {
        metadatum
            .validate()
            .map_err(|e| CodecError::malformed("metadatum", e.to_string()))?;
        labels.insert(uint(*label), metadatum_value(metadatum));
    }
    Ok(Value::Map(labels))
}

fn plutus_data_list(datums: &[PlutusData]) -> Value {
    Value::Array(datums.iter().map(|d| d.as_value().clone()).collect())
}

fn encode_redeemer(redeemer: &Redeemer) -> Value {
    Value::Array(vec![
        uint(redeemer.tag.to_u8() as u64),
        uint(redeemer.index),
        redeemer.data.as_value().clone(),
        Value::Array(vec![uint(redeemer.ex_units.mem), uint(redeemer.ex_units.steps)]),
    ])
}

fn byte_list(items: &[Vec<u8>]) -> Value {
    Value::Array(items.iter().map(|b| bytes(b)).collect())
}

fn encode_witness_set(ws: &WitnessSet) -> Result<Value, CodecError> {
    let mut entries = Vec::new();
    if !ws.vkey_witnesses.is_empty() {
        entries.push((
            0,
            Value::Array(
                ws.vkey_witnesses
                    .iter()
                    .map(|w| Value::Array(vec![bytes(&w.vkey), bytes(&w.signature)]))
                    .collect(),
            ),
        ));
    }
    if !ws.native_scripts.is_empty() {
        let scripts = ws
            .native_scripts
            .iter()
            .map(|b| {
                serde_cbor::from_slice::<Value>(b)
                    .map_err(|e| CodecError::malformed("native script", e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        entries.push((1, Value::Array(scripts)));
    }
    if !ws.plutus_v1_scripts.is_empty() {
        entries.push((3, byte_list(&ws.plutus_v1_scripts)));
    }
    if !ws.plutus_data.is_empty() {
        entries.push((4, plutus_data_list(&ws.plutus_data)));
    }
    if !ws.redeemers.is_empty() {
        entries.push((5, Value::Array(ws.redeemers.iter().map(encode_redeemer).collect())));
    }
    if !ws.plutus_v2_scripts.is_empty() {
        entries.push((6, byte_list(&ws.plutus_v2_scripts)));
    }
    if !ws.plutus_v3_scripts.is_empty() {
        entries.push((7, byte_list(&ws.plutus_v3_scripts)));
    }
    Ok(keyed(entries))
}

// ---------------------------------------------------------------------------
// Decoding

/// Strip a set tag (258) if present
fn untag_set(value: &Value) -> &Value {
    match value {
        Value::Tag(258, inner) => inner,
        other => other,
    }
}

fn array<'a>(value: &'a Value, field: &'static str) -> Result<&'a Vec<Value>, CodecError> {
    match untag_set(value) {
        Value::Array(items) => Ok(items),
        _ => Err(CodecError::malformed(field, "expected array")),
    }
}

fn map<'a>(value: &'a Value, field: &'static str) -> Result<&'a BTreeMap<Value, Value>, CodecError> {
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(CodecError::malformed(field, "expected map")),
    }
}

fn as_u64(value: &Value, field: &'static str) -> Result<u64, CodecError> {
    match value {
        Value::Integer(n) => {
            u64::try_from(*n).map_err(|_| CodecError::malformed(field, "expected unsigned integer"))
        }
        _ => Err(CodecError::malformed(field, "expected unsigned integer")),
    }
}

fn as_int(value: &Value, field: &'static str) -> Result<i128, CodecError> {
    match value {
        Value::Integer(n) => Ok(*n),
        _ => Err(CodecError::malformed(field, "expected integer")),
    }
}

fn as_bytes<'a>(value: &'a Value, field: &'static str) -> Result<&'a [u8], CodecError> {
    match value {
        Value::Bytes(b) => Ok(b),
        _ => Err(CodecError::malformed(field, "expected bytes")),
    }
}

fn field<'a>(entries: &'a BTreeMap<Value, Value>, key: u64) -> Option<&'a Value> {
    entries.get(&uint(key))
}

fn fixed<T>(
    value: &Value,
    field: &'static str,
    parse: impl Fn(&[u8]) -> Option<T>,
) -> Result<T, CodecError> {
    parse(as_bytes(value, field)?).ok_or_else(|| CodecError::malformed(field, "wrong length"))
}

fn decode_out_ref(value: &Value) -> Result<OutRef, CodecError> {
    let items = array(value, "input")?;
    if items.len() != 2 {
        return Err(CodecError::malformed("input", "expected [tx_hash, index]"));
    }
    Ok(OutRef::new(
        fixed(&items[0], "input tx hash", TxHash::from_slice)?,
        as_u64(&items[1], "input index")?,
    ))
}

fn decode_out_refs(value: &Value) -> Result<Vec<OutRef>, CodecError> {
    array(value, "inputs")?.iter().map(decode_out_ref).collect()
}

fn decode_multi_asset(value: &Value, into: &mut Assets) -> Result<(), CodecError> {
    for (policy, names) in map(value, "multi-asset")? {
        let policy = fixed(policy, "policy id", ScriptHash::from_slice)?;
        for (name, qty) in map(names, "asset names")? {
            let name = AssetName::new(as_bytes(name, "asset name")?.to_vec())
                .map_err(|e| CodecError::malformed("asset name", e.to_string()))?;
            into.adjust(Unit::asset(policy, name), as_int(qty, "asset quantity")?);
        }
    }
    Ok(())
}

fn decode_value(value: &Value) -> Result<Assets, CodecError> {
    match value {
        Value::Integer(_) => Ok(Assets::from_lovelace(as_u64(value, "coin")?)),
        Value::Array(items) if items.len() == 2 => {
            let mut assets = Assets::from_lovelace(as_u64(&items[0], "coin")?);
            decode_multi_asset(&items[1], &mut assets)?;
            Ok(assets)
        }
        _ => Err(CodecError::malformed("value", "expected coin or [coin, multi-asset]")),
    }
}

fn decode_address(value: &Value) -> Result<Address, CodecError> {
    Address::from_bytes(as_bytes(value, "address")?.to_vec())
        .map_err(|e| CodecError::malformed("address", e.to_string()))
}

fn unwrap_tag24<'a>(value: &'a Value, field: &'static str) -> Result<&'a [u8], CodecError> {
    match value {
        Value::Tag(24, inner) => as_bytes(inner, field),
        _ => Err(CodecError::malformed(field, "expected tag 24 embedded CBOR")),
    }
}

fn decode_script_ref(value: &Value) -> Result<Script, CodecError> {
    let embedded: Value = serde_cbor::from_slice(unwrap_tag24(value, "script ref")?)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    let items = array(&embedded, "script ref")?;
    if items.len() != 2 {
        return Err(CodecError::malformed("script ref", "expected [language, script]"));
    }
    let script_type = match as_u64(&items[0], "script language")? {
        0 => ScriptType::Native,
        1 => ScriptType::PlutusV1,
        2 => ScriptType::PlutusV2,
        3 => ScriptType::PlutusV3,
        other => {
            return Err(CodecError::malformed(
                "script language",
                format!("unknown tag {}", other),
            ))
        }
    };
    let script_bytes = match script_type {
        ScriptType::Native => to_bytes(&items[1])?,
        _ => as_bytes(&items[1], "plutus script")?.to_vec(),
    };
    Ok(Script::new(script_type, script_bytes))
}

fn decode_datum_option(value: &Value) -> Result<DatumOption, CodecError> {
    let items = array(value, "datum option")?;
    match (items.first().map(|v| as_u64(v, "datum option")), items.len()) {
        (Some(Ok(0)), 2) => Ok(DatumOption::Hash(fixed(
            &items[1],
            "datum hash",
            DatumHash::from_slice,
        )?)),
        (Some(Ok(1)), 2) => {
            let data = PlutusData::from_cbor(unwrap_tag24(&items[1], "inline datum")?)
                .map_err(|e| CodecError::malformed("inline datum", e.to_string()))?;
            Ok(DatumOption::Inline(data))
        }
        _ => Err(CodecError::malformed("datum option", "unknown variant")),
    }
}

fn decode_output(value: &Value) -> Result<TransactionOutput, CodecError> {
    match value {
        Value::Map(entries) => {
            let address = decode_address(
                field(entries, 0).ok_or_else(|| CodecError::malformed("output", "missing address"))?,
            )?;
            let assets = decode_value(
                field(entries, 1).ok_or_else(|| CodecError::malformed("output", "missing value"))?,
            )?;
            Ok(TransactionOutput {
                address,
                value: assets,
                datum: field(entries, 2).map(decode_datum_option).transpose()?,
                script_ref: field(entries, 3).map(decode_script_ref).transpose()?,
            })
        }
        // Pre-Babbage array outputs
        Value::Array(items) if items.len() == 2 || items.len() == 3 => Ok(TransactionOutput {
            address: decode_address(&items[0])?,
            value: decode_value(&items[1])?,
            datum: items
                .get(2)
                .map(|v| fixed(v, "datum hash", DatumHash::from_slice).map(DatumOption::Hash))
                .transpose()?,
            script_ref: None,
        }),
        _ => Err(CodecError::malformed("output", "expected map or array")),
    }
}

fn decode_credential(value: &Value) -> Result<Credential, CodecError> {
    let items = array(value, "credential")?;
    if items.len() != 2 {
        return Err(CodecError::malformed("credential", "expected [kind, hash]"));
    }
    match as_u64(&items[0], "credential kind")? {
        0 => Ok(Credential::Key(fixed(&items[1], "key hash", KeyHash::from_slice)?)),
        1 => Ok(Credential::Script(fixed(
            &items[1],
            "script hash",
            ScriptHash::from_slice,
        )?)),
        _ => Err(CodecError::malformed("credential", "unknown kind")),
    }
}

fn decode_drep(value: &Value) -> Result<DRep, CodecError> {
    let items = array(value, "drep")?;
    match (items.first().map(|v| as_u64(v, "drep")), items.len()) {
        (Some(Ok(0)), 2) => Ok(DRep::Key(fixed(&items[1], "drep key", KeyHash::from_slice)?)),
        (Some(Ok(1)), 2) => Ok(DRep::Script(fixed(
            &items[1],
            "drep script",
            ScriptHash::from_slice,
        )?)),
        (Some(Ok(2)), 1) => Ok(DRep::AlwaysAbstain),
        (Some(Ok(3)), 1) => Ok(DRep::AlwaysNoConfidence),
        _ => Err(CodecError::malformed("drep", "unknown variant")),
    }
}

fn decode_anchor(value: &Value) -> Result<Option<Anchor>, CodecError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) if items.len() == 2 => {
            let url = match &items[0] {
                Value::Text(url) => url.clone(),
                _ => return Err(CodecError::malformed("anchor", "url must be text")),
            };
            let data_hash = fixed(&items[1], "anchor hash", |b| <[u8; 32]>::try_from(b).ok())?;
            Ok(Some(Anchor { url, data_hash }))
        }
        _ => Err(CodecError::malformed("anchor", "expected null or [url, hash]")),
    }
}

fn decode_certificate(value: &Value) -> Result<Certificate, CodecError> {
    let items = array(value, "certificate")?;
    let tag = as_u64(
        items
            .first()
            .ok_or_else(|| CodecError::malformed("certificate", "empty"))?,
        "certificate tag",
    )?;
    let arg = |i: usize| {
        items
            .get(i)
            .ok_or_else(|| CodecError::malformed("certificate", format!("missing field {}", i)))
    };
    let pool = |i: usize| -> Result<KeyHash, CodecError> { fixed(arg(i)?, "pool id", KeyHash::from_slice) };
    let cert = match tag {
        0 => Certificate::StakeRegistration(decode_credential(arg(1)?)?),
        1 => Certificate::StakeDeregistration(decode_credential(arg(1)?)?),
        2 => Certificate::StakeDelegation {
            stake: decode_credential(arg(1)?)?,
            pool: pool(2)?,
        },
        9 => Certificate::VoteDelegation {
            stake: decode_credential(arg(1)?)?,
            drep: decode_drep(arg(2)?)?,
        },
        10 => Certificate::StakeVoteDelegation {
            stake: decode_credential(arg(1)?)?,
            pool: pool(2)?,
            drep: decode_drep(arg(3)?)?,
        },
        11 => Certificate::StakeRegistrationDelegation {
            stake: decode_credential(arg(1)?)?,
            pool: pool(2)?,
            deposit: as_u64(arg(3)?, "deposit")?,
        },
        12 => Certificate::VoteRegistrationDelegation {
            stake: decode_credential(arg(1)?)?,
            drep: decode_drep(arg(2)?)?,
            deposit: as_u64(arg(3)?, "deposit")?,
        },
        13 => Certificate::StakeVoteRegistrationDelegation {
            stake: decode_credential(arg(1)?)?,
            pool: pool(2)?,
            drep: decode_drep(arg(3)?)?,
            deposit: as_u64(arg(4)?, "deposit")?,
        },
        14 => Certificate::AuthCommitteeHot {
            cold: decode_credential(arg(1)?)?,
            hot: decode_credential(arg(2)?)?,
        },
        15 => Certificate::ResignCommitteeCold {
            cold: decode_credential(arg(1)?)?,
            anchor: decode_anchor(arg(2)?)?,
        },
        16 => Certificate::DRepRegistration {
            drep: decode_credential(arg(1)?)?,
            deposit: as_u64(arg(2)?, "deposit")?,
            anchor: decode_anchor(arg(3)?)?,
        },
        17 => Certificate::DRepDeregistration {
            drep: decode_credential(arg(1)?)?,
            refund: as_u64(arg(2)?, "refund")?,
        },
        18 => Certificate::DRepUpdate {
            drep: decode_credential(arg(1)?)?,
            anchor: decode_anchor(arg(2)?)?,
        },
        other => {
            return Err(CodecError::malformed(
                "certificate",
                format!("unsupported certificate tag {}", other),
            ))
        }
    };
    Ok(cert)
}

fn decode_body(value: &Value) -> Result<TransactionBody, CodecError> {
    let entries = map(value, "transaction body")?;
    let required = |key: u64, name: &'static str| {
        field(entries, key).ok_or_else(|| CodecError::malformed("transaction body", format!("missing {}", name)))
    };
    let mut body = TransactionBody {
        inputs: decode_out_refs(required(0, "inputs")?)?,
        outputs: array(required(1, "outputs")?, "outputs")?
            .iter()
            .map(decode_output)
            .collect::<Result<_, _>>()?,
        fee: as_u64(required(2, "fee")?, "fee")?,
        ..TransactionBody::default()
    };
    if let Some(v) = field(entries, 3) {
        body.ttl = Some(as_u64(v, "ttl")?);
    }
    if let Some(v) = field(entries, 4) {
        body.certificates = array(v, "certificates")?
            .iter()
            .map(decode_certificate)
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = field(entries, 5) {
        for (addr, amount) in map(v, "withdrawals")? {
            body.withdrawals
                .insert(decode_address(addr)?, as_u64(amount, "withdrawal")?);
        }
    }
    if let Some(v) = field(entries, 7) {
        body.auxiliary_data_hash = Some(fixed(v, "auxiliary data hash", AuxiliaryDataHash::from_slice)?);
    }
    if let Some(v) = field(entries, 8) {
        body.validity_start = Some(as_u64(v, "validity start")?);
    }
    if let Some(v) = field(entries, 9) {
        decode_multi_asset(v, &mut body.mint)?;
    }
    if let Some(v) = field(entries, 11) {
        body.script_data_hash = Some(fixed(v, "script data hash", ScriptDataHash::from_slice)?);
    }
    if let Some(v) = field(entries, 13) {
        body.collateral = decode_out_refs(v)?;
    }
    if let Some(v) = field(entries, 14) {
        body.required_signers = array(v, "required signers")?
            .iter()
            .map(|k| fixed(k, "required signer", KeyHash::from_slice))
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = field(entries, 15) {
        let id = as_u64(v, "network id")?;
        body.network_id =
            Some(u8::try_from(id).map_err(|_| CodecError::malformed("network id", "out of range"))?);
    }
    if let Some(v) = field(entries, 16) {
        body.collateral_return = Some(decode_output(v)?);
    }
    if let Some(v) = field(entries, 17) {
        body.total_collateral = Some(as_u64(v, "total collateral")?);
    }
    if let Some(v) = field(entries, 18) {
        body.reference_inputs = decode_out_refs(v)?;
    }
    Ok(body)
}

fn decode_metadatum(value: &Value) -> Result<Metadatum, CodecError> {
    Ok(match value {
        Value::Integer(n) => Metadatum::Int(*n),
        Value::Bytes(b) => Metadatum::Bytes(b.clone()),
        Value::Text(t) => Metadatum::Text(t.clone()),
        Value::Array(items) => Metadatum::List(items.iter().map(decode_metadatum).collect::<Result<_, _>>()?),
        Value::Map(entries) => Metadatum::Map(
            entries
                .iter()
                .map(|(k, v)| -> Result<(Metadatum, Metadatum), CodecError> {
                    Ok((decode_metadatum(k)?, decode_metadatum(v)?))
                })
                .collect::<Result<_, _>>()?,
        ),
        _ => return Err(CodecError::malformed("metadatum", "unsupported CBOR major type")),
    })
}

/// Accepts the Shelley label map, the Allegra `[metadata, scripts]` pair and
/// the Alonzo `#6.259({0: metadata})` form; only metadata is kept
fn decode_auxiliary_data(value: &Value) -> Result<AuxiliaryData, CodecError> {
    let labels = match value {
        Value::Map(_) => Some(value),
        Value::Array(items) => items.first(),
        Value::Tag(259, inner) => field(map(inner, "auxiliary data")?, 0),
        _ => return Err(CodecError::malformed("auxiliary data", "unknown form")),
    };
    let mut auxiliary_data = AuxiliaryData::default();
    if let Some(labels) = labels {
        for (label, metadatum) in map(labels, "metadata")? {
            auxiliary_data
                .metadata
                .insert(as_u64(label, "metadata label")?, decode_metadatum(metadatum)?);
        }
    }
    Ok(auxiliary_data)
}

fn decode_redeemer(value: &Value) -> Result<Redeemer, CodecError> {
    let items = array(value, "redeemer")?;
    if items.len() != 4 {
        return Err(CodecError::malformed("redeemer", "expected [tag, index, data, ex_units]"));
    }
    let tag = u8::try_from(as_u64(&items[0], "redeemer tag")?)
        .ok()
        .and_then(RedeemerTag::from_u8)
        .ok_or_else(|| CodecError::malformed("redeemer tag", "unknown tag"))?;
    let units = array(&items[3], "ex units")?;
    if units.len() != 2 {
        return Err(CodecError::malformed("ex units", "expected [mem, steps]"));
    }
    Ok(Redeemer {
        tag,
        index: as_u64(&items[1], "redeemer index")?,
        data: PlutusData::from_value(items[2].clone()),
        ex_units: ExUnits::new(as_u64(&units[0], "mem")?, as_u64(&units[1], "steps")?),
    })
}

fn decode_byte_list(value: &Value, name: &'static str) -> Result<Vec<Vec<u8>>, CodecError> {
    array(value, name)?
        .iter()
        .map(|b| as_bytes(b, name).map(|b| b.to_vec()))
        .collect()
}

fn decode_witness_set(value: &Value) -> Result<WitnessSet, CodecError> {
    let entries = map(value, "witness set")?;
    let mut ws = WitnessSet::default();
    if let Some(v) = field(entries, 0) {
        for item in array(v, "vkey witnesses")? {
            let pair = array(item, "vkey witness")?;
            if pair.len() != 2 {
                return Err(CodecError::malformed("vkey witness", "expected [vkey, signature]"));
            }
            ws.vkey_witnesses.push(VkeyWitness {
                vkey: fixed(&pair[0], "vkey", |b| <[u8; 32]>::try_from(b).ok())?,
                signature: fixed(&pair[1], "signature", |b| <[u8; 64]>::try_from(b).ok())?,
            });
        }
    }
    if let Some(v) = field(entries, 1) {
        ws.native_scripts = array(v, "native scripts")?
            .iter()
            .map(to_bytes)
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = field(entries, 3) {
        ws.plutus_v1_scripts = decode_byte_list(v, "plutus v1 scripts")?;
    }
    if let Some(v) = field(entries, 4) {
        ws.plutus_data = array(v, "plutus data")?
            .iter()
            .map(|d| PlutusData::from_value(d.clone()))
            .collect();
    }
    if let Some(v) = field(entries, 5) {
        ws.redeemers = array(v, "redeemers")?
            .iter()
            .map(decode_redeemer)
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = field(entries, 6) {
        ws.plutus_v2_scripts = decode_byte_list(v, "plutus v2 scripts")?;
    }
    if let Some(v) = field(entries, 7) {
        ws.plutus_v3_scripts = decode_byte_list(v, "plutus v3 scripts")?;
    }
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeScript;

    fn sample_tx() -> Transaction {
        let key = KeyHash::new([3; 28]);
        let policy = NativeScript::Pubkey(key).to_script();
        let token = Unit::asset(policy.hash(), AssetName::new(b"coin".to_vec()).unwrap());
        let owner = Address::enterprise(0, Credential::Key(key));
        let reward = Address::reward(0, Credential::Key(key));

        let mut withdrawals = BTreeMap::new();
        withdrawals.insert(reward, 10);

        let body = TransactionBody {
            inputs: vec![OutRef::new(TxHash::new([1; 32]), 0)],
            outputs: vec![
                TransactionOutput::new(owner.clone(), Assets::from_lovelace(2_000_000).with(token.clone(), 5)),
                TransactionOutput {
                    address: owner.clone(),
                    value: Assets::from_lovelace(1_500_000),
                    datum: Some(DatumOption::Inline(PlutusData::constr(1, vec![PlutusData::integer(42)]))),
                    script_ref: Some(Script::new(ScriptType::PlutusV2, vec![0x4d, 0x01, 0x00])),
                },
            ],
            fee: 180_000,
            ttl: Some(1_000),
            certificates: vec![Certificate::StakeDelegation {
                stake: Credential::Key(key),
                pool: KeyHash::new([9; 28]),
            }],
            withdrawals,
            validity_start: Some(10),
            mint: Assets::new().with(token, -5),
            required_signers: vec![key],
            ..TransactionBody::default()
        };
        let witness_set = WitnessSet {
            native_scripts: vec![policy.bytes.clone()],
            plutus_data: vec![PlutusData::bytes(vec![1, 2])],
            redeemers: vec![Redeemer {
                tag: RedeemerTag::Spend,
                index: 0,
                data: PlutusData::void(),
                ex_units: ExUnits::new(10, 20),
            }],
            ..WitnessSet::default()
        };
        Transaction::new(body, witness_set)
    }

    #[test]
    fn test_transaction_round_trip() {
        let codec = CborCodec::new();
        let tx = sample_tx();
        let bytes = codec.encode_transaction(&tx).unwrap();
        let decoded = codec.decode_transaction(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(codec.encode_transaction(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_body_hash_matches_embedded_body() {
        let codec = CborCodec::new();
        let tx = sample_tx();
        let decoded = codec
            .decode_transaction(&codec.encode_transaction(&tx).unwrap())
            .unwrap();
        assert_eq!(codec.hash_body(&decoded.body).unwrap(), codec.hash_body(&tx.body).unwrap());
    }

    #[test]
    fn test_negative_output_rejected() {
        let codec = CborCodec::new();
        let mut output = TransactionOutput::new(
            Address::enterprise(0, Credential::Key(KeyHash::new([1; 28]))),
            Assets::from_lovelace(1),
        );
        output.value.set_lovelace(-1);
        assert!(matches!(
            codec.encode_output(&output),
            Err(CodecError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_script_data_hash_depends_on_languages() {
        let codec = CborCodec::new();
        let redeemers = sample_tx().witness_set.redeemers;
        let costs = CostModels {
            plutus_v1: vec![1, 2],
            plutus_v2: vec![3],
            plutus_v3: vec![],
        };
        let v2: BTreeSet<_> = [ScriptType::PlutusV2].into_iter().collect();
        let v1: BTreeSet<_> = [ScriptType::PlutusV1].into_iter().collect();
        let a = codec.script_data_hash(&redeemers, &[], &v2, &costs).unwrap();
        let b = codec.script_data_hash(&redeemers, &[], &v1, &costs).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, codec.script_data_hash(&redeemers, &[], &v2, &costs).unwrap());
    }

    fn sample_metadata() -> AuxiliaryData {
        let mut metadata = BTreeMap::new();
        metadata.insert(674, Metadatum::map([("msg", Metadatum::List(vec!["hello".into()]))]));
        metadata.insert(1, Metadatum::List(vec![Metadatum::Int(-7), Metadatum::Bytes(vec![0xca, 0xfe])]));
        AuxiliaryData { metadata }
    }

    #[test]
    fn test_auxiliary_data_round_trip_and_hash() {
        let codec = CborCodec::new();
        let auxiliary_data = sample_metadata();
        let mut tx = sample_tx();
        tx.body.auxiliary_data_hash = Some(codec.hash_auxiliary_data(&auxiliary_data).unwrap());
        tx.auxiliary_data = Some(auxiliary_data.clone());

        let bytes = codec.encode_transaction(&tx).unwrap();
        let decoded = codec.decode_transaction(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(
            decoded.body.auxiliary_data_hash,
            Some(codec.hash_auxiliary_data(decoded.auxiliary_data.as_ref().unwrap()).unwrap())
        );
        assert!(bytes.len() > codec.encode_transaction(&sample_tx()).unwrap().len());
        assert_ne!(codec.hash_body(&tx.body).unwrap(), codec.hash_body(&sample_tx().body).unwrap());
    }

    #[test]
    fn test_tagged_auxiliary_data_decodes() {
        let labels = encode_auxiliary_data(&sample_metadata()).unwrap();
        let mut alonzo = BTreeMap::new();
        alonzo.insert(uint(0), labels.clone());
        let tagged = Value::Tag(259, Box::new(Value::Map(alonzo)));
        assert_eq!(decode_auxiliary_data(&tagged).unwrap(), sample_metadata());

        let allegra = Value::Array(vec![labels, Value::Array(vec![])]);
        assert_eq!(decode_auxiliary_data(&allegra).unwrap(), sample_metadata());
    }

    #[test]
    fn test_oversized_metadatum_is_not_encoded() {
        let mut metadata = BTreeMap::new();
        metadata.insert(0, Metadatum::text("x".repeat(65)));
        let codec = CborCodec::new();
        assert!(matches!(
            codec.encode_auxiliary_data(&AuxiliaryData { metadata }),
            Err(CodecError::Malformed { field: "metadatum", .. })
        ));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let codec = CborCodec::new();
        assert!(codec.decode_transaction(&[0xff, 0x00]).is_err());
        let not_a_tx = serde_cbor::to_vec(&Value::Integer(5)).unwrap();
        assert!(matches!(
            codec.decode_transaction(&not_a_tx),
            Err(CodecError::Malformed { .. })
        ));
    }
}
