//! Core domain types: networks, slots, scripts, datums, UTxOs and protocol parameters

use crate::address::Address;
use crate::assets::Assets;
use crate::hash::{blake2b_224, blake2b_256, DatumHash, KeyHash, ScriptHash, TxHash};
use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Chain the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Preprod,
    Preview,
    /// Local or private chain (emulator, devnet)
    Custom,
}

impl Network {
    pub fn network_id(&self) -> u8 {
        match self {
            Self::Mainnet => 1,
            _ => 0,
        }
    }

    /// Known slot configuration; custom chains start at unix epoch with 1s slots
    pub fn slot_config(&self) -> SlotConfig {
        match self {
            Self::Mainnet => SlotConfig {
                zero_time_ms: 1_596_059_091_000,
                zero_slot: 4_492_800,
                slot_length_ms: 1000,
            },
            Self::Preview => SlotConfig {
                zero_time_ms: 1_666_656_000_000,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
            Self::Preprod => SlotConfig {
                zero_time_ms: 1_655_769_600_000,
                zero_slot: 86_400,
                slot_length_ms: 1000,
            },
            Self::Custom => SlotConfig {
                zero_time_ms: 0,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "preprod" => Ok(Self::Preprod),
            "preview" => Ok(Self::Preview),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

/// Mapping between unix time and slots (Shelley-era linear schedule)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub zero_time_ms: u64,
    pub zero_slot: u64,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    /// `None` for times before the chain's zero time
    pub fn unix_time_to_slot(&self, unix_ms: u64) -> Option<u64> {
        let elapsed = unix_ms.checked_sub(self.zero_time_ms)?;
        Some(elapsed / self.slot_length_ms.max(1) + self.zero_slot)
    }

    pub fn slot_to_unix_time(&self, slot: u64) -> u64 {
        self.zero_time_ms + slot.saturating_sub(self.zero_slot) * self.slot_length_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    Native,
    PlutusV1,
    PlutusV2,
    PlutusV3,
}

impl ScriptType {
    /// Prefix byte mixed into the script hash
    pub fn hash_tag(&self) -> u8 {
        match self {
            Self::Native => 0,
            Self::PlutusV1 => 1,
            Self::PlutusV2 => 2,
            Self::PlutusV3 => 3,
        }
    }

    pub fn is_plutus(&self) -> bool {
        !matches!(self, Self::Native)
    }
}

/// Opaque script bytes tagged with their language.
///
/// Plutus scripts hold the flat-encoded program exactly as it sits inside
/// the witness-set byte string; native scripts hold their CBOR encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Script {
    pub script_type: ScriptType,
    pub bytes: Vec<u8>,
}

impl Script {
    pub fn new(script_type: ScriptType, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            script_type,
            bytes: bytes.into(),
        }
    }

    pub fn hash(&self) -> ScriptHash {
        let mut preimage = Vec::with_capacity(self.bytes.len() + 1);
        preimage.push(self.script_type.hash_tag());
        preimage.extend_from_slice(&self.bytes);
        ScriptHash::new(blake2b_224(&preimage))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Decode a native script; `None` for Plutus or malformed bytes
    pub fn native(&self) -> Option<NativeScript> {
        if self.script_type != ScriptType::Native {
            return None;
        }
        let value: Value = serde_cbor::from_slice(&self.bytes).ok()?;
        NativeScript::from_value(&value)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({:?}, {})", self.script_type, self.hash())
    }
}

/// Timelock / multisig script language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeScript {
    Pubkey(KeyHash),
    All(Vec<NativeScript>),
    Any(Vec<NativeScript>),
    AtLeast { required: u64, scripts: Vec<NativeScript> },
    InvalidBefore(u64),
    InvalidHereafter(u64),
}

impl NativeScript {
    pub fn to_value(&self) -> Value {
        let int = |n: u64| Value::Integer(n as i128);
        let list = |scripts: &[NativeScript]| Value::Array(scripts.iter().map(Self::to_value).collect());
        match self {
            Self::Pubkey(hash) => Value::Array(vec![int(0), Value::Bytes(hash.as_bytes().to_vec())]),
            Self::All(scripts) => Value::Array(vec![int(1), list(scripts)]),
            Self::Any(scripts) => Value::Array(vec![int(2), list(scripts)]),
            Self::AtLeast { required, scripts } => {
                Value::Array(vec![int(3), int(*required), list(scripts)])
            }
            Self::InvalidBefore(slot) => Value::Array(vec![int(4), int(*slot)]),
            Self::InvalidHereafter(slot) => Value::Array(vec![int(5), int(*slot)]),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let items = match value {
            Value::Array(items) => items,
            _ => return None,
        };
        let uint = |v: &Value| match v {
            Value::Integer(n) if *n >= 0 => u64::try_from(*n).ok(),
            _ => None,
        };
        let list = |v: &Value| match v {
            Value::Array(xs) => xs.iter().map(Self::from_value).collect::<Option<Vec<_>>>(),
            _ => None,
        };
        match (items.first().and_then(uint)?, items.len()) {
            (0, 2) => match &items[1] {
                Value::Bytes(b) => KeyHash::from_slice(b).map(Self::Pubkey),
                _ => None,
            },
            (1, 2) => list(&items[1]).map(Self::All),
            (2, 2) => list(&items[1]).map(Self::Any),
            (3, 3) => Some(Self::AtLeast {
                required: uint(&items[1])?,
                scripts: list(&items[2])?,
            }),
            (4, 2) => uint(&items[1]).map(Self::InvalidBefore),
            (5, 2) => uint(&items[1]).map(Self::InvalidHereafter),
            _ => None,
        }
    }

    pub fn to_script(&self) -> Script {
        // Encoding a Value tree into a Vec cannot fail
        let bytes = serde_cbor::to_vec(&self.to_value()).unwrap_or_default();
        Script::new(ScriptType::Native, bytes)
    }

    /// Every key hash mentioned anywhere in the script
    pub fn key_hashes(&self) -> Vec<KeyHash> {
        let mut out = Vec::new();
        self.collect_key_hashes(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_key_hashes(&self, out: &mut Vec<KeyHash>) {
        match self {
            Self::Pubkey(hash) => out.push(*hash),
            Self::All(scripts) | Self::Any(scripts) | Self::AtLeast { scripts, .. } => {
                for script in scripts {
                    script.collect_key_hashes(out);
                }
            }
            Self::InvalidBefore(_) | Self::InvalidHereafter(_) => {}
        }
    }

    /// Evaluate against the signing keys and validity interval of a transaction
    pub fn is_satisfied(
        &self,
        signers: &[KeyHash],
        valid_from: Option<u64>,
        valid_to: Option<u64>,
    ) -> bool {
        match self {
            Self::Pubkey(hash) => signers.contains(hash),
            Self::All(scripts) => scripts
                .iter()
                .all(|s| s.is_satisfied(signers, valid_from, valid_to)),
            Self::Any(scripts) => scripts
                .iter()
                .any(|s| s.is_satisfied(signers, valid_from, valid_to)),
            Self::AtLeast { required, scripts } => {
                scripts
                    .iter()
                    .filter(|s| s.is_satisfied(signers, valid_from, valid_to))
                    .count() as u64
                    >= *required
            }
            Self::InvalidBefore(slot) => valid_from.is_some_and(|from| from >= *slot),
            Self::InvalidHereafter(slot) => valid_to.is_some_and(|to| to <= *slot),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid Plutus data: {0}")]
pub struct PlutusDataError(pub String);

/// Plutus data as a CBOR value tree.
///
/// Bytes and hashes are always derived from the tree's canonical encoding,
/// so a datum hashes the same whether it sits in an output, in the witness
/// set or in a decoded transaction.
#[derive(Clone, PartialEq, Eq)]
pub struct PlutusData(Value);

impl PlutusData {
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, PlutusDataError> {
        serde_cbor::from_slice(bytes)
            .map(Self)
            .map_err(|e| PlutusDataError(e.to_string()))
    }

    pub fn from_cbor_hex(s: &str) -> Result<Self, PlutusDataError> {
        let bytes = hex::decode(s).map_err(|e| PlutusDataError(e.to_string()))?;
        Self::from_cbor(&bytes)
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        serde_cbor::to_vec(&self.0).unwrap_or_default()
    }

    pub fn hash(&self) -> DatumHash {
        DatumHash::new(blake2b_256(&self.to_cbor()))
    }

    pub fn integer(n: i128) -> Self {
        Self(Value::Integer(n))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Self(Value::Bytes(b.into()))
    }

    pub fn list(items: Vec<PlutusData>) -> Self {
        Self(Value::Array(items.into_iter().map(|d| d.0).collect()))
    }

    pub fn map(entries: Vec<(PlutusData, PlutusData)>) -> Self {
        Self(Value::Map(entries.into_iter().map(|(k, v)| (k.0, v.0)).collect()))
    }

    /// Constructor application using the compact tags (121..=127, 1280..=1400)
    /// and the general form (tag 102) beyond them
    pub fn constr(index: u64, fields: Vec<PlutusData>) -> Self {
        let fields = Value::Array(fields.into_iter().map(|d| d.0).collect());
        let value = match index {
            0..=6 => Value::Tag(121 + index, Box::new(fields)),
            7..=127 => Value::Tag(1280 + index - 7, Box::new(fields)),
            _ => Value::Tag(
                102,
                Box::new(Value::Array(vec![Value::Integer(index as i128), fields])),
            ),
        };
        Self(value)
    }

    /// The unit value `Constr 0 []`
    pub fn void() -> Self {
        Self::constr(0, vec![])
    }
}

impl fmt::Debug for PlutusData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlutusData({})", hex::encode(self.to_cbor()))
    }
}

/// Output reference `(tx_hash, output_index)`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutRef {
    pub tx_hash: TxHash,
    pub output_index: u64,
}

impl OutRef {
    pub fn new(tx_hash: TxHash, output_index: u64) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }
}

/// Ledger canonical input order
impl Ord for OutRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tx_hash
            .cmp(&other.tx_hash)
            .then(self.output_index.cmp(&other.output_index))
    }
}

impl PartialOrd for OutRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.output_index)
    }
}

impl fmt::Debug for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutRef({})", self)
    }
}

/// An unspent output as observed on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub out_ref: OutRef,
    pub address: Address,
    pub assets: Assets,
    /// Set when the output commits to a datum by hash
    pub datum_hash: Option<DatumHash>,
    /// Inline datum, or the resolved preimage of `datum_hash`
    pub datum: Option<PlutusData>,
    pub script_ref: Option<Script>,
}

impl Utxo {
    pub fn new(out_ref: OutRef, address: Address, assets: Assets) -> Self {
        Self {
            out_ref,
            address,
            assets,
            datum_hash: None,
            datum: None,
            script_ref: None,
        }
    }

    pub fn with_datum_hash(mut self, hash: DatumHash) -> Self {
        self.datum_hash = Some(hash);
        self
    }

    pub fn with_inline_datum(mut self, datum: PlutusData) -> Self {
        self.datum = Some(datum);
        self
    }

    pub fn with_script_ref(mut self, script: Script) -> Self {
        self.script_ref = Some(script);
        self
    }

    pub fn has_inline_datum(&self) -> bool {
        self.datum.is_some() && self.datum_hash.is_none()
    }

    pub fn is_script_locked(&self) -> bool {
        self.address
            .payment_credential()
            .is_some_and(|cred| cred.is_script())
    }
}

/// Execution budget of one redeemer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }

    pub fn saturating_add(self, other: ExUnits) -> ExUnits {
        ExUnits {
            mem: self.mem.saturating_add(other.mem),
            steps: self.steps.saturating_add(other.steps),
        }
    }
}

/// Role a redeemer plays in the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RedeemerTag {
    Spend,
    Mint,
    Cert,
    Reward,
    Vote,
    Propose,
}

impl RedeemerTag {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Spend => 0,
            Self::Mint => 1,
            Self::Cert => 2,
            Self::Reward => 3,
            Self::Vote => 4,
            Self::Propose => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Spend,
            1 => Self::Mint,
            2 => Self::Cert,
            3 => Self::Reward,
            4 => Self::Vote,
            5 => Self::Propose,
            _ => return None,
        })
    }
}

impl fmt::Display for RedeemerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spend => "spend",
            Self::Mint => "mint",
            Self::Cert => "cert",
            Self::Reward => "reward",
            Self::Vote => "vote",
            Self::Propose => "propose",
        };
        f.write_str(name)
    }
}

/// Evaluator output for one redeemer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalRedeemer {
    pub tag: RedeemerTag,
    pub index: u64,
    pub ex_units: ExUnits,
}

/// Cost models per Plutus language, in ledger parameter order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostModels {
    #[serde(default)]
    pub plutus_v1: Vec<i64>,
    #[serde(default)]
    pub plutus_v2: Vec<i64>,
    #[serde(default)]
    pub plutus_v3: Vec<i64>,
}

impl CostModels {
    pub fn for_language(&self, language: ScriptType) -> &[i64] {
        match language {
            ScriptType::PlutusV1 => &self.plutus_v1,
            ScriptType::PlutusV2 => &self.plutus_v2,
            ScriptType::PlutusV3 => &self.plutus_v3,
            ScriptType::Native => &[],
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid rational {0:?}")]
pub struct RationalError(String);

/// Exact non-negative ratio, as the ledger prices execution units
///
/// Deserializes from `{"numerator", "denominator"}`, from `"577/10000"`, or
/// from a decimal number, which is read through its shortest decimal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, RationalError> {
        if denominator == 0 {
            return Err(RationalError(format!("{}/0", numerator)));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// `0.0577` -> 577/10000
    pub fn from_decimal(text: &str) -> Result<Self, RationalError> {
        let invalid = || RationalError(text.to_string());
        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.len() > 19 {
            return Err(invalid());
        }
        let digits = format!("{}{}", whole, fraction);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let numerator = digits.parse::<u64>().map_err(|_| invalid())?;
        let denominator = 10u64.checked_pow(fraction.len() as u32).ok_or_else(invalid)?;
        Self::new(numerator, denominator)
    }

    /// `ceil(self * quantity)`
    pub fn mul_ceil(&self, quantity: u64) -> u64 {
        (quantity as u128 * self.numerator as u128).div_ceil(self.denominator as u128) as u64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl<'de> Deserialize<'de> for Rational {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Ratio { numerator: u64, denominator: u64 },
            Integer(u64),
            Decimal(f64),
            Text(String),
        }

        let parsed = match Repr::deserialize(deserializer)? {
            Repr::Ratio {
                numerator,
                denominator,
            } => Rational::new(numerator, denominator),
            Repr::Integer(whole) => Rational::new(whole, 1),
            Repr::Decimal(value) if value.is_finite() && value >= 0.0 => Rational::from_decimal(&value.to_string()),
            Repr::Decimal(value) => Err(RationalError(value.to_string())),
            Repr::Text(text) => match text.split_once('/') {
                Some((n, d)) => match (n.trim().parse(), d.trim().parse()) {
                    (Ok(n), Ok(d)) => Rational::new(n, d),
                    _ => Err(RationalError(text.clone())),
                },
                None => Rational::from_decimal(text.trim()),
            },
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

/// Protocol parameters consumed by the builder.
///
/// The fee and min-ADA formulas live here so every caller prices a
/// transaction from the same parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub max_tx_size: u64,
    pub max_val_size: u64,
    pub key_deposit: u64,
    pub pool_deposit: u64,
    pub drep_deposit: u64,
    pub gov_action_deposit: u64,
    pub price_mem: Rational,
    pub price_step: Rational,
    pub max_tx_ex_mem: u64,
    pub max_tx_ex_steps: u64,
    pub coins_per_utxo_byte: u64,
    pub collateral_percentage: u64,
    pub max_collateral_inputs: u64,
    pub min_fee_ref_script_cost_per_byte: u64,
    #[serde(default)]
    pub cost_models: CostModels,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            max_tx_size: 16_384,
            max_val_size: 5_000,
            key_deposit: 2_000_000,
            pool_deposit: 500_000_000,
            drep_deposit: 500_000_000,
            gov_action_deposit: 100_000_000_000,
            price_mem: Rational {
                numerator: 577,
                denominator: 10_000,
            },
            price_step: Rational {
                numerator: 721,
                denominator: 10_000_000,
            },
            max_tx_ex_mem: 14_000_000,
            max_tx_ex_steps: 10_000_000_000,
            coins_per_utxo_byte: 4_310,
            collateral_percentage: 150,
            max_collateral_inputs: 3,
            min_fee_ref_script_cost_per_byte: 15,
            cost_models: CostModels::default(),
        }
    }
}

/// Constant overhead the ledger adds to every output when sizing min-ADA
pub const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// Reference-script pricing grows by 6/5 every 25 KiB
const REF_SCRIPT_TIER_BYTES: u64 = 25_600;
const REF_SCRIPT_TIER_GROWTH: (u128, u128) = (6, 5);

impl ProtocolParameters {
    /// Minimum lovelace an output of `output_size` serialized bytes must hold
    pub fn min_ada_for_size(&self, output_size: usize) -> u64 {
        (UTXO_ENTRY_OVERHEAD + output_size as u64) * self.coins_per_utxo_byte
    }

    /// Fee owed for execution budgets, `ceil(price_mem * mem + price_step * steps)`
    pub fn ex_units_fee(&self, ex_units: ExUnits) -> u64 {
        let (mem, step) = (self.price_mem, self.price_step);
        let numerator = ex_units.mem as u128 * mem.numerator as u128 * step.denominator as u128
            + ex_units.steps as u128 * step.numerator as u128 * mem.denominator as u128;
        let denominator = mem.denominator as u128 * step.denominator as u128;
        numerator.div_ceil(denominator) as u64
    }

    /// Tiered fee for reference scripts touched by a transaction, rounded down
    pub fn ref_script_fee(&self, ref_script_bytes: u64) -> u64 {
        let (grow, shrink) = REF_SCRIPT_TIER_GROWTH;
        // price = price_numerator / denominator; total shares the denominator
        let mut price_numerator = self.min_fee_ref_script_cost_per_byte as u128;
        let mut denominator: u128 = 1;
        let mut total: u128 = 0;
        let mut remaining = ref_script_bytes;
        while remaining >= REF_SCRIPT_TIER_BYTES {
            total += REF_SCRIPT_TIER_BYTES as u128 * price_numerator;
            remaining -= REF_SCRIPT_TIER_BYTES;
            total *= shrink;
            price_numerator *= grow;
            denominator *= shrink;
        }
        total += remaining as u128 * price_numerator;
        (total / denominator) as u64
    }

    /// Minimum fee for a transaction of `tx_size` bytes
    pub fn min_fee(&self, tx_size: usize, ex_units: ExUnits, ref_script_bytes: u64) -> u64 {
        self.min_fee_a * tx_size as u64
            + self.min_fee_b
            + self.ex_units_fee(ex_units)
            + self.ref_script_fee(ref_script_bytes)
    }

    /// Collateral the ledger demands for a fee
    pub fn required_collateral(&self, fee: u64) -> u64 {
        (fee * self.collateral_percentage).div_ceil(100)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_conversion_round_trip() {
        let config = Network::Preprod.slot_config();
        let slot = config.unix_time_to_slot(1_655_769_600_000 + 5_500).unwrap();
        assert_eq!(slot, 86_405);
        assert_eq!(config.slot_to_unix_time(slot), 1_655_769_605_000);
        assert_eq!(config.unix_time_to_slot(0), None);
    }

    #[test]
    fn test_out_ref_ordering_is_hash_then_index() {
        let a = OutRef::new(TxHash::new([1; 32]), 9);
        let b = OutRef::new(TxHash::new([2; 32]), 0);
        let c = OutRef::new(TxHash::new([2; 32]), 1);
        let mut refs = vec![c, a, b];
        refs.sort();
        assert_eq!(refs, vec![a, b, c]);
    }

    #[test]
    fn test_script_hash_depends_on_language() {
        let v2 = Script::new(ScriptType::PlutusV2, vec![1, 2, 3]);
        let v3 = Script::new(ScriptType::PlutusV3, vec![1, 2, 3]);
        assert_ne!(v2.hash(), v3.hash());
    }

    #[test]
    fn test_native_script_round_trip_and_keys() {
        let k1 = KeyHash::new([1; 28]);
        let k2 = KeyHash::new([2; 28]);
        let native = NativeScript::AtLeast {
            required: 1,
            scripts: vec![NativeScript::Pubkey(k2), NativeScript::Pubkey(k1)],
        };
        let script = native.to_script();
        assert_eq!(script.native(), Some(native.clone()));
        assert_eq!(native.key_hashes(), vec![k1, k2]);
        assert!(native.is_satisfied(&[k2], None, None));
        assert!(!native.is_satisfied(&[], None, None));
    }

    #[test]
    fn test_timelock_evaluation() {
        let lock = NativeScript::InvalidHereafter(100);
        assert!(lock.is_satisfied(&[], None, Some(50)));
        assert!(!lock.is_satisfied(&[], None, Some(150)));
        assert!(!lock.is_satisfied(&[], None, None));
    }

    #[test]
    fn test_plutus_data_constr_tags() {
        let zero = PlutusData::constr(0, vec![]);
        assert_eq!(zero.as_value(), &Value::Tag(121, Box::new(Value::Array(vec![]))));
        let eight = PlutusData::constr(8, vec![PlutusData::integer(1)]);
        assert!(matches!(eight.as_value(), Value::Tag(1281, _)));

        let decoded = PlutusData::from_cbor(&eight.to_cbor()).unwrap();
        assert_eq!(decoded, eight);
        assert_eq!(decoded.hash(), eight.hash());
    }

    #[test]
    fn test_min_fee_formula() {
        let params = ProtocolParameters::default();
        assert_eq!(params.min_fee(200, ExUnits::default(), 0), 44 * 200 + 155_381);
        // ceil(0.0577 * 1000 + 0.0000721 * 1_000_000) = ceil(57.7 + 72.1)
        assert_eq!(params.ex_units_fee(ExUnits::new(1_000, 1_000_000)), 130);
        assert_eq!(params.required_collateral(200_001), 300_002);
    }

    #[test]
    fn test_ref_script_fee_tiers() {
        let params = ProtocolParameters::default();
        assert_eq!(params.ref_script_fee(100), 1_500);
        // First tier at 15/byte, the next 100 bytes at 18/byte
        assert_eq!(params.ref_script_fee(25_700), 25_600 * 15 + 100 * 18);
        // Third tier at 15 * 36/25 = 21.6/byte, floored once at the end
        assert_eq!(params.ref_script_fee(51_205), 25_600 * 15 + 25_600 * 18 + 108);
    }

    #[test]
    fn test_ex_units_fee_is_exact() {
        let params = ProtocolParameters::default();
        // 403.9 + 72.1 is exactly 476; in f64 the sum rounds up past it
        assert_eq!(params.ex_units_fee(ExUnits::new(7_000, 1_000_000)), 476);
        assert_eq!(params.ex_units_fee(ExUnits::new(10_000, 0)), 577);
        assert_eq!(params.ex_units_fee(ExUnits::new(10_001, 0)), 578);
        assert_eq!(params.ex_units_fee(ExUnits::new(0, 10_000_000)), 721);
        assert_eq!(params.ex_units_fee(ExUnits::new(14_000_000, 10_000_000_000)), 807_800 + 721_000);
    }

    #[test]
    fn test_rational_prices_deserialize_from_any_form() {
        let from_decimal: Rational = serde_json::from_str("0.0000721").unwrap();
        assert_eq!(from_decimal, Rational::new(721, 10_000_000).unwrap());
        let from_text: Rational = serde_json::from_str("\"577/10000\"").unwrap();
        assert_eq!(from_text, Rational::new(577, 10_000).unwrap());
        let from_object: Rational = serde_json::from_str(r#"{"numerator": 1, "denominator": 3}"#).unwrap();
        assert_eq!(from_object.mul_ceil(10), 4);
        assert!(serde_json::from_str::<Rational>(r#"{"numerator": 1, "denominator": 0}"#).is_err());
        assert!(Rational::from_decimal("1e-5").is_err());

        let json = serde_json::to_string(&ProtocolParameters::default()).unwrap();
        assert_eq!(ProtocolParameters::from_json(&json).unwrap(), ProtocolParameters::default());
    }
}
