//! Asset units and normalized asset bags

use crate::hash::PolicyId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Longest asset name the ledger accepts
pub const MAX_ASSET_NAME_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("Invalid asset unit '{0}'")]
    InvalidUnit(String),

    #[error("Asset name is {0} bytes, at most 32 allowed")]
    NameTooLong(usize),
}

/// Raw asset name bytes (0..=32)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AssetError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_ASSET_NAME_LEN {
            return Err(AssetError::NameTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, AssetError> {
        let bytes = hex::decode(s).map_err(|_| AssetError::InvalidUnit(s.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetName({})", self.to_hex())
    }
}

/// Either the base unit or a native token
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Unit {
    Lovelace,
    Asset { policy: PolicyId, name: AssetName },
}

impl Unit {
    pub fn asset(policy: PolicyId, name: AssetName) -> Self {
        Self::Asset { policy, name }
    }

    pub fn policy(&self) -> Option<&PolicyId> {
        match self {
            Self::Lovelace => None,
            Self::Asset { policy, .. } => Some(policy),
        }
    }

    pub fn is_lovelace(&self) -> bool {
        matches!(self, Self::Lovelace)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lovelace => f.write_str("lovelace"),
            Self::Asset { policy, name } => write!(f, "{}{}", policy, name.to_hex()),
        }
    }
}

/// `"lovelace"` or `policy_hex ++ asset_name_hex`
impl FromStr for Unit {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "lovelace" {
            return Ok(Self::Lovelace);
        }
        let policy_hex_len = PolicyId::LEN * 2;
        if s.len() < policy_hex_len || !s.is_char_boundary(policy_hex_len) {
            return Err(AssetError::InvalidUnit(s.to_string()));
        }
        let (policy, name) = s.split_at(policy_hex_len);
        let policy = policy
            .parse::<PolicyId>()
            .map_err(|_| AssetError::InvalidUnit(s.to_string()))?;
        Ok(Self::Asset {
            policy,
            name: AssetName::from_hex(name)?,
        })
    }
}

/// Quantities keyed by unit.
///
/// Zero quantities are never stored, so a bag holding `{unit: 0}` compares
/// equal to one without the unit. Quantities are signed because mint deltas
/// and intermediate balances can go negative; output values are checked to be
/// non-negative before they reach the wire.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Assets(BTreeMap<Unit, i128>);

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lovelace(lovelace: u64) -> Self {
        Self::new().with(Unit::Lovelace, lovelace as i128)
    }

    /// Builder-style [`adjust`](Self::adjust)
    pub fn with(mut self, unit: Unit, quantity: i128) -> Self {
        self.adjust(unit, quantity);
        self
    }

    pub fn with_asset(self, policy: PolicyId, name: AssetName, quantity: i128) -> Self {
        self.with(Unit::asset(policy, name), quantity)
    }

    /// Add `quantity` to `unit`, dropping the entry when it nets to zero
    pub fn adjust(&mut self, unit: Unit, quantity: i128) {
        if quantity == 0 {
            return;
        }
        let entry = self.0.entry(unit.clone()).or_insert(0);
        *entry += quantity;
        if *entry == 0 {
            self.0.remove(&unit);
        }
    }

    /// Replace the quantity held for `unit`
    pub fn set(&mut self, unit: Unit, quantity: i128) {
        if quantity == 0 {
            self.0.remove(&unit);
        } else {
            self.0.insert(unit, quantity);
        }
    }

    pub fn get(&self, unit: &Unit) -> i128 {
        self.0.get(unit).copied().unwrap_or(0)
    }

    pub fn lovelace(&self) -> i128 {
        self.get(&Unit::Lovelace)
    }

    pub fn set_lovelace(&mut self, lovelace: i128) {
        self.set(Unit::Lovelace, lovelace);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Unit, &i128)> {
        self.0.iter()
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.0.keys()
    }

    /// Native-token entries only
    pub fn multi_assets(&self) -> impl Iterator<Item = (&PolicyId, &AssetName, i128)> {
        self.0.iter().filter_map(|(unit, qty)| match unit {
            Unit::Lovelace => None,
            Unit::Asset { policy, name } => Some((policy, name, *qty)),
        })
    }

    pub fn has_multi_assets(&self) -> bool {
        self.0.keys().any(|u| !u.is_lovelace())
    }

    /// Number of native-token entries
    pub fn multi_asset_count(&self) -> usize {
        self.multi_assets().count()
    }

    pub fn policies(&self) -> BTreeSet<PolicyId> {
        self.multi_assets().map(|(policy, _, _)| *policy).collect()
    }

    /// No quantity is below zero
    pub fn is_non_negative(&self) -> bool {
        self.0.values().all(|q| *q >= 0)
    }

    /// Entries with positive quantity
    pub fn positive_part(&self) -> Assets {
        Assets(
            self.0
                .iter()
                .filter(|(_, q)| **q > 0)
                .map(|(u, q)| (u.clone(), *q))
                .collect(),
        )
    }

    /// Entries with negative quantity, negated
    pub fn negative_part(&self) -> Assets {
        (-self.clone()).positive_part()
    }

    pub fn merge(&mut self, other: &Assets) {
        for (unit, qty) in other.iter() {
            self.adjust(unit.clone(), *qty);
        }
    }

    /// Sum of many bags
    pub fn sum<'a>(bags: impl IntoIterator<Item = &'a Assets>) -> Assets {
        let mut total = Assets::new();
        for bag in bags {
            total.merge(bag);
        }
        total
    }
}

impl FromIterator<(Unit, i128)> for Assets {
    fn from_iter<T: IntoIterator<Item = (Unit, i128)>>(iter: T) -> Self {
        let mut assets = Assets::new();
        for (unit, qty) in iter {
            assets.adjust(unit, qty);
        }
        assets
    }
}

impl Add for Assets {
    type Output = Assets;

    fn add(mut self, rhs: Assets) -> Assets {
        self.merge(&rhs);
        self
    }
}

impl Add<&Assets> for &Assets {
    type Output = Assets;

    fn add(self, rhs: &Assets) -> Assets {
        let mut out = self.clone();
        out.merge(rhs);
        out
    }
}

impl Sub for Assets {
    type Output = Assets;

    fn sub(self, rhs: Assets) -> Assets {
        self + (-rhs)
    }
}

impl Sub<&Assets> for &Assets {
    type Output = Assets;

    fn sub(self, rhs: &Assets) -> Assets {
        self + &(-rhs.clone())
    }
}

impl Neg for Assets {
    type Output = Assets;

    fn neg(self) -> Assets {
        Assets(self.0.into_iter().map(|(u, q)| (u, -q)).collect())
    }
}

impl fmt::Debug for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (unit, qty)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", unit, qty)?;
        }
        f.write_str("}")
    }
}
