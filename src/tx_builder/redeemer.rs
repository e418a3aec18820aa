//! Redeemer descriptions and their resolution against the final input order
//!
//! A redeemer is either known up front ([`RedeemerSpec::Data`]) or built
//! once the inputs are fixed ([`RedeemerBuilder`]). Resolution happens after
//! balancing: inputs are sorted by `(tx_hash, output_index)`, every pending
//! redeemer is mapped to its `(tag, index)` pointer and the builders run
//! exactly once per resolution.

use super::errors::TxBuilderError;
use crate::address::Address;
use crate::hash::PolicyId;
use crate::transaction::Redeemer;
use crate::types::{ExUnits, OutRef, PlutusData, RedeemerTag, Utxo};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub type SelectedFn = Arc<dyn Fn(&[u64]) -> PlutusData + Send + Sync>;
pub type SelfIndexFn = Arc<dyn Fn(u64) -> PlutusData + Send + Sync>;

/// Redeemer whose bytes depend on input positions
#[derive(Clone)]
pub enum RedeemerBuilder {
    /// Built from the sorted indices of a fixed set of inputs
    Selected { inputs: Vec<Utxo>, make: SelectedFn },
    /// Built from the index of the input that triggered the script
    SelfIndex { make: SelfIndexFn },
}

impl RedeemerBuilder {
    pub fn selected<F>(inputs: Vec<Utxo>, make: F) -> Self
    where
        F: Fn(&[u64]) -> PlutusData + Send + Sync + 'static,
    {
        Self::Selected {
            inputs,
            make: Arc::new(make),
        }
    }

    pub fn self_index<F>(make: F) -> Self
    where
        F: Fn(u64) -> PlutusData + Send + Sync + 'static,
    {
        Self::SelfIndex { make: Arc::new(make) }
    }
}

impl fmt::Debug for RedeemerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selected { inputs, .. } => f
                .debug_struct("Selected")
                .field("inputs", &inputs.iter().map(|u| u.out_ref).collect::<Vec<_>>())
                .finish_non_exhaustive(),
            Self::SelfIndex { .. } => f.debug_struct("SelfIndex").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RedeemerSpec {
    Data(PlutusData),
    Builder(RedeemerBuilder),
}

impl RedeemerSpec {
    pub(crate) fn is_self_index(&self) -> bool {
        matches!(self, Self::Builder(RedeemerBuilder::SelfIndex { .. }))
    }
}

impl From<PlutusData> for RedeemerSpec {
    fn from(data: PlutusData) -> Self {
        Self::Data(data)
    }
}

impl From<RedeemerBuilder> for RedeemerSpec {
    fn from(builder: RedeemerBuilder) -> Self {
        Self::Builder(builder)
    }
}

/// What a pending redeemer authorizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RedeemerPurpose {
    Spend(OutRef),
    Mint(PolicyId),
    /// Position in the certificate list
    Cert(usize),
    Reward(Address),
}

impl fmt::Display for RedeemerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spend(out_ref) => write!(f, "spending {}", out_ref),
            Self::Mint(policy) => write!(f, "minting policy {}", policy),
            Self::Cert(index) => write!(f, "certificate #{}", index),
            Self::Reward(address) => write!(f, "withdrawal from {}", address),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingRedeemer {
    pub purpose: RedeemerPurpose,
    pub spec: RedeemerSpec,
}

/// Everything the resolver needs to know about the fixed transaction shape
pub(crate) struct ResolutionShape<'a> {
    /// Sorted and de-duplicated
    pub inputs: &'a [OutRef],
    pub policies: &'a BTreeSet<PolicyId>,
    pub withdrawals: &'a BTreeMap<Address, u64>,
    pub certificate_count: usize,
}

fn sorted_index(inputs: &[OutRef], out_ref: &OutRef) -> Option<u64> {
    inputs.binary_search(out_ref).ok().map(|i| i as u64)
}

/// Resolve every pending redeemer into a witness-set redeemer, ordered by
/// `(tag, index)`; `ex_units` supplies budgets from a previous evaluation
pub(crate) fn resolve_redeemers(
    pending: &[PendingRedeemer],
    shape: &ResolutionShape<'_>,
    ex_units: &BTreeMap<(RedeemerTag, u64), ExUnits>,
) -> Result<Vec<Redeemer>, TxBuilderError> {
    let mut resolved: BTreeMap<(RedeemerTag, u64), PlutusData> = BTreeMap::new();

    for entry in pending {
        let (tag, index) = match &entry.purpose {
            RedeemerPurpose::Spend(out_ref) => {
                let index = sorted_index(shape.inputs, out_ref).ok_or_else(|| {
                    TxBuilderError::RedeemerIndexing(format!("input {} is not spent", out_ref))
                })?;
                (RedeemerTag::Spend, index)
            }
            RedeemerPurpose::Mint(policy) => {
                let index = shape
                    .policies
                    .iter()
                    .position(|p| p == policy)
                    .ok_or_else(|| {
                        TxBuilderError::RedeemerIndexing(format!("policy {} mints nothing", policy))
                    })?;
                (RedeemerTag::Mint, index as u64)
            }
            RedeemerPurpose::Cert(position) => {
                if *position >= shape.certificate_count {
                    return Err(TxBuilderError::RedeemerIndexing(format!(
                        "certificate #{} does not exist",
                        position
                    )));
                }
                (RedeemerTag::Cert, *position as u64)
            }
            RedeemerPurpose::Reward(address) => {
                let index = shape
                    .withdrawals
                    .keys()
                    .position(|a| a == address)
                    .ok_or_else(|| {
                        TxBuilderError::RedeemerIndexing(format!("no withdrawal from {}", address))
                    })?;
                (RedeemerTag::Reward, index as u64)
            }
        };

        let data = match &entry.spec {
            RedeemerSpec::Data(data) => data.clone(),
            RedeemerSpec::Builder(RedeemerBuilder::SelfIndex { make }) => match entry.purpose {
                RedeemerPurpose::Spend(_) => make(index),
                _ => {
                    return Err(TxBuilderError::InvalidRedeemerBuilder(format!(
                        "self-index redeemer used for {}",
                        entry.purpose
                    )))
                }
            },
            RedeemerSpec::Builder(RedeemerBuilder::Selected { inputs, make }) => {
                let indices = inputs
                    .iter()
                    .map(|utxo| {
                        sorted_index(shape.inputs, &utxo.out_ref).ok_or_else(|| {
                            TxBuilderError::RedeemerIndexing(format!(
                                "selected input {} is not spent",
                                utxo.out_ref
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                make(&indices)
            }
        };

        if resolved.insert((tag, index), data).is_some() {
            return Err(TxBuilderError::DuplicateRedeemer { tag, index });
        }
    }

    Ok(resolved
        .into_iter()
        .map(|((tag, index), data)| Redeemer {
            tag,
            index,
            data,
            ex_units: ex_units.get(&(tag, index)).copied().unwrap_or_default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Credential;
    use crate::assets::Assets;
    use crate::hash::{KeyHash, ScriptHash, TxHash};

    fn utxo(hash_byte: u8, index: u64) -> Utxo {
        Utxo::new(
            OutRef::new(TxHash::new([hash_byte; 32]), index),
            Address::enterprise(0, Credential::Script(ScriptHash::new([9; 28]))),
            Assets::from_lovelace(2_000_000),
        )
    }

    fn spend(u: &Utxo, spec: RedeemerSpec) -> PendingRedeemer {
        PendingRedeemer {
            purpose: RedeemerPurpose::Spend(u.out_ref),
            spec,
        }
    }

    fn shape<'a>(
        inputs: &'a [OutRef],
        policies: &'a BTreeSet<PolicyId>,
        withdrawals: &'a BTreeMap<Address, u64>,
    ) -> ResolutionShape<'a> {
        ResolutionShape {
            inputs,
            policies,
            withdrawals,
            certificate_count: 0,
        }
    }

    #[test]
    fn test_self_index_follows_sorted_order() {
        // Collected in order b, a; sorted order is a, b
        let a = utxo(1, 0);
        let b = utxo(2, 0);
        let builder = RedeemerBuilder::self_index(|i| PlutusData::integer(i as i128));
        let pending = vec![
            spend(&b, builder.clone().into()),
            spend(&a, builder.into()),
        ];
        let inputs = vec![a.out_ref, b.out_ref];
        let (policies, withdrawals) = (BTreeSet::new(), BTreeMap::new());

        let redeemers =
            resolve_redeemers(&pending, &shape(&inputs, &policies, &withdrawals), &BTreeMap::new()).unwrap();
        assert_eq!(redeemers.len(), 2);
        assert_eq!(redeemers[0].index, 0);
        assert_eq!(redeemers[0].data, PlutusData::integer(0));
        assert_eq!(redeemers[1].index, 1);
        assert_eq!(redeemers[1].data, PlutusData::integer(1));
    }

    #[test]
    fn test_selected_builder_receives_sorted_indices() {
        let a = utxo(1, 0);
        let b = utxo(1, 1);
        let c = utxo(3, 0);
        let builder = RedeemerBuilder::selected(vec![c.clone(), a.clone()], |indices| {
            PlutusData::list(indices.iter().map(|i| PlutusData::integer(*i as i128)).collect())
        });
        let pending = vec![spend(&c, builder.into())];
        let inputs = vec![a.out_ref, b.out_ref, c.out_ref];
        let (policies, withdrawals) = (BTreeSet::new(), BTreeMap::new());

        let redeemers =
            resolve_redeemers(&pending, &shape(&inputs, &policies, &withdrawals), &BTreeMap::new()).unwrap();
        assert_eq!(redeemers[0].index, 2);
        assert_eq!(
            redeemers[0].data,
            PlutusData::list(vec![PlutusData::integer(2), PlutusData::integer(0)])
        );
    }

    #[test]
    fn test_missing_input_is_indexing_error() {
        let a = utxo(1, 0);
        let pending = vec![spend(&a, PlutusData::void().into())];
        let (policies, withdrawals) = (BTreeSet::new(), BTreeMap::new());
        let err = resolve_redeemers(&pending, &shape(&[], &policies, &withdrawals), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, TxBuilderError::RedeemerIndexing(_)));
    }

    #[test]
    fn test_collision_is_duplicate_redeemer() {
        let a = utxo(1, 0);
        let pending = vec![
            spend(&a, PlutusData::void().into()),
            spend(&a, PlutusData::integer(1).into()),
        ];
        let inputs = vec![a.out_ref];
        let (policies, withdrawals) = (BTreeSet::new(), BTreeMap::new());
        let err = resolve_redeemers(&pending, &shape(&inputs, &policies, &withdrawals), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            TxBuilderError::DuplicateRedeemer {
                tag: RedeemerTag::Spend,
                index: 0
            }
        ));
    }

    #[test]
    fn test_mint_and_reward_indices_follow_sorted_keys() {
        let p1 = ScriptHash::new([1; 28]);
        let p2 = ScriptHash::new([2; 28]);
        let r1 = Address::reward(0, Credential::Script(ScriptHash::new([5; 28])));
        let r2 = Address::reward(0, Credential::Script(ScriptHash::new([6; 28])));
        let policies: BTreeSet<PolicyId> = [p1, p2].into_iter().collect();
        let withdrawals: BTreeMap<Address, u64> = [(r1.clone(), 0), (r2.clone(), 0)].into_iter().collect();
        let pending = vec![
            PendingRedeemer {
                purpose: RedeemerPurpose::Mint(p2),
                spec: PlutusData::void().into(),
            },
            PendingRedeemer {
                purpose: RedeemerPurpose::Reward(r2),
                spec: PlutusData::void().into(),
            },
        ];
        let mut ex_units = BTreeMap::new();
        ex_units.insert((RedeemerTag::Mint, 1), ExUnits::new(10, 20));

        let redeemers = resolve_redeemers(&pending, &shape(&[], &policies, &withdrawals), &ex_units).unwrap();
        assert_eq!((redeemers[0].tag, redeemers[0].index), (RedeemerTag::Mint, 1));
        assert_eq!(redeemers[0].ex_units, ExUnits::new(10, 20));
        assert_eq!((redeemers[1].tag, redeemers[1].index), (RedeemerTag::Reward, 1));
        assert_eq!(redeemers[1].ex_units, ExUnits::default());
    }

    #[test]
    fn test_script_withdrawal_precedes_key_withdrawal() {
        let by_key = Address::reward(0, Credential::Key(KeyHash::new([1; 28])));
        let by_script = Address::reward(0, Credential::Script(ScriptHash::new([0xf0; 28])));
        let policies = BTreeSet::new();
        let withdrawals: BTreeMap<Address, u64> = [(by_key, 1_000), (by_script.clone(), 2_000)].into_iter().collect();
        let pending = vec![PendingRedeemer {
            purpose: RedeemerPurpose::Reward(by_script),
            spec: PlutusData::void().into(),
        }];

        let redeemers = resolve_redeemers(&pending, &shape(&[], &policies, &withdrawals), &BTreeMap::new()).unwrap();
        assert_eq!((redeemers[0].tag, redeemers[0].index), (RedeemerTag::Reward, 0));
    }
}
