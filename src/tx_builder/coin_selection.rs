//! Wallet input and collateral selection
//!
//! Candidates are ordered largest-lovelace first, ties broken by fewer
//! native assets, then by output reference so the choice is deterministic.
//! Selection is greedy: for every unit the balance still owes, take the
//! first candidate holding it.

use super::errors::TxBuilderError;
use crate::assets::{Assets, Unit};
use crate::types::Utxo;
use std::cmp::Reverse;

pub(crate) fn sort_candidates(utxos: &mut [Utxo]) {
    utxos.sort_by_key(|u| (Reverse(u.assets.lovelace()), u.assets.multi_asset_count(), u.out_ref));
}

/// Pick wallet inputs until `balance` (consumed - produced) owes nothing
/// and the resulting change can pay for its own min-ADA.
///
/// `min_change` prices the change output for a given change bag. A
/// pure-lovelace remainder below its min-ADA is only topped up while
/// candidates remain; otherwise it is left for the fee to absorb.
pub(crate) fn select_coins<F>(
    candidates: &[Utxo],
    balance: &Assets,
    mut min_change: F,
) -> Result<Vec<Utxo>, TxBuilderError>
where
    F: FnMut(&Assets) -> Result<u64, TxBuilderError>,
{
    let mut remaining: Vec<&Utxo> = candidates.iter().collect();
    let mut picked: Vec<Utxo> = Vec::new();
    let mut change = balance.clone();

    loop {
        let missing = change.negative_part();
        let mut lovelace_gap: i128 = 0;
        let mut soft = false;
        if missing.is_empty() && !change.is_empty() {
            let required = min_change(&change)? as i128;
            if change.lovelace() < required {
                lovelace_gap = required - change.lovelace();
                soft = !change.has_multi_assets();
            }
        }
        if missing.is_empty() && lovelace_gap == 0 {
            return Ok(picked);
        }

        let position = if missing.is_empty() {
            remaining.iter().position(|u| u.assets.lovelace() > 0)
        } else {
            remaining
                .iter()
                .position(|u| missing.units().any(|unit| u.assets.get(unit) > 0))
        };

        match position {
            Some(i) => {
                let utxo = remaining.remove(i);
                change.merge(&utxo.assets);
                picked.push(utxo.clone());
            }
            None if soft => return Ok(picked),
            None => {
                let mut shortfall = missing;
                shortfall.adjust(Unit::Lovelace, lovelace_gap);
                return Err(TxBuilderError::InsufficientFunds { shortfall });
            }
        }
    }
}

/// Collateral inputs, preferring pure-ADA UTxOs
#[derive(Debug, Clone)]
pub(crate) struct CollateralPlan {
    pub inputs: Vec<Utxo>,
    /// Everything the inputs hold beyond the posted lovelace
    pub returned: Assets,
    pub posted: u64,
}

/// Cover `target` lovelace with at most `max_inputs` UTxOs. The remainder
/// goes back through a collateral return when it can meet `min_return`;
/// a pure-ADA remainder that cannot is posted in full.
pub(crate) fn select_collateral<F>(
    candidates: &[Utxo],
    target: u64,
    max_inputs: u64,
    mut min_return: F,
) -> Result<CollateralPlan, TxBuilderError>
where
    F: FnMut(&Assets) -> Result<u64, TxBuilderError>,
{
    let mut ordered: Vec<Utxo> = candidates.to_vec();
    ordered.sort_by_key(|u| {
        (
            u.assets.has_multi_assets(),
            Reverse(u.assets.lovelace()),
            u.out_ref,
        )
    });

    let mut inputs: Vec<Utxo> = Vec::new();
    let mut held = Assets::new();
    for utxo in ordered.into_iter().take(max_inputs as usize) {
        held.merge(&utxo.assets);
        inputs.push(utxo);

        let lovelace = held.lovelace();
        if lovelace < target as i128 {
            continue;
        }
        let mut returned = held.clone();
        returned.set_lovelace(lovelace - target as i128);
        if returned.is_empty() {
            return Ok(CollateralPlan {
                inputs,
                returned,
                posted: target,
            });
        }
        if returned.lovelace() >= min_return(&returned)? as i128 {
            return Ok(CollateralPlan {
                inputs,
                returned,
                posted: target,
            });
        }
        if !returned.has_multi_assets() {
            return Ok(CollateralPlan {
                inputs,
                returned: Assets::new(),
                posted: lovelace as u64,
            });
        }
    }

    Err(TxBuilderError::MissingCollateral {
        required: target,
        available: held.lovelace().max(0) as u64,
        max_inputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, Credential};
    use crate::assets::AssetName;
    use crate::hash::{KeyHash, ScriptHash, TxHash};
    use crate::types::OutRef;

    fn utxo(byte: u8, assets: Assets) -> Utxo {
        Utxo::new(
            OutRef::new(TxHash::new([byte; 32]), 0),
            Address::enterprise(0, Credential::Key(KeyHash::new([1; 28]))),
            assets,
        )
    }

    fn token(qty: i128) -> Assets {
        Assets::new().with_asset(ScriptHash::new([5; 28]), AssetName::new(b"NFT".to_vec()).unwrap(), qty)
    }

    fn flat(_: &Assets) -> Result<u64, TxBuilderError> {
        Ok(1_000_000)
    }

    #[test]
    fn test_sort_largest_first_then_fewer_assets() {
        let mut utxos = vec![
            utxo(1, Assets::from_lovelace(5)),
            utxo(2, Assets::from_lovelace(9) + token(1)),
            utxo(3, Assets::from_lovelace(9)),
        ];
        sort_candidates(&mut utxos);
        let order: Vec<u8> = utxos.iter().map(|u| u.out_ref.tx_hash.as_bytes()[0]).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_selects_until_balanced() {
        let mut candidates = vec![
            utxo(1, Assets::from_lovelace(3_000_000)),
            utxo(2, Assets::from_lovelace(10_000_000)),
        ];
        sort_candidates(&mut candidates);
        let balance = -Assets::from_lovelace(4_000_000);
        let picked = select_coins(&candidates, &balance, flat).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].assets.lovelace(), 10_000_000);
    }

    #[test]
    fn test_required_token_picks_holder() {
        let mut candidates = vec![
            utxo(1, Assets::from_lovelace(50_000_000)),
            utxo(2, Assets::from_lovelace(2_000_000) + token(3)),
        ];
        sort_candidates(&mut candidates);
        let balance = -token(2) + Assets::from_lovelace(5_000_000);
        let picked = select_coins(&candidates, &balance, flat).unwrap();
        let unit = Unit::asset(ScriptHash::new([5; 28]), AssetName::new(b"NFT".to_vec()).unwrap());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].assets.get(&unit), 3);
    }

    #[test]
    fn test_shortfall_is_reported() {
        let candidates = vec![utxo(1, Assets::from_lovelace(1_000_000))];
        let balance = -Assets::from_lovelace(3_000_000);
        let err = select_coins(&candidates, &balance, flat).unwrap_err();
        match err {
            TxBuilderError::InsufficientFunds { shortfall } => {
                assert_eq!(shortfall.lovelace(), 2_000_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dust_change_without_candidates_is_accepted() {
        let balance = Assets::from_lovelace(10);
        assert!(select_coins(&[], &balance, flat).unwrap().is_empty());
    }

    #[test]
    fn test_collateral_prefers_pure_ada() {
        let candidates = vec![
            utxo(1, Assets::from_lovelace(20_000_000) + token(1)),
            utxo(2, Assets::from_lovelace(8_000_000)),
        ];
        let plan = select_collateral(&candidates, 5_000_000, 3, flat).unwrap();
        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(plan.inputs[0].assets.lovelace(), 8_000_000);
        assert_eq!(plan.posted, 5_000_000);
        assert_eq!(plan.returned.lovelace(), 3_000_000);
    }

    #[test]
    fn test_collateral_respects_input_limit() {
        let candidates = vec![
            utxo(1, Assets::from_lovelace(1_000_000)),
            utxo(2, Assets::from_lovelace(1_000_000)),
            utxo(3, Assets::from_lovelace(1_000_000)),
        ];
        let err = select_collateral(&candidates, 5_000_000, 2, flat).unwrap_err();
        assert!(matches!(
            err,
            TxBuilderError::MissingCollateral {
                required: 5_000_000,
                available: 2_000_000,
                max_inputs: 2
            }
        ));
    }
}
