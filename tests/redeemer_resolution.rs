//! Redeemer pointers and position-dependent redeemer data
mod common;

use cardano_tx::{
    AssetName, Assets, CardanoClient, Emulator, OutputData, PlutusData, Provider, RedeemerBuilder,
    RedeemerTag, TxBuilderError, Utxo,
};
use common::*;
use std::sync::Arc;

async fn lock_outputs(emulator: &Arc<Emulator>, client: &CardanoClient, count: usize) -> Vec<Utxo> {
    let locker = script_address(&always_true_v3());
    let mut builder = client.new_tx();
    for i in 0..count {
        builder = builder
            .pay_to_contract(
                locker.clone(),
                OutputData::inline(PlutusData::integer(i as i128)),
                Assets::from_lovelace(5_000_000 + i as u64),
            )
            .unwrap();
    }
    builder
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap()
        .submit()
        .await
        .unwrap();
    emulator.await_block(1);
    emulator.get_utxos(&locker).await.unwrap()
}

#[tokio::test]
async fn test_self_index_redeemers_follow_sorted_inputs() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let locked = lock_outputs(&emulator, &client, 3).await;
    assert_eq!(locked.len(), 3);

    let tx = client
        .new_tx()
        .collect_from_with_redeemer(
            locked.clone(),
            RedeemerBuilder::self_index(|index| PlutusData::integer(index as i128)),
        )
        .unwrap()
        .attach_spending_validator(always_true_v3())
        .complete()
        .await
        .unwrap();

    let body = &tx.tx().body;
    let mut sorted = body.inputs.clone();
    sorted.sort();
    assert_eq!(body.inputs, sorted);

    let spends: Vec<_> = tx
        .tx()
        .witness_set
        .redeemers
        .iter()
        .filter(|r| r.tag == RedeemerTag::Spend)
        .collect();
    assert_eq!(spends.len(), 3);
    for redeemer in spends {
        let input = body.inputs[redeemer.index as usize];
        assert!(locked.iter().any(|u| u.out_ref == input));
        assert_eq!(redeemer.data, PlutusData::integer(redeemer.index as i128));
    }

    tx.sign_with_wallet().await.unwrap().complete().unwrap().submit().await.unwrap();
}

#[tokio::test]
async fn test_selected_builder_sees_input_positions() {
    let (emulator, client) = funded(&[60_000_000, 70_000_000]).await;
    let locked = lock_outputs(&emulator, &client, 2).await;
    let policy = always_true_v3();
    let name = AssetName::new(b"receipt".to_vec()).unwrap();

    let tx = client
        .new_tx()
        .collect_from_with_redeemer(locked.clone(), PlutusData::void())
        .unwrap()
        .mint_assets_with_redeemer(
            Assets::new().with_asset(policy.hash(), name, 1),
            RedeemerBuilder::selected(locked.clone(), |indices| {
                PlutusData::list(indices.iter().map(|i| PlutusData::integer(*i as i128)).collect())
            }),
        )
        .unwrap()
        .attach_script(policy)
        .complete()
        .await
        .unwrap();

    let body = &tx.tx().body;
    let expected: Vec<u64> = locked
        .iter()
        .map(|u| body.inputs.iter().position(|i| *i == u.out_ref).unwrap() as u64)
        .collect();

    let mint = tx
        .tx()
        .witness_set
        .redeemers
        .iter()
        .find(|r| r.tag == RedeemerTag::Mint)
        .unwrap();
    assert_eq!(mint.index, 0);
    assert_eq!(
        mint.data,
        PlutusData::list(expected.into_iter().map(|i| PlutusData::integer(i as i128)).collect())
    );
}

#[tokio::test]
async fn test_evaluated_budgets_are_written_back() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let locked = lock_outputs(&emulator, &client, 1).await;

    let tx = client
        .new_tx()
        .collect_from_with_redeemer(locked, PlutusData::void())
        .unwrap()
        .attach_spending_validator(always_true_v3())
        .complete()
        .await
        .unwrap();

    let redeemer = &tx.tx().witness_set.redeemers[0];
    assert_eq!(redeemer.ex_units.mem, 1_000_000);
    assert_eq!(redeemer.ex_units.steps, 500_000_000);
    let params = client.protocol_parameters();
    assert!(tx.fee() >= params.ex_units_fee(redeemer.ex_units));
}

#[tokio::test]
async fn test_two_self_index_redeemers_on_one_input() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let locked = lock_outputs(&emulator, &client, 1).await;
    let self_index = || RedeemerBuilder::self_index(|index| PlutusData::integer(index as i128));

    let result = client
        .new_tx()
        .collect_from_with_redeemer(locked.clone(), self_index())
        .unwrap()
        .collect_from_with_redeemer(locked, self_index())
        .unwrap()
        .attach_spending_validator(always_true_v3())
        .complete()
        .await;
    match result {
        Err(TxBuilderError::DuplicateRedeemer { tag, index }) => {
            assert_eq!(tag, RedeemerTag::Spend);
            assert_eq!(index, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected a duplicate redeemer"),
    }
}
