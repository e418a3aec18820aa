//! End-to-end build, sign and submit against the emulator

mod common;

use cardano_tx::{
    AssetName, Assets, CardanoClient, CborCodec, CompleteOptions, Metadatum, NativeScript, OutputData, PlutusData,
    Provider, TxCodec, Unit,
};
use common::*;

#[tokio::test]
async fn test_simple_payment_reaches_ledger() {
    let (emulator, client) = funded(&[100_000_000]).await;

    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(5_000_000))
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();
    let tx_hash = signed.submit().await.unwrap();
    assert_eq!(tx_hash, signed.to_hash());

    emulator.await_block(1);
    let received = emulator.get_utxos(&receiver()).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].assets.lovelace(), 5_000_000);
    assert!(emulator.await_tx(&tx_hash).await.unwrap());
}

#[tokio::test]
async fn test_value_is_conserved() {
    let (_emulator, client) = funded(&[20_000_000, 30_000_000]).await;

    let tx = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(25_000_000))
        .complete()
        .await
        .unwrap();
    let body = &tx.tx().body;

    let wallet_utxos = client.wallet().unwrap().get_utxos().await.unwrap();
    let consumed: i128 = wallet_utxos
        .iter()
        .filter(|u| body.inputs.contains(&u.out_ref))
        .map(|u| u.assets.lovelace())
        .sum();
    let produced: i128 = body.outputs.iter().map(|o| o.lovelace()).sum::<i128>() + body.fee as i128;
    assert_eq!(consumed, produced);
    assert_eq!(body.inputs.len(), 2);
    assert_eq!(body.outputs[0].address, receiver());
    assert_eq!(body.outputs[1].address, address_of(WALLET_KEY));
}

#[tokio::test]
async fn test_fee_covers_signed_size() {
    let (_emulator, client) = funded(&[100_000_000]).await;
    let params = client.protocol_parameters();

    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(2_000_000))
        .complete()
        .await
        .unwrap()
        .sign_with_private_key(WALLET_KEY)
        .unwrap()
        .complete()
        .unwrap();
    let size = signed.to_cbor().len();
    let fee = signed.tx().body.fee;
    assert!(fee >= params.min_fee(size, Default::default(), 0));
    assert!(fee < params.min_fee(size, Default::default(), 0) + 1_000);
}

async fn unsigned_cbor(client: &CardanoClient, lovelace: u64) -> Vec<u8> {
    client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(lovelace))
        .complete()
        .await
        .unwrap()
        .to_cbor()
        .unwrap()
}

#[tokio::test]
async fn test_identical_sessions_build_identical_transactions() {
    let (_emulator, client) = funded(&[40_000_000, 60_000_000]).await;

    let first = unsigned_cbor(&client, 7_000_000).await;
    let second = unsigned_cbor(&client, 7_000_000).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_encoding_round_trips_and_hash_is_stable() {
    let (_emulator, client) = funded(&[50_000_000]).await;
    let signed = client
        .new_tx()
        .pay_to_address_with_data(
            receiver(),
            OutputData::inline(PlutusData::constr(0, vec![PlutusData::integer(42)])),
            Assets::new(),
        )
        .unwrap()
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();

    let codec = CborCodec::new();
    let decoded = codec.decode_transaction(signed.to_cbor()).unwrap();
    assert_eq!(&decoded, signed.tx());
    assert_eq!(codec.hash_body(&decoded.body).unwrap(), signed.to_hash());
    assert_eq!(codec.encode_transaction(&decoded).unwrap(), signed.to_cbor());
}

#[tokio::test]
async fn test_zero_lovelace_output_gets_min_ada() {
    let (_emulator, client) = funded(&[50_000_000]).await;
    let params = client.protocol_parameters();

    let tx = client
        .new_tx()
        .pay_to_address(receiver(), Assets::new())
        .complete()
        .await
        .unwrap();
    let output = &tx.tx().body.outputs[0];
    let size = CborCodec::new().encode_output(output).unwrap().len();
    assert_eq!(output.lovelace(), params.min_ada_for_size(size) as i128);
}

#[tokio::test]
async fn test_native_mint_is_accepted() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let policy = NativeScript::Pubkey(key_hash_of(WALLET_KEY)).to_script();
    let name = AssetName::new(b"TOKEN".to_vec()).unwrap();
    let minted = Assets::new().with_asset(policy.hash(), name.clone(), 1_000);

    let signed = client
        .new_tx()
        .mint_assets(minted.clone())
        .unwrap()
        .attach_minting_policy(policy.clone())
        .pay_to_address(receiver(), minted)
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();
    assert_eq!(signed.tx().witness_set.native_scripts.len(), 1);
    signed.submit().await.unwrap();
    emulator.await_block(1);

    let unit = Unit::asset(policy.hash(), name);
    let received = emulator.get_utxos(&receiver()).await.unwrap();
    assert_eq!(received[0].assets.get(&unit), 1_000);
}

#[tokio::test]
async fn test_chained_transactions() {
    let (emulator, client) = funded(&[100_000_000]).await;

    let first = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(10_000_000))
        .chain()
        .await
        .unwrap();
    assert_eq!(first.derived_outputs.len(), 2);
    assert_eq!(first.wallet_utxos.len(), 1);
    assert_eq!(first.wallet_utxos[0].out_ref.tx_hash, first.tx.to_hash());

    let second = client
        .new_tx()
        .with_trace(first.next_trace.clone())
        .pay_to_address(receiver(), Assets::from_lovelace(10_000_000))
        .complete_with(CompleteOptions::default().with_preset_wallet_inputs(first.wallet_utxos.clone()))
        .await
        .unwrap();
    assert_eq!(second.tx().body.inputs, vec![first.wallet_utxos[0].out_ref]);

    // Dependent build is a new trace under the same correlation id
    let (first_trace, second_trace) = (first.tx.trace_context(), second.trace_context());
    assert_eq!(second_trace.correlation_id(), first_trace.correlation_id());
    assert_ne!(second_trace.trace_id(), first_trace.trace_id());

    first.tx.sign_with_wallet().await.unwrap().complete().unwrap().submit().await.unwrap();
    emulator.await_block(1);
    second.sign_with_wallet().await.unwrap().complete().unwrap().submit().await.unwrap();
    emulator.await_block(1);

    let received = emulator.get_utxos(&receiver()).await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_validity_interval_is_enforced_by_the_ledger() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let now = emulator.now();

    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(3_000_000))
        .valid_from(now + 100_000)
        .unwrap()
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();
    assert_eq!(signed.tx().body.validity_start, Some(emulator.current_slot() + 100));

    let err = signed.submit().await.unwrap_err();
    assert!(err.to_string().contains("OutsideValidityInterval"));
}

#[tokio::test]
async fn test_lock_then_spend_plutus_output() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let validator = always_true_v3();
    let locker = script_address(&validator);

    client
        .new_tx()
        .pay_to_contract(
            locker.clone(),
            OutputData::inline(PlutusData::integer(1)),
            Assets::from_lovelace(10_000_000),
        )
        .unwrap()
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

    let locked = emulator.get_utxos(&locker).await.unwrap();
    assert_eq!(locked.len(), 1);

    let unlock = client
        .new_tx()
        .collect_from_with_redeemer(locked.clone(), PlutusData::void())
        .unwrap()
        .attach_spending_validator(validator)
        .complete()
        .await
        .unwrap();
    let body = &unlock.tx().body;
    assert!(body.inputs.contains(&locked[0].out_ref));
    assert!(!body.collateral.is_empty());
    assert!(body.script_data_hash.is_some());
    assert_eq!(unlock.tx().witness_set.redeemers.len(), 1);

    let required = client.protocol_parameters().required_collateral(body.fee);
    assert!(body.total_collateral.unwrap() >= required);

    unlock.sign_with_wallet().await.unwrap().complete().unwrap().submit().await.unwrap();
    emulator.await_block(1);
    assert!(emulator.get_utxos(&locker).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fee_is_least_covering_when_change_straddles_width_boundary() {
    // Change lands right at 2^32, where one lovelace shifts it to a 9-byte uint
    let (_emulator, client) = funded(&[(1u64 << 32) + 2_000_000 + 165_689]).await;
    let params = client.protocol_parameters();

    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(2_000_000))
        .complete()
        .await
        .unwrap()
        .sign_with_private_key(WALLET_KEY)
        .unwrap()
        .complete()
        .unwrap();
    let body = &signed.tx().body;
    let min_fee = params.min_fee(signed.to_cbor().len(), Default::default(), 0);
    let change = body.outputs[1].lovelace();

    assert!(body.fee >= min_fee);
    assert!(body.fee - min_fee < 4 * params.min_fee_a);
    // Any cheaper fee would push the change over the boundary
    assert!(body.fee == min_fee || change == u32::MAX as i128, "fee={} min={}", body.fee, min_fee);
}

#[tokio::test]
async fn test_fee_equals_min_fee_for_signed_size() {
    let (_emulator, client) = funded(&[50_000_000, 7_000_000]).await;
    let params = client.protocol_parameters();

    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(30_000_000))
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();
    assert_eq!(
        signed.tx().body.fee,
        params.min_fee(signed.to_cbor().len(), Default::default(), 0)
    );
}

#[tokio::test]
async fn test_metadata_is_committed_and_paid_for() {
    let (emulator, client) = funded(&[50_000_000]).await;
    let params = client.protocol_parameters();
    let codec = CborCodec::new();

    let message = Metadatum::map([("msg", Metadatum::List(vec!["invoice 42".into(), "paid".into()]))]);
    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(5_000_000))
        .attach_metadata(674, message.clone())
        .unwrap()
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();

    let tx = signed.tx();
    let aux = tx.auxiliary_data.as_ref().expect("auxiliary data");
    assert_eq!(aux.metadata[&674], message);
    assert_eq!(tx.body.auxiliary_data_hash, Some(codec.hash_auxiliary_data(aux).unwrap()));
    assert!(tx.body.fee >= params.min_fee(signed.to_cbor().len(), Default::default(), 0));

    let decoded = codec.decode_transaction(signed.to_cbor()).unwrap();
    assert_eq!(decoded.auxiliary_data, tx.auxiliary_data);

    let hash = signed.submit().await.unwrap();
    emulator.await_block(1);
    assert!(emulator.await_tx(&hash).await.unwrap());
}

#[tokio::test]
async fn test_ledger_rejects_metadata_not_matching_its_hash() {
    let (emulator, client) = funded(&[50_000_000]).await;
    let codec = CborCodec::new();

    let signed = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(5_000_000))
        .attach_metadata(1, "original")
        .unwrap()
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap();

    let mut tampered = signed.tx().clone();
    if let Some(aux) = tampered.auxiliary_data.as_mut() {
        aux.metadata.insert(1, Metadatum::text("rewritten"));
    }
    let err = emulator
        .submit_tx(&codec.encode_transaction(&tampered).unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ConflictingMetadataHash"), "{err}");

    tampered.auxiliary_data = None;
    let err = emulator
        .submit_tx(&codec.encode_transaction(&tampered).unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("MissingTxMetadata"), "{err}");
}

#[tokio::test]
async fn test_later_metadata_for_a_label_wins() {
    let (_emulator, client) = funded(&[50_000_000]).await;

    let done = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(5_000_000))
        .attach_metadata(7, 1u64)
        .unwrap()
        .attach_metadata(7, 2u64)
        .unwrap()
        .attach_metadata(8, vec![0xca, 0xfe])
        .unwrap()
        .complete()
        .await
        .unwrap();

    let aux = done.tx().auxiliary_data.as_ref().expect("auxiliary data");
    assert_eq!(aux.metadata.len(), 2);
    assert_eq!(aux.metadata[&7], Metadatum::Int(2));
    assert_eq!(aux.metadata[&8], Metadatum::Bytes(vec![0xca, 0xfe]));
}
