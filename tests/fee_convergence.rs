//! Property tests: the completed fee always covers the signed transaction
mod common;

use cardano_tx::{Address, AssetName, Assets, Credential, KeyHash, NativeScript};
use common::*;
use proptest::prelude::*;

fn receivers(count: usize) -> Vec<Address> {
    (0..count)
        .map(|i| Address::enterprise(0, Credential::Key(KeyHash::new([i as u8 + 1; 28]))))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_fee_covers_min_fee(
        payments in prop::collection::vec(1_000_000u64..20_000_000, 1..20),
        wallet in prop::collection::vec(50_000_000u64..200_000_000, 1..6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (fee, min_fee, outputs) = runtime.block_on(async {
            let (_emulator, client) = funded(&wallet).await;
            let params = client.protocol_parameters();

            let mut builder = client.new_tx();
            for (address, lovelace) in receivers(payments.len()).into_iter().zip(&payments) {
                builder = builder.pay_to_address(address, Assets::from_lovelace(*lovelace));
            }
            let signed = builder
                .complete()
                .await
                .unwrap()
                .sign_with_private_key(WALLET_KEY)
                .unwrap()
                .complete()
                .unwrap();

            let min_fee = params.min_fee(signed.to_cbor().len(), Default::default(), 0);
            (signed.tx().body.fee, min_fee, signed.tx().body.outputs.len())
        });

        prop_assert!(fee >= min_fee);
        prop_assert!(outputs >= payments.len());
    }

    #[test]
    fn prop_change_absorbs_the_remainder(
        payment in 2_000_000u64..40_000_000,
        wallet in 50_000_000u64..100_000_000,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (consumed, produced, fee) = runtime.block_on(async {
            let (_emulator, client) = funded(&[wallet]).await;
            let tx = client
                .new_tx()
                .pay_to_address(receiver(), Assets::from_lovelace(payment))
                .complete()
                .await
                .unwrap();
            let body = &tx.tx().body;
            let produced: i128 = body.outputs.iter().map(|o| o.lovelace()).sum();
            (wallet as i128, produced, body.fee as i128)
        });

        prop_assert_eq!(consumed, produced + fee);
    }

    #[test]
    fn prop_fee_covers_minted_outputs(
        tokens in prop::collection::vec(1i128..1_000_000, 0..6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (fee, min_fee) = runtime.block_on(async {
            let (_emulator, client) = funded(&[100_000_000]).await;
            let params = client.protocol_parameters();
            let policy = NativeScript::Pubkey(key_hash_of(WALLET_KEY)).to_script();

            let mut minted = Assets::new();
            for (i, quantity) in tokens.iter().enumerate() {
                let name = AssetName::new(format!("T{}", i).into_bytes()).unwrap();
                minted = minted.with_asset(policy.hash(), name, *quantity);
            }
            let mut builder = client.new_tx().attach_minting_policy(policy);
            if !minted.is_empty() {
                builder = builder.mint_assets(minted.clone()).unwrap();
            }
            let signed = builder
                .pay_to_address(receiver(), minted)
                .complete()
                .await
                .unwrap()
                .sign_with_wallet()
                .await
                .unwrap()
                .complete()
                .unwrap();

            let min_fee = params.min_fee(signed.to_cbor().len(), Default::default(), 0);
            (signed.tx().body.fee, min_fee)
        });

        prop_assert!(fee >= min_fee);
    }
}
