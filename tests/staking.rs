//! Stake registration, delegation, withdrawals and DRep certificates
mod common;

use cardano_tx::{Certificate, DRep, KeyHash, Provider};
use common::*;

#[tokio::test]
async fn test_register_delegate_withdraw_deregister() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let reward = wallet_reward_address();
    let params = client.protocol_parameters();
    let pool = KeyHash::new([0x55; 28]);

    let register = client
        .new_tx()
        .register_stake(&reward)
        .unwrap()
        .delegate_to_pool(&reward, pool, None)
        .unwrap()
        .complete()
        .await
        .unwrap();
    let body = &register.tx().body;
    assert_eq!(body.certificates.len(), 2);
    assert!(matches!(body.certificates[0], Certificate::StakeRegistration(_)));
    let change: i128 = body.outputs.iter().map(|o| o.lovelace()).sum();
    assert_eq!(change + body.fee as i128 + params.key_deposit as i128, 100_000_000);

    register.sign_with_wallet().await.unwrap().complete().unwrap().submit().await.unwrap();
    emulator.await_block(1);
    assert_eq!(emulator.reward_balance(&reward), Some(0));

    emulator.distribute_rewards(&reward, 3_000_000);
    client
        .new_tx()
        .withdraw(&reward, 3_000_000, None)
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
    assert_eq!(emulator.reward_balance(&reward), Some(0));

    let before: i128 = emulator
        .get_utxos(&address_of(WALLET_KEY))
        .await
        .unwrap()
        .iter()
        .map(|u| u.assets.lovelace())
        .sum();
    let deregister = client
        .new_tx()
        .deregister_stake(&reward, None)
        .unwrap()
        .complete()
        .await
        .unwrap();
    let fee = deregister.fee() as i128;
    deregister.sign_with_wallet().await.unwrap().complete().unwrap().submit().await.unwrap();
    emulator.await_block(1);

    let after: i128 = emulator
        .get_utxos(&address_of(WALLET_KEY))
        .await
        .unwrap()
        .iter()
        .map(|u| u.assets.lovelace())
        .sum();
    assert_eq!(after, before + params.key_deposit as i128 - fee);
    assert_eq!(emulator.reward_balance(&reward), None);
}

#[tokio::test]
async fn test_partial_withdrawal_is_rejected() {
    let (emulator, client) = funded(&[100_000_000]).await;
    let reward = wallet_reward_address();

    client
        .new_tx()
        .register_and_delegate_to_drep(&reward, DRep::AlwaysAbstain, None)
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
    emulator.distribute_rewards(&reward, 4_000_000);

    let err = client
        .new_tx()
        .withdraw(&reward, 1_000_000, None)
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
        .unwrap_err();
    assert!(err.to_string().contains("WithdrawalsNotInRewardsCERTS"));
}

#[tokio::test]
async fn test_drep_registration_posts_the_drep_deposit() {
    let (_emulator, client) = funded(&[1_000_000_000]).await;
    let reward = wallet_reward_address();
    let params = client.protocol_parameters();

    let tx = client
        .new_tx()
        .register_drep(&reward, None, None)
        .unwrap()
        .complete()
        .await
        .unwrap();
    let body = &tx.tx().body;
    let produced: i128 = body.outputs.iter().map(|o| o.lovelace()).sum();
    assert_eq!(produced + body.fee as i128 + params.drep_deposit as i128, 1_000_000_000);
    assert!(matches!(
        body.certificates[0],
        Certificate::DRepRegistration { deposit, .. } if deposit == params.drep_deposit
    ));
}

#[tokio::test]
async fn test_payment_address_cannot_delegate() {
    let (_emulator, client) = funded(&[100_000_000]).await;
    let err = client
        .new_tx()
        .register_stake(&address_of(WALLET_KEY))
        .err()
        .unwrap();
    assert!(matches!(err, cardano_tx::TxBuilderError::InvalidRewardAddress(_)));
}
