//! Staking, delegation and governance certificates, plus reward withdrawals

use super::context::{BuilderContext, ContextSnapshot};
use super::errors::TxBuilderError;
use super::intent::{Mutation, Program};
use super::redeemer::RedeemerSpec;
use crate::address::{Address, Credential};
use crate::transaction::{Anchor, Certificate, DRep, PoolId};
use crate::types::ProtocolParameters;

fn stake_credential(reward_address: &Address) -> Result<Credential, TxBuilderError> {
    if !reward_address.is_reward() {
        return Err(TxBuilderError::InvalidRewardAddress(reward_address.to_hex()));
    }
    reward_address
        .stake_credential()
        .ok_or_else(|| TxBuilderError::InvalidRewardAddress(reward_address.to_hex()))
}

fn reject_self_index(redeemer: &Option<RedeemerSpec>) -> Result<(), TxBuilderError> {
    if redeemer.as_ref().is_some_and(RedeemerSpec::is_self_index) {
        return Err(TxBuilderError::InvalidRedeemerBuilder(
            "self-index redeemers are only valid when collecting inputs".to_string(),
        ));
    }
    Ok(())
}

fn certificate_mutation(
    snapshot: &ContextSnapshot,
    certificate: Certificate,
    redeemer: Option<RedeemerSpec>,
) -> Result<Mutation, TxBuilderError> {
    let redeemer = match certificate.witness_credential() {
        Some(credential) => {
            let purpose = format!("certificate {:?}", credential);
            snapshot.witness_redeemer(credential, redeemer, &purpose)?
        }
        None => None,
    };
    Ok(Mutation::AddCertificate {
        certificate,
        redeemer,
    })
}

/// Enqueue a certificate whose fields may depend on protocol parameters
fn enqueue_certificate<F>(
    ctx: &mut BuilderContext,
    label: &'static str,
    redeemer: Option<RedeemerSpec>,
    make: F,
) -> Result<(), TxBuilderError>
where
    F: FnOnce(&ProtocolParameters) -> Certificate + Send + Sync + 'static,
{
    reject_self_index(&redeemer)?;
    ctx.enqueue(Program::new(label, move |snapshot| async move {
        let certificate = make(&snapshot.params);
        Ok(vec![certificate_mutation(&snapshot, certificate, redeemer)?])
    }));
    Ok(())
}

pub(crate) fn register_stake(ctx: &mut BuilderContext, reward_address: &Address) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "register_stake", None, move |_| Certificate::StakeRegistration(stake))
}

pub(crate) fn deregister_stake(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "deregister_stake", redeemer, move |_| {
        Certificate::StakeDeregistration(stake)
    })
}

pub(crate) fn delegate_to_pool(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    pool: PoolId,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "delegate_to_pool", redeemer, move |_| {
        Certificate::StakeDelegation { stake, pool }
    })
}

pub(crate) fn delegate_vote_to_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    drep: DRep,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "delegate_vote_to_drep", redeemer, move |_| {
        Certificate::VoteDelegation { stake, drep }
    })
}

pub(crate) fn delegate_to_pool_and_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    pool: PoolId,
    drep: DRep,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "delegate_to_pool_and_drep", redeemer, move |_| {
        Certificate::StakeVoteDelegation { stake, pool, drep }
    })
}

pub(crate) fn register_and_delegate_to_pool(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    pool: PoolId,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "register_and_delegate_to_pool", redeemer, move |params| {
        Certificate::StakeRegistrationDelegation {
            stake,
            pool,
            deposit: params.key_deposit,
        }
    })
}

pub(crate) fn register_and_delegate_to_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    drep: DRep,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "register_and_delegate_to_drep", redeemer, move |params| {
        Certificate::VoteRegistrationDelegation {
            stake,
            drep,
            deposit: params.key_deposit,
        }
    })
}

pub(crate) fn register_and_delegate_to_pool_and_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    pool: PoolId,
    drep: DRep,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    enqueue_certificate(
        ctx,
        "register_and_delegate_to_pool_and_drep",
        redeemer,
        move |params| Certificate::StakeVoteRegistrationDelegation {
            stake,
            pool,
            drep,
            deposit: params.key_deposit,
        },
    )
}

pub(crate) fn register_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    anchor: Option<Anchor>,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let drep = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "register_drep", redeemer, move |params| Certificate::DRepRegistration {
        drep,
        deposit: params.drep_deposit,
        anchor,
    })
}

pub(crate) fn deregister_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let drep = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "deregister_drep", redeemer, move |params| Certificate::DRepDeregistration {
        drep,
        refund: params.drep_deposit,
    })
}

pub(crate) fn update_drep(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    anchor: Option<Anchor>,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let drep = stake_credential(reward_address)?;
    enqueue_certificate(ctx, "update_drep", redeemer, move |_| Certificate::DRepUpdate { drep, anchor })
}

pub(crate) fn auth_committee_hot(
    ctx: &mut BuilderContext,
    cold_address: &Address,
    hot_address: &Address,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let cold = stake_credential(cold_address)?;
    let hot = stake_credential(hot_address)?;
    enqueue_certificate(ctx, "auth_committee_hot", redeemer, move |_| Certificate::AuthCommitteeHot {
        cold,
        hot,
    })
}

pub(crate) fn resign_committee_hot(
    ctx: &mut BuilderContext,
    cold_address: &Address,
    anchor: Option<Anchor>,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let cold = stake_credential(cold_address)?;
    enqueue_certificate(ctx, "resign_committee_hot", redeemer, move |_| {
        Certificate::ResignCommitteeCold { cold, anchor }
    })
}

/// Withdraw `amount` from a reward account. The ledger only accepts
/// withdrawals of the full balance.
pub(crate) fn withdraw(
    ctx: &mut BuilderContext,
    reward_address: &Address,
    amount: u64,
    redeemer: Option<RedeemerSpec>,
) -> Result<(), TxBuilderError> {
    let stake = stake_credential(reward_address)?;
    reject_self_index(&redeemer)?;
    let reward_address = reward_address.clone();
    ctx.enqueue(Program::new("withdraw", move |snapshot| async move {
        let purpose = format!("withdrawal from {}", reward_address);
        let redeemer = snapshot.witness_redeemer(&stake, redeemer, &purpose)?;
        Ok(vec![Mutation::AddWithdrawal {
            reward_address,
            amount,
            redeemer,
        }])
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::KeyHash;
    use crate::tx_builder::redeemer::RedeemerBuilder;
    use crate::types::PlutusData;

    #[test]
    fn test_payment_address_is_not_a_reward_address() {
        let mut ctx = BuilderContext::new();
        let payment = Address::enterprise(0, Credential::Key(KeyHash::new([1; 28])));
        assert!(matches!(
            register_stake(&mut ctx, &payment),
            Err(TxBuilderError::InvalidRewardAddress(_))
        ));
        assert_eq!(ctx.pending_programs(), 0);
    }

    #[test]
    fn test_self_index_redeemer_is_rejected() {
        let mut ctx = BuilderContext::new();
        let reward = Address::reward(0, Credential::Key(KeyHash::new([1; 28])));
        let builder = RedeemerBuilder::self_index(|i| PlutusData::integer(i as i128));
        assert!(matches!(
            withdraw(&mut ctx, &reward, 10, Some(builder.into())),
            Err(TxBuilderError::InvalidRedeemerBuilder(_))
        ));
    }

    #[test]
    fn test_each_certificate_enqueues_one_program() {
        let mut ctx = BuilderContext::new();
        let reward = Address::reward(0, Credential::Key(KeyHash::new([1; 28])));
        register_stake(&mut ctx, &reward).unwrap();
        delegate_to_pool(&mut ctx, &reward, KeyHash::new([9; 28]), None).unwrap();
        delegate_vote_to_drep(&mut ctx, &reward, DRep::AlwaysAbstain, None).unwrap();
        assert_eq!(ctx.pending_programs(), 3);
    }
}
