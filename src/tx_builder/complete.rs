//! Turning a drafted session into a balanced, fee-correct transaction
//!
//! `Draining -> Balancing -> FeeConverging -> Evaluating -> Finalized`
//!
//! Balancing, fee convergence and evaluation form one outer loop. Each
//! attempt selects wallet inputs for the current fee estimate, resolves
//! redeemers against the resulting input order and iterates the fee to a
//! fixed point. An attempt ends early when the change cannot pay the fee,
//! when collateral no longer covers it, or when redeemers still carry
//! unevaluated budgets; the next attempt starts from the higher estimate.

use super::coin_selection::{select_coins, select_collateral, sort_candidates, CollateralPlan};
use super::context::{BuilderContext, ScriptSource, SessionConfig, TxDraft};
use super::errors::TxBuilderError;
use super::fee::{converge_fee, min_ada_for, FeeOutcome, FeeTarget};
use super::intent::drain;
use super::redeemer::{resolve_redeemers, ResolutionShape};
use crate::address::{Address, Credential};
use crate::assets::{Assets, Unit};
use crate::config::BuilderSettings;
use crate::hash::{KeyHash, ScriptHash, TxHash};
use crate::metadata::AuxiliaryData;
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::structured_logging::BuildLogger;
use crate::transaction::{Redeemer, Transaction, TransactionBody, TransactionOutput, VkeyWitness, WitnessSet};
use crate::types::{ExUnits, OutRef, ProtocolParameters, RedeemerTag, ScriptType, Utxo};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Per-call knobs of [`TxBuilder::complete_with`](super::TxBuilder::complete_with)
#[derive(Debug, Clone)]
pub struct CompleteOptions {
    /// Add wallet inputs to cover the balance
    pub coin_selection: bool,
    /// Defaults to the wallet address
    pub change_address: Option<Address>,
    /// Used instead of querying the wallet
    pub preset_wallet_inputs: Option<Vec<Utxo>>,
    pub local_uplc_eval: bool,
    pub collateral_amount: u64,
}

impl CompleteOptions {
    pub fn from_settings(settings: &BuilderSettings) -> Self {
        Self {
            coin_selection: settings.coin_selection,
            change_address: None,
            preset_wallet_inputs: None,
            local_uplc_eval: settings.local_uplc_eval,
            collateral_amount: settings.collateral_amount,
        }
    }

    pub fn with_change_address(mut self, address: Address) -> Self {
        self.change_address = Some(address);
        self
    }

    pub fn with_preset_wallet_inputs(mut self, utxos: Vec<Utxo>) -> Self {
        self.preset_wallet_inputs = Some(utxos);
        self
    }

    pub fn without_coin_selection(mut self) -> Self {
        self.coin_selection = false;
        self
    }

    pub fn with_provider_evaluation(mut self) -> Self {
        self.local_uplc_eval = false;
        self
    }
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self::from_settings(&BuilderSettings::default())
    }
}

/// A finalized transaction and the wallet view it was balanced against
#[derive(Debug, Clone)]
pub(crate) struct Completed {
    pub tx: Transaction,
    pub hash: TxHash,
    pub size: usize,
    pub change: Option<TransactionOutput>,
    pub change_address: Address,
    pub wallet_utxos: Vec<Utxo>,
}

pub(crate) async fn complete(
    ctx: BuilderContext,
    session: &SessionConfig,
    trace: &TraceContext,
    logger: &BuildLogger,
    options: CompleteOptions,
) -> Result<Completed, TxBuilderError> {
    let timer = Timer::new();
    if let Some(m) = metrics() {
        m.builds_started.inc();
    }

    let result = run(ctx, session, trace, logger, options).await;
    match &result {
        Ok(done) => {
            let change = done.change.as_ref().map(|c| c.value.clone()).unwrap_or_default();
            logger.log_build_success(&done.hash.to_string(), done.tx.body.fee, done.size, &change, timer.elapsed_ms());
            if let Some(m) = metrics() {
                m.builds_completed.inc();
                timer.observe(&m.build_latency);
            }
        }
        Err(err) => {
            logger.log_build_failure(err.category(), &err.to_string(), timer.elapsed_ms());
            if let Some(m) = metrics() {
                m.record_failure(err.category());
            }
        }
    }
    result
}

async fn run(
    mut ctx: BuilderContext,
    session: &SessionConfig,
    trace: &TraceContext,
    logger: &BuildLogger,
    mut options: CompleteOptions,
) -> Result<Completed, TxBuilderError> {
    logger.log_transition("Draining");
    drain_programs(&mut ctx, session, trace, logger).await?;

    let (change_address, wallet_utxos) = wallet_info(session, &mut options).await?;
    if change_address.is_reward() {
        return Err(TxBuilderError::InvalidOutput(format!(
            "change address {} is a reward address",
            change_address
        )));
    }

    let params = &session.params;
    let codec = session.codec.as_ref();
    let draft = &ctx.draft;

    let collected: BTreeSet<OutRef> = draft.collected.iter().map(|u| u.out_ref).collect();
    let mut candidates: Vec<Utxo> = wallet_utxos
        .iter()
        .filter(|u| !collected.contains(&u.out_ref) && !u.is_script_locked())
        .cloned()
        .collect();
    sort_candidates(&mut candidates);
    let collateral_candidates: Vec<Utxo> = wallet_utxos.iter().filter(|u| !u.is_script_locked()).cloned().collect();

    let witnesses = script_witnesses(&ctx)?;
    let needs_collateral = !witnesses.languages.is_empty();
    let base = fixed_balance(draft, params);
    let min_output = |assets: &Assets| {
        min_ada_for(codec, params, &TransactionOutput::new(change_address.clone(), assets.clone()))
    };

    let floor = ctx.min_fee.unwrap_or(0);
    let max_attempts = session.settings.max_balance_attempts.max(1);
    let mut fee_estimate = floor;
    let mut budgets: BTreeMap<(RedeemerTag, u64), ExUnits> = BTreeMap::new();
    let mut evaluated_for: Option<Vec<OutRef>> = None;
    let mut collateral: Option<CollateralPlan> = None;
    let mut last_shortfall: Option<Assets> = None;

    for attempt in 1..=max_attempts {
        logger.log_transition("Balancing");
        let mut owed = base.clone();
        owed.adjust(Unit::Lovelace, -(fee_estimate as i128));
        let selected = if options.coin_selection {
            select_coins(&candidates, &owed, &min_output)?
        } else {
            let shortfall = owed.negative_part();
            if !shortfall.is_empty() {
                return Err(TxBuilderError::InsufficientFunds { shortfall });
            }
            Vec::new()
        };
        logger.log_selection(selected.len(), candidates.len(), attempt);

        let collateral_short = collateral
            .as_ref()
            .map_or(true, |plan| plan.posted < params.required_collateral(fee_estimate));
        if needs_collateral && collateral_short {
            let target = options.collateral_amount.max(params.required_collateral(fee_estimate));
            let plan = select_collateral(&collateral_candidates, target, params.max_collateral_inputs, &min_output)?;
            logger.log_collateral(plan.inputs.len(), plan.posted);
            collateral = Some(plan);
        }

        let mut pre_fee = base.clone();
        for utxo in &selected {
            pre_fee.merge(&utxo.assets);
        }

        let spent: Vec<&Utxo> = draft
            .collected
            .iter()
            .chain(selected.iter())
            .sorted_by_key(|u| u.out_ref)
            .dedup_by(|a, b| a.out_ref == b.out_ref)
            .collect();
        let inputs: Vec<OutRef> = spent.iter().map(|u| u.out_ref).collect();

        let reads: Vec<&Utxo> = draft
            .read
            .iter()
            .filter(|u| inputs.binary_search(&u.out_ref).is_err())
            .sorted_by_key(|u| u.out_ref)
            .dedup_by(|a, b| a.out_ref == b.out_ref)
            .collect();

        let policies = draft.mint.policies();
        let shape = ResolutionShape {
            inputs: &inputs,
            policies: &policies,
            withdrawals: &draft.withdrawals,
            certificate_count: draft.certificates.len(),
        };
        let redeemers = resolve_redeemers(&ctx.redeemers, &shape, &budgets)?;
        let ex_units = redeemers
            .iter()
            .fold(ExUnits::default(), |acc, r| acc.saturating_add(r.ex_units));
        let ref_script_bytes: u64 = spent
            .iter()
            .chain(reads.iter())
            .filter_map(|u| u.script_ref.as_ref())
            .map(|s| s.size() as u64)
            .sum();

        let collateral_utxos: &[Utxo] = collateral.as_ref().map(|plan| plan.inputs.as_slice()).unwrap_or_default();
        let signers = required_key_hashes(draft, &spent, collateral_utxos, &witnesses.native_signers);

        let script_data_hash = if redeemers.is_empty() && draft.datums.is_empty() {
            None
        } else {
            Some(codec.script_data_hash(&redeemers, &draft.datums, &witnesses.languages, &params.cost_models)?)
        };

        let auxiliary_data = (!draft.metadata.is_empty()).then(|| AuxiliaryData {
            metadata: draft.metadata.clone(),
        });
        let auxiliary_data_hash = auxiliary_data
            .as_ref()
            .map(|aux| codec.hash_auxiliary_data(aux))
            .transpose()?;

        let template = TransactionBody {
            inputs: inputs.clone(),
            outputs: draft.outputs.clone(),
            fee: 0,
            ttl: ctx.valid_to,
            certificates: draft.certificates.clone(),
            withdrawals: draft.withdrawals.clone(),
            auxiliary_data_hash,
            validity_start: ctx.valid_from,
            mint: draft.mint.clone(),
            script_data_hash,
            collateral: collateral_utxos.iter().map(|u| u.out_ref).collect(),
            required_signers: draft.required_signers.iter().copied().collect(),
            network_id: None,
            collateral_return: collateral
                .as_ref()
                .filter(|plan| !plan.returned.is_empty())
                .map(|plan| TransactionOutput::new(change_address.clone(), plan.returned.clone())),
            total_collateral: collateral.as_ref().map(|plan| plan.posted),
            reference_inputs: reads.iter().map(|u| u.out_ref).collect(),
        };
        let mut witness_set = witnesses.scripts.clone();
        witness_set.plutus_data = draft.datums.clone();
        witness_set.redeemers = redeemers.clone();
        witness_set.vkey_witnesses = placeholder_witnesses(signers.len());

        logger.log_transition("FeeConverging");
        let target = FeeTarget {
            balance: &pre_fee,
            change_address: &change_address,
            floor,
            start_fee: fee_estimate,
            ex_units,
            ref_script_bytes,
            max_iterations: session.settings.max_fee_iterations,
        };
        let outcome = converge_fee(codec, params, &target, logger, |fee, change| {
            let mut body = template.clone();
            body.fee = fee;
            body.outputs.extend(change);
            let mut tx = Transaction::new(body, witness_set.clone());
            tx.auxiliary_data = auxiliary_data.clone();
            Ok(tx)
        })?;

        match outcome {
            FeeOutcome::NeedsMoreFunds { fee } => {
                let shortfall = shortfall_at(&pre_fee, fee, &min_output)?;
                if !options.coin_selection || fee <= fee_estimate {
                    return Err(TxBuilderError::InsufficientFunds { shortfall });
                }
                last_shortfall = Some(shortfall);
                fee_estimate = fee;
            }
            FeeOutcome::Converged {
                mut tx,
                size,
                fee,
                change,
                iterations,
            } => {
                last_shortfall = None;
                if let Some(m) = metrics() {
                    m.fee_iterations.observe(iterations as f64);
                }
                if collateral
                    .as_ref()
                    .is_some_and(|plan| plan.posted < params.required_collateral(fee))
                {
                    fee_estimate = fee;
                    continue;
                }
                if !redeemers.is_empty() && evaluated_for.as_deref() != Some(inputs.as_slice()) {
                    logger.log_transition("Evaluating");
                    let utxos = evaluation_utxos(&spent, &reads, collateral_utxos);
                    budgets = evaluate(session, &options, &tx, &utxos, &redeemers, trace, logger).await?;
                    evaluated_for = Some(inputs);
                    fee_estimate = fee;
                    continue;
                }
                if size as u64 > params.max_tx_size {
                    return Err(TxBuilderError::TxTooLarge {
                        size,
                        max: params.max_tx_size,
                    });
                }

                logger.log_transition("Finalized");
                tx.witness_set.vkey_witnesses.clear();
                let hash = codec.hash_body(&tx.body)?;
                return Ok(Completed {
                    tx,
                    hash,
                    size,
                    change,
                    change_address,
                    wallet_utxos,
                });
            }
        }
    }

    Err(match last_shortfall {
        Some(shortfall) => TxBuilderError::InsufficientFunds { shortfall },
        None => TxBuilderError::FeeConvergence { iterations: max_attempts },
    })
}

async fn drain_programs(
    ctx: &mut BuilderContext,
    session: &SessionConfig,
    trace: &TraceContext,
    logger: &BuildLogger,
) -> Result<(), TxBuilderError> {
    let programs = ctx.take_programs();
    let count = programs.len();
    let timer = Timer::new();
    let span = trace.child_span("drain");
    let snapshot = Arc::new(ctx.snapshot(session, &span));
    let mutations = drain(programs, snapshot).await?;
    let applied = mutations.len();
    for mutation in mutations {
        ctx.apply(mutation);
    }
    if let Some(m) = metrics() {
        timer.observe(&m.drain_latency);
    }
    logger.log_drain(&span, count, applied, timer.elapsed_ms());
    Ok(())
}

async fn wallet_info(
    session: &SessionConfig,
    options: &mut CompleteOptions,
) -> Result<(Address, Vec<Utxo>), TxBuilderError> {
    let wallet = session.wallet.as_ref();
    let change_address = match (&options.change_address, wallet) {
        (Some(address), _) => address.clone(),
        (None, Some(wallet)) => wallet.address().await?,
        (None, None) => return Err(TxBuilderError::MissingWallet("no change address".to_string())),
    };
    let utxos = match (options.preset_wallet_inputs.take(), wallet) {
        (Some(utxos), _) => utxos,
        (None, Some(wallet)) => wallet.get_utxos().await?,
        (None, None) => return Err(TxBuilderError::MissingWallet("no wallet UTxOs".to_string())),
    };
    Ok((change_address, utxos))
}

/// collected + minted + withdrawn + refunds - outputs - deposits
fn fixed_balance(draft: &TxDraft, params: &ProtocolParameters) -> Assets {
    let mut balance = Assets::sum(draft.collected.iter().map(|u| &u.assets));
    balance.merge(&draft.mint);
    let withdrawn: u64 = draft.withdrawals.values().sum();
    let refunds: u64 = draft.certificates.iter().map(|c| c.refund(params.key_deposit)).sum();
    let deposits: u64 = draft.certificates.iter().map(|c| c.deposit(params.key_deposit)).sum();
    balance.adjust(
        Unit::Lovelace,
        withdrawn as i128 + refunds as i128 - deposits as i128,
    );
    let produced = Assets::sum(draft.outputs.iter().map(|o| &o.value));
    &balance - &produced
}

fn shortfall_at<F>(balance: &Assets, fee: u64, min_output: &F) -> Result<Assets, TxBuilderError>
where
    F: Fn(&Assets) -> Result<u64, TxBuilderError>,
{
    let mut change = balance.clone();
    change.adjust(Unit::Lovelace, -(fee as i128));
    let mut shortfall = change.negative_part();
    if shortfall.is_empty() && !change.is_empty() {
        let required = min_output(&change)? as i128;
        shortfall.adjust(Unit::Lovelace, (required - change.lovelace()).max(0));
    }
    Ok(shortfall)
}

#[derive(Default)]
struct ScriptWitnesses {
    /// Only script buckets are filled
    scripts: WitnessSet,
    languages: BTreeSet<ScriptType>,
    native_signers: BTreeSet<KeyHash>,
}

/// Scripts the transaction actually runs, whether attached or referenced
fn script_witnesses(ctx: &BuilderContext) -> Result<ScriptWitnesses, TxBuilderError> {
    let draft = &ctx.draft;
    let mut used: BTreeMap<ScriptHash, String> = BTreeMap::new();
    for utxo in &draft.collected {
        if let Some(Credential::Script(hash)) = utxo.address.payment_credential() {
            used.entry(hash).or_insert_with(|| format!("spending {}", utxo.out_ref));
        }
    }
    for policy in draft.mint.policies() {
        used.entry(policy).or_insert_with(|| format!("minting policy {}", policy));
    }
    for (position, certificate) in draft.certificates.iter().enumerate() {
        if let Some(Credential::Script(hash)) = certificate.witness_credential() {
            used.entry(*hash).or_insert_with(|| format!("certificate #{}", position));
        }
    }
    for reward_address in draft.withdrawals.keys() {
        if let Some(Credential::Script(hash)) = reward_address.stake_credential() {
            used.entry(hash)
                .or_insert_with(|| format!("withdrawal from {}", reward_address));
        }
    }

    let mut witnesses = ScriptWitnesses::default();
    for (hash, purpose) in used {
        let attached = ctx
            .scripts
            .get(&hash)
            .ok_or_else(|| TxBuilderError::missing_script(hash, purpose))?;
        let script = &attached.script;
        if script.script_type.is_plutus() {
            witnesses.languages.insert(script.script_type);
        } else if let Some(native) = script.native() {
            witnesses.native_signers.extend(native.key_hashes());
        }
        if attached.source == ScriptSource::Attached {
            let bucket = match script.script_type {
                ScriptType::Native => &mut witnesses.scripts.native_scripts,
                ScriptType::PlutusV1 => &mut witnesses.scripts.plutus_v1_scripts,
                ScriptType::PlutusV2 => &mut witnesses.scripts.plutus_v2_scripts,
                ScriptType::PlutusV3 => &mut witnesses.scripts.plutus_v3_scripts,
            };
            bucket.push(script.bytes.clone());
        }
    }
    Ok(witnesses)
}

/// Every key hash whose signature the ledger will demand
fn required_key_hashes(
    draft: &TxDraft,
    spent: &[&Utxo],
    collateral: &[Utxo],
    native_signers: &BTreeSet<KeyHash>,
) -> BTreeSet<KeyHash> {
    let mut keys = draft.required_signers.clone();
    for utxo in spent.iter().copied().chain(collateral.iter()) {
        if let Some(Credential::Key(key)) = utxo.address.payment_credential() {
            keys.insert(key);
        }
    }
    for certificate in &draft.certificates {
        if let Some(Credential::Key(key)) = certificate.witness_credential() {
            keys.insert(*key);
        }
    }
    for reward_address in draft.withdrawals.keys() {
        if let Some(Credential::Key(key)) = reward_address.stake_credential() {
            keys.insert(key);
        }
    }
    keys.extend(native_signers.iter().copied());
    keys
}

/// Distinct stand-ins sized like real witnesses
fn placeholder_witnesses(count: usize) -> Vec<VkeyWitness> {
    (0..count)
        .map(|i| {
            let mut vkey = [0u8; 32];
            vkey[..8].copy_from_slice(&(i as u64).to_be_bytes());
            VkeyWitness {
                vkey,
                signature: [0; 64],
            }
        })
        .collect()
}

fn evaluation_utxos(spent: &[&Utxo], reads: &[&Utxo], collateral: &[Utxo]) -> Vec<Utxo> {
    let mut known: BTreeMap<OutRef, Utxo> = BTreeMap::new();
    for utxo in spent.iter().copied().chain(reads.iter().copied()).chain(collateral.iter()) {
        known.entry(utxo.out_ref).or_insert_with(|| utxo.clone());
    }
    known.into_values().collect()
}

async fn evaluate(
    session: &SessionConfig,
    options: &CompleteOptions,
    tx: &Transaction,
    utxos: &[Utxo],
    redeemers: &[Redeemer],
    trace: &TraceContext,
    logger: &BuildLogger,
) -> Result<BTreeMap<(RedeemerTag, u64), ExUnits>, TxBuilderError> {
    let span = trace.child_span("evaluate");
    let cbor = session.codec.encode_transaction(tx)?;
    let (results, local) = match (&session.evaluator, options.local_uplc_eval) {
        (Some(evaluator), true) => (
            evaluator
                .evaluate(&cbor, utxos, &session.params, &session.slot_config)
                .await,
            true,
        ),
        _ => (session.provider.evaluate_tx(&cbor, utxos).await, false),
    };
    let results = results.map_err(TxBuilderError::evaluation)?;

    let expected: BTreeSet<(RedeemerTag, u64)> = redeemers.iter().map(|r| (r.tag, r.index)).collect();
    let mut budgets = BTreeMap::new();
    for result in results {
        if !expected.contains(&(result.tag, result.index)) {
            return Err(TxBuilderError::evaluation_mismatch(format!(
                "evaluator returned unknown redeemer {}:{}",
                result.tag, result.index
            )));
        }
        budgets.insert((result.tag, result.index), result.ex_units);
    }
    if let Some((tag, index)) = expected.iter().find(|key| !budgets.contains_key(key)) {
        return Err(TxBuilderError::evaluation_mismatch(format!(
            "evaluator returned no budget for {}:{}",
            tag, index
        )));
    }

    let total = budgets
        .values()
        .fold(ExUnits::default(), |acc, units| acc.saturating_add(*units));
    let params = &session.params;
    if total.mem > params.max_tx_ex_mem || total.steps > params.max_tx_ex_steps {
        return Err(TxBuilderError::evaluation_mismatch(format!(
            "execution units mem={} steps={} exceed limits mem={} steps={}",
            total.mem, total.steps, params.max_tx_ex_mem, params.max_tx_ex_steps
        )));
    }
    logger.log_evaluation(&span, budgets.len(), total.mem, total.steps, local);
    Ok(budgets)
}
