//! Core TxBuilder implementation
//!
//! [`TxBuilder`] is one single-use build session. Stage calls validate their
//! arguments, record metadata and enqueue deferred programs; nothing reaches
//! the provider until [`TxBuilder::complete`] drains the queue. Every stage
//! consumes and returns the builder so calls chain, and any stage error
//! ends the session.

use super::certificates;
use super::complete::{complete, CompleteOptions, Completed};
use super::context::{BuilderContext, SessionConfig};
use super::errors::TxBuilderError;
use super::output::{derive_outputs, next_wallet_utxos, ChainResult};
use super::redeemer::RedeemerSpec;
use super::sign::TxSignBuilder;
use super::stages::{self, OutputData};
use crate::address::Address;
use crate::assets::Assets;
use crate::hash::KeyHash;
use crate::metadata::Metadatum;
use crate::observability::TraceContext;
use crate::structured_logging::BuildLogger;
use crate::transaction::{Anchor, DRep, PoolId};
use crate::types::{Script, Utxo};
use std::sync::Arc;

pub struct TxBuilder {
    ctx: BuilderContext,
    session: Arc<SessionConfig>,
    trace: TraceContext,
    logger: BuildLogger,
}

impl TxBuilder {
    pub fn new(session: Arc<SessionConfig>) -> Self {
        let trace = TraceContext::new("tx_build");
        let logger = BuildLogger::new(&trace);
        Self {
            ctx: BuilderContext::new(),
            session,
            trace,
            logger,
        }
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace
    }

    /// Run this session under `trace`, e.g. a chained build's follow-up
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.logger = BuildLogger::new(&trace);
        self.trace = trace;
        self
    }

    pub fn context(&self) -> &BuilderContext {
        &self.ctx
    }

    fn enqueued(self, label: &str) -> Self {
        self.logger.log_stage_enqueued(label, self.ctx.pending_programs());
        self
    }

    // ---- inputs ----

    pub fn read_from(mut self, utxos: Vec<Utxo>) -> Self {
        stages::read_from(&mut self.ctx, utxos);
        self
    }

    pub fn collect_from(mut self, utxos: Vec<Utxo>) -> Result<Self, TxBuilderError> {
        stages::collect_from(&mut self.ctx, utxos, None)?;
        Ok(self.enqueued("collect_from"))
    }

    /// Spend script-locked UTxOs; key-locked ones in the same call ignore
    /// the redeemer
    pub fn collect_from_with_redeemer(
        mut self,
        utxos: Vec<Utxo>,
        redeemer: impl Into<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        stages::collect_from(&mut self.ctx, utxos, Some(redeemer.into()))?;
        Ok(self.enqueued("collect_from"))
    }

    // ---- outputs ----

    /// Zero lovelace means "the protocol minimum"
    pub fn pay_to_address(mut self, address: Address, assets: Assets) -> Self {
        stages::pay(&mut self.ctx, address, None, None, assets);
        self.enqueued("pay_to_address")
    }

    pub fn pay_to_address_with_data(
        mut self,
        address: Address,
        data: OutputData,
        assets: Assets,
    ) -> Result<Self, TxBuilderError> {
        let datum = data.datum()?;
        stages::pay(&mut self.ctx, address, datum, data.script_ref, assets);
        Ok(self.enqueued("pay_to_address"))
    }

    /// Script outputs must carry a datum
    pub fn pay_to_contract(
        mut self,
        address: Address,
        data: OutputData,
        assets: Assets,
    ) -> Result<Self, TxBuilderError> {
        let datum = data.datum()?.ok_or_else(|| {
            TxBuilderError::InvalidOutputDatum("contract outputs require a datum".to_string())
        })?;
        stages::pay(&mut self.ctx, address, Some(datum), data.script_ref, assets);
        Ok(self.enqueued("pay_to_contract"))
    }

    // ---- minting ----

    pub fn mint_assets(mut self, assets: Assets) -> Result<Self, TxBuilderError> {
        stages::mint_assets(&mut self.ctx, assets, None)?;
        Ok(self.enqueued("mint_assets"))
    }

    pub fn mint_assets_with_redeemer(
        mut self,
        assets: Assets,
        redeemer: impl Into<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        stages::mint_assets(&mut self.ctx, assets, Some(redeemer.into()))?;
        Ok(self.enqueued("mint_assets"))
    }

    // ---- scripts ----

    pub fn attach_script(mut self, script: Script) -> Self {
        self.ctx.attach_script(script);
        self
    }

    pub fn attach_spending_validator(self, script: Script) -> Self {
        self.attach_script(script)
    }

    pub fn attach_minting_policy(self, script: Script) -> Self {
        self.attach_script(script)
    }

    pub fn attach_certificate_validator(self, script: Script) -> Self {
        self.attach_script(script)
    }

    pub fn attach_withdrawal_validator(self, script: Script) -> Self {
        self.attach_script(script)
    }

    pub fn attach_vote_validator(self, script: Script) -> Self {
        self.attach_script(script)
    }

    // ---- metadata ----

    /// Set the metadatum under `label`; a later call for the same label wins
    pub fn attach_metadata(mut self, label: u64, metadatum: impl Into<Metadatum>) -> Result<Self, TxBuilderError> {
        stages::attach_metadata(&mut self.ctx, label, metadatum.into())?;
        Ok(self.enqueued("attach_metadata"))
    }

    // ---- constraints ----

    pub fn valid_from(mut self, unix_ms: u64) -> Result<Self, TxBuilderError> {
        stages::valid_from(&mut self.ctx, &self.session.slot_config, unix_ms)?;
        Ok(self)
    }

    pub fn valid_to(mut self, unix_ms: u64) -> Result<Self, TxBuilderError> {
        stages::valid_to(&mut self.ctx, &self.session.slot_config, unix_ms)?;
        Ok(self)
    }

    pub fn add_signer(mut self, address: &Address) -> Result<Self, TxBuilderError> {
        stages::add_signer(&mut self.ctx, address)?;
        Ok(self)
    }

    pub fn add_signer_key(mut self, key_hash: KeyHash) -> Self {
        self.ctx.add_required_signer(key_hash);
        self
    }

    /// Lower bound for the fee; the computed minimum still applies
    pub fn set_min_fee(mut self, lovelace: u64) -> Self {
        self.ctx.set_min_fee(lovelace);
        self
    }

    /// Merge another session's stages into this one
    pub fn compose(mut self, other: TxBuilder) -> Self {
        self.ctx.absorb(other.ctx);
        self
    }

    // ---- certificates ----

    pub fn register_stake(mut self, reward_address: &Address) -> Result<Self, TxBuilderError> {
        certificates::register_stake(&mut self.ctx, reward_address)?;
        Ok(self.enqueued("register_stake"))
    }

    pub fn deregister_stake(
        mut self,
        reward_address: &Address,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::deregister_stake(&mut self.ctx, reward_address, redeemer)?;
        Ok(self.enqueued("deregister_stake"))
    }

    pub fn delegate_to_pool(
        mut self,
        reward_address: &Address,
        pool: PoolId,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::delegate_to_pool(&mut self.ctx, reward_address, pool, redeemer)?;
        Ok(self.enqueued("delegate_to_pool"))
    }

    pub fn delegate_vote_to_drep(
        mut self,
        reward_address: &Address,
        drep: DRep,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::delegate_vote_to_drep(&mut self.ctx, reward_address, drep, redeemer)?;
        Ok(self.enqueued("delegate_vote_to_drep"))
    }

    pub fn delegate_to_pool_and_drep(
        mut self,
        reward_address: &Address,
        pool: PoolId,
        drep: DRep,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::delegate_to_pool_and_drep(&mut self.ctx, reward_address, pool, drep, redeemer)?;
        Ok(self.enqueued("delegate_to_pool_and_drep"))
    }

    pub fn register_and_delegate_to_pool(
        mut self,
        reward_address: &Address,
        pool: PoolId,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::register_and_delegate_to_pool(&mut self.ctx, reward_address, pool, redeemer)?;
        Ok(self.enqueued("register_and_delegate_to_pool"))
    }

    pub fn register_and_delegate_to_drep(
        mut self,
        reward_address: &Address,
        drep: DRep,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::register_and_delegate_to_drep(&mut self.ctx, reward_address, drep, redeemer)?;
        Ok(self.enqueued("register_and_delegate_to_drep"))
    }

    pub fn register_and_delegate_to_pool_and_drep(
        mut self,
        reward_address: &Address,
        pool: PoolId,
        drep: DRep,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::register_and_delegate_to_pool_and_drep(&mut self.ctx, reward_address, pool, drep, redeemer)?;
        Ok(self.enqueued("register_and_delegate_to_pool_and_drep"))
    }

    pub fn register_drep(
        mut self,
        reward_address: &Address,
        anchor: Option<Anchor>,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::register_drep(&mut self.ctx, reward_address, anchor, redeemer)?;
        Ok(self.enqueued("register_drep"))
    }

    pub fn deregister_drep(
        mut self,
        reward_address: &Address,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::deregister_drep(&mut self.ctx, reward_address, redeemer)?;
        Ok(self.enqueued("deregister_drep"))
    }

    pub fn update_drep(
        mut self,
        reward_address: &Address,
        anchor: Option<Anchor>,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::update_drep(&mut self.ctx, reward_address, anchor, redeemer)?;
        Ok(self.enqueued("update_drep"))
    }

    pub fn auth_committee_hot(
        mut self,
        cold_address: &Address,
        hot_address: &Address,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::auth_committee_hot(&mut self.ctx, cold_address, hot_address, redeemer)?;
        Ok(self.enqueued("auth_committee_hot"))
    }

    pub fn resign_committee_hot(
        mut self,
        cold_address: &Address,
        anchor: Option<Anchor>,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::resign_committee_hot(&mut self.ctx, cold_address, anchor, redeemer)?;
        Ok(self.enqueued("resign_committee_hot"))
    }

    pub fn withdraw(
        mut self,
        reward_address: &Address,
        amount: u64,
        redeemer: Option<RedeemerSpec>,
    ) -> Result<Self, TxBuilderError> {
        certificates::withdraw(&mut self.ctx, reward_address, amount, redeemer)?;
        Ok(self.enqueued("withdraw"))
    }

    // ---- completion ----

    pub async fn complete(self) -> Result<TxSignBuilder, TxBuilderError> {
        let options = CompleteOptions::from_settings(&self.session.settings);
        self.complete_with(options).await
    }

    pub async fn complete_with(self, options: CompleteOptions) -> Result<TxSignBuilder, TxBuilderError> {
        let (done, session, trace, logger) = self.finish(options).await?;
        Ok(sign_builder(done, &session, trace, logger))
    }

    /// Complete and also hand back the wallet UTxO set this transaction
    /// leaves behind, for building a dependent transaction
    pub async fn chain(self) -> Result<ChainResult, TxBuilderError> {
        let options = CompleteOptions::from_settings(&self.session.settings);
        self.chain_with(options).await
    }

    pub async fn chain_with(self, options: CompleteOptions) -> Result<ChainResult, TxBuilderError> {
        let (mut done, session, trace, logger) = self.finish(options).await?;
        let derived_outputs = derive_outputs(&done.tx, done.hash);
        let wallet_utxos = next_wallet_utxos(
            std::mem::take(&mut done.wallet_utxos),
            &done.tx,
            &derived_outputs,
            &done.change_address,
        );
        let next_trace = trace.follow_up("tx_chain");
        Ok(ChainResult {
            wallet_utxos,
            derived_outputs,
            tx: sign_builder(done, &session, trace, logger),
            next_trace,
        })
    }

    async fn finish(
        self,
        options: CompleteOptions,
    ) -> Result<(Completed, Arc<SessionConfig>, TraceContext, BuildLogger), TxBuilderError> {
        let TxBuilder {
            ctx,
            session,
            trace,
            logger,
        } = self;
        let done = complete(ctx, &session, &trace, &logger, options).await?;
        Ok((done, session, trace, logger))
    }
}

fn sign_builder(done: Completed, session: &SessionConfig, trace: TraceContext, logger: BuildLogger) -> TxSignBuilder {
    TxSignBuilder::new(
        done.tx,
        done.hash,
        session.wallet.clone(),
        session.provider.clone(),
        session.codec.clone(),
        trace,
        logger,
    )
}
