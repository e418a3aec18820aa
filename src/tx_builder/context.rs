//! Session state of one transaction build
//!
//! This module provides [`BuilderContext`], the single owner of the draft
//! transaction while a session is open, and [`ContextSnapshot`], the
//! immutable view deferred programs run against.
//!
//! ## Ownership
//! - Stage calls mutate the context directly only for pure metadata
//!   (validity interval, attached scripts, required signers)
//! - Everything else arrives as [`Mutation`]s produced by deferred programs
//!   and applied in enqueue order after draining
//! - Collected inputs are never removed and keep their call order
//!
//! Mutators are not idempotent: collecting the same UTxO twice counts its
//! value twice. Callers de-duplicate.

use super::errors::TxBuilderError;
use super::intent::{Mutation, Program};
use super::redeemer::{PendingRedeemer, RedeemerPurpose, RedeemerSpec};
use crate::address::{Address, Credential};
use crate::assets::Assets;
use crate::codec::{CborCodec, TxCodec};
use crate::config::BuilderSettings;
use crate::hash::{KeyHash, PolicyId, ScriptHash};
use crate::metadata::Metadatum;
use crate::observability::TraceContext;
use crate::provider::{Provider, ScriptEvaluator};
use crate::transaction::{Certificate, TransactionOutput};
use crate::types::{Network, PlutusData, ProtocolParameters, Script, SlotConfig, Utxo};
use crate::wallet::Wallet;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where a script witness comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    /// Carried in the witness set
    Attached,
    /// Provided by the `script_ref` of a read or spent UTxO
    Referenced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedScript {
    pub script: Script,
    pub source: ScriptSource,
}

/// Collaborators and parameters shared by every session of a client
#[derive(Clone)]
pub struct SessionConfig {
    pub network: Network,
    pub slot_config: SlotConfig,
    pub params: ProtocolParameters,
    pub provider: Arc<dyn Provider>,
    pub wallet: Option<Arc<dyn Wallet>>,
    pub evaluator: Option<Arc<dyn ScriptEvaluator>>,
    pub codec: Arc<dyn TxCodec>,
    pub settings: BuilderSettings,
}

impl SessionConfig {
    pub fn new(network: Network, params: ProtocolParameters, provider: Arc<dyn Provider>) -> Self {
        Self {
            network,
            slot_config: network.slot_config(),
            params,
            provider,
            wallet: None,
            evaluator: None,
            codec: Arc::new(CborCodec::new()),
            settings: BuilderSettings::default(),
        }
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn TxCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_settings(mut self, settings: BuilderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_slot_config(mut self, slot_config: SlotConfig) -> Self {
        self.slot_config = slot_config;
        self
    }
}

/// Body-level contents accumulated by the session
#[derive(Debug, Clone, Default)]
pub struct TxDraft {
    /// Spent inputs in call order
    pub collected: Vec<Utxo>,
    pub read: Vec<Utxo>,
    pub outputs: Vec<TransactionOutput>,
    pub mint: Assets,
    pub certificates: Vec<Certificate>,
    pub withdrawals: BTreeMap<Address, u64>,
    pub required_signers: BTreeSet<KeyHash>,
    /// Witness-set datums, unique by hash, in insertion order
    pub datums: Vec<PlutusData>,
    /// Metadata labels for the auxiliary data
    pub metadata: BTreeMap<u64, Metadatum>,
}

#[derive(Default)]
pub struct BuilderContext {
    pub(crate) draft: TxDraft,
    pub(crate) scripts: BTreeMap<ScriptHash, AttachedScript>,
    pub(crate) valid_from: Option<u64>,
    pub(crate) valid_to: Option<u64>,
    pub(crate) programs: Vec<Program>,
    pub(crate) redeemers: Vec<PendingRedeemer>,
    pub(crate) min_fee: Option<u64>,
}

impl BuilderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &TxDraft {
        &self.draft
    }

    pub fn scripts(&self) -> &BTreeMap<ScriptHash, AttachedScript> {
        &self.scripts
    }

    pub fn pending_programs(&self) -> usize {
        self.programs.len()
    }

    /// Spend `utxo`; the redeemer only registers for script-locked inputs
    pub fn add_input(&mut self, utxo: Utxo, redeemer: Option<RedeemerSpec>) {
        if let Some(script) = &utxo.script_ref {
            self.register_reference_script(script.clone());
        }
        if let (Some(spec), true) = (redeemer, utxo.is_script_locked()) {
            self.redeemers.push(PendingRedeemer {
                purpose: RedeemerPurpose::Spend(utxo.out_ref),
                spec,
            });
        }
        self.draft.collected.push(utxo);
    }

    pub fn add_reference_input(&mut self, utxo: Utxo) {
        if let Some(script) = &utxo.script_ref {
            self.register_reference_script(script.clone());
        }
        self.draft.read.push(utxo);
    }

    pub fn add_output(&mut self, output: TransactionOutput) {
        self.draft.outputs.push(output);
    }

    pub fn add_mint(&mut self, policy: PolicyId, assets: &Assets, redeemer: Option<RedeemerSpec>) {
        self.draft.mint.merge(assets);
        if let Some(spec) = redeemer {
            self.redeemers.push(PendingRedeemer {
                purpose: RedeemerPurpose::Mint(policy),
                spec,
            });
        }
    }

    pub fn add_certificate(&mut self, certificate: Certificate, redeemer: Option<RedeemerSpec>) {
        let position = self.draft.certificates.len();
        self.draft.certificates.push(certificate);
        if let Some(spec) = redeemer {
            self.redeemers.push(PendingRedeemer {
                purpose: RedeemerPurpose::Cert(position),
                spec,
            });
        }
    }

    /// Withdrawals from the same reward address add up
    pub fn add_withdrawal(&mut self, reward_address: Address, amount: u64, redeemer: Option<RedeemerSpec>) {
        *self.draft.withdrawals.entry(reward_address.clone()).or_insert(0) += amount;
        if let Some(spec) = redeemer {
            self.redeemers.push(PendingRedeemer {
                purpose: RedeemerPurpose::Reward(reward_address),
                spec,
            });
        }
    }

    pub fn add_required_signer(&mut self, key_hash: KeyHash) {
        self.draft.required_signers.insert(key_hash);
    }

    pub fn add_datum(&mut self, datum: PlutusData) {
        let hash = datum.hash();
        if !self.draft.datums.iter().any(|d| d.hash() == hash) {
            self.draft.datums.push(datum);
        }
    }

    pub fn add_metadata(&mut self, label: u64, metadatum: Metadatum) {
        self.draft.metadata.insert(label, metadatum);
    }

    /// A referenced copy of the same script takes precedence
    pub fn attach_script(&mut self, script: Script) {
        let hash = script.hash();
        if self
            .scripts
            .get(&hash)
            .is_some_and(|s| s.source == ScriptSource::Referenced)
        {
            return;
        }
        self.scripts.insert(
            hash,
            AttachedScript {
                script,
                source: ScriptSource::Attached,
            },
        );
    }

    pub fn register_reference_script(&mut self, script: Script) {
        self.scripts.insert(
            script.hash(),
            AttachedScript {
                script,
                source: ScriptSource::Referenced,
            },
        );
    }

    pub fn set_valid_from(&mut self, slot: u64) {
        self.valid_from = Some(slot);
    }

    pub fn set_valid_to(&mut self, slot: u64) {
        self.valid_to = Some(slot);
    }

    pub fn set_min_fee(&mut self, lovelace: u64) {
        self.min_fee = Some(lovelace);
    }

    pub fn enqueue(&mut self, program: Program) {
        self.programs.push(program);
    }

    pub(crate) fn take_programs(&mut self) -> Vec<Program> {
        std::mem::take(&mut self.programs)
    }

    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::AddInput { utxo, redeemer } => self.add_input(utxo, redeemer),
            Mutation::AddReferenceInput(utxo) => self.add_reference_input(utxo),
            Mutation::AddOutput(output) => self.add_output(output),
            Mutation::AddMint {
                policy,
                assets,
                redeemer,
            } => self.add_mint(policy, &assets, redeemer),
            Mutation::AddCertificate {
                certificate,
                redeemer,
            } => self.add_certificate(certificate, redeemer),
            Mutation::AddWithdrawal {
                reward_address,
                amount,
                redeemer,
            } => self.add_withdrawal(reward_address, amount, redeemer),
            Mutation::AddRequiredSigner(key_hash) => self.add_required_signer(key_hash),
            Mutation::AddDatum(datum) => self.add_datum(datum),
            Mutation::AddMetadata { label, metadatum } => self.add_metadata(label, metadatum),
        }
    }

    /// Move another session's state into this one
    pub fn absorb(&mut self, other: BuilderContext) {
        let BuilderContext {
            draft,
            scripts,
            valid_from,
            valid_to,
            programs,
            redeemers,
            min_fee,
        } = other;

        self.draft.collected.extend(draft.collected);
        self.draft.read.extend(draft.read);
        self.draft.outputs.extend(draft.outputs);
        self.draft.mint.merge(&draft.mint);
        let offset = self.draft.certificates.len();
        self.draft.certificates.extend(draft.certificates);
        for (address, amount) in draft.withdrawals {
            *self.draft.withdrawals.entry(address).or_insert(0) += amount;
        }
        self.draft.required_signers.extend(draft.required_signers);
        for datum in draft.datums {
            self.add_datum(datum);
        }
        self.draft.metadata.extend(draft.metadata);
        for (_, attached) in scripts {
            match attached.source {
                ScriptSource::Attached => self.attach_script(attached.script),
                ScriptSource::Referenced => self.register_reference_script(attached.script),
            }
        }
        self.redeemers.extend(redeemers.into_iter().map(|mut pending| {
            if let RedeemerPurpose::Cert(position) = &mut pending.purpose {
                *position += offset;
            }
            pending
        }));
        self.valid_from = valid_from.or(self.valid_from);
        self.valid_to = valid_to.or(self.valid_to);
        self.min_fee = match (self.min_fee, min_fee) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.programs.extend(programs);
    }

    pub fn snapshot(&self, session: &SessionConfig, trace: &TraceContext) -> ContextSnapshot {
        ContextSnapshot {
            scripts: self.scripts.clone(),
            params: session.params.clone(),
            provider: session.provider.clone(),
            codec: session.codec.clone(),
            network_id: session.network.network_id(),
            trace_id: trace.trace_id().to_string(),
        }
    }
}

/// Immutable view handed to deferred programs
#[derive(Clone)]
pub struct ContextSnapshot {
    pub scripts: BTreeMap<ScriptHash, AttachedScript>,
    pub params: ProtocolParameters,
    pub provider: Arc<dyn Provider>,
    pub codec: Arc<dyn TxCodec>,
    pub network_id: u8,
    pub trace_id: String,
}

impl ContextSnapshot {
    pub fn script(&self, hash: &ScriptHash) -> Option<&Script> {
        self.scripts.get(hash).map(|s| &s.script)
    }

    /// Check that `credential` can be witnessed and return the redeemer to
    /// register: key credentials and native scripts take none, Plutus
    /// scripts require one.
    pub fn witness_redeemer(
        &self,
        credential: &Credential,
        redeemer: Option<RedeemerSpec>,
        purpose: &str,
    ) -> Result<Option<RedeemerSpec>, TxBuilderError> {
        match credential {
            Credential::Key(_) => Ok(None),
            Credential::Script(hash) => {
                let script = self
                    .script(hash)
                    .ok_or_else(|| TxBuilderError::missing_script(*hash, purpose))?;
                if !script.script_type.is_plutus() {
                    return Ok(None);
                }
                redeemer
                    .map(Some)
                    .ok_or_else(|| TxBuilderError::missing_redeemer(purpose))
            }
        }
    }
}
