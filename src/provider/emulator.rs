//! In-memory ledger implementing [`Provider`]
//!
//! Submitted transactions are checked against a subset of the ledger rules
//! (inputs, witnesses, scripts and redeemer pointers, collateral, fees,
//! min-ADA, value conservation) and queued in a mempool. They reach the
//! UTxO set when a block is produced with [`Emulator::await_block`].

use super::{Provider, ProviderError};
use crate::address::{Address, Credential};
use crate::assets::{Assets, Unit};
use crate::codec::{CborCodec, TxCodec};
use crate::hash::{DatumHash, KeyHash, ScriptHash, TxHash};
use crate::transaction::{Certificate, DatumOption, Transaction};
use crate::types::{
    EvalRedeemer, ExUnits, OutRef, PlutusData, ProtocolParameters, RedeemerTag, Script,
    ScriptType, SlotConfig, Utxo,
};
use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

const SLOTS_PER_BLOCK: u64 = 20;
const EMULATOR_NETWORK_ID: u8 = 0;

/// Genesis allocation
#[derive(Debug, Clone)]
pub struct EmulatorAccount {
    pub address: Address,
    pub assets: Assets,
}

impl EmulatorAccount {
    pub fn new(address: Address, assets: Assets) -> Self {
        Self { address, assets }
    }
}

#[derive(Default)]
struct Ledger {
    slot: u64,
    block_height: u64,
    utxos: BTreeMap<OutRef, Utxo>,
    mempool: Vec<(TxHash, Transaction)>,
    pending_spent: HashSet<OutRef>,
    datums: HashMap<DatumHash, PlutusData>,
    /// Registered reward accounts and their balances
    rewards: BTreeMap<Address, u64>,
    applied: HashSet<TxHash>,
}

pub struct Emulator {
    ledger: Mutex<Ledger>,
    params: ProtocolParameters,
    slot_config: SlotConfig,
    codec: CborCodec,
    evaluation_budget: ExUnits,
}

impl Emulator {
    pub fn new(accounts: Vec<EmulatorAccount>) -> Self {
        let zero_time_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut ledger = Ledger::default();
        let genesis = TxHash::new([0; 32]);
        for (index, account) in accounts.into_iter().enumerate() {
            let out_ref = OutRef::new(genesis, index as u64);
            ledger
                .utxos
                .insert(out_ref, Utxo::new(out_ref, account.address, account.assets));
        }
        Self {
            ledger: Mutex::new(ledger),
            params: ProtocolParameters::default(),
            slot_config: SlotConfig {
                zero_time_ms,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
            codec: CborCodec::new(),
            evaluation_budget: ExUnits::new(1_000_000, 500_000_000),
        }
    }

    pub fn with_protocol_parameters(mut self, params: ProtocolParameters) -> Self {
        self.params = params;
        self
    }

    /// Budget reported for every redeemer by `evaluate_tx`
    pub fn with_evaluation_budget(mut self, budget: ExUnits) -> Self {
        self.evaluation_budget = budget;
        self
    }

    pub fn slot_config(&self) -> SlotConfig {
        self.slot_config
    }

    pub fn current_slot(&self) -> u64 {
        self.ledger.lock().slot
    }

    pub fn block_height(&self) -> u64 {
        self.ledger.lock().block_height
    }

    /// Unix time (ms) of the current slot
    pub fn now(&self) -> u64 {
        self.slot_config.slot_to_unix_time(self.current_slot())
    }

    pub fn mempool_len(&self) -> usize {
        self.ledger.lock().mempool.len()
    }

    pub fn ledger_utxos(&self) -> Vec<Utxo> {
        self.ledger.lock().utxos.values().cloned().collect()
    }

    pub fn reward_balance(&self, reward_address: &Address) -> Option<u64> {
        self.ledger.lock().rewards.get(reward_address).copied()
    }

    /// Credit rewards to a registered account; no-op otherwise
    pub fn distribute_rewards(&self, reward_address: &Address, amount: u64) {
        if let Some(balance) = self.ledger.lock().rewards.get_mut(reward_address) {
            *balance += amount;
        }
    }

    /// Advance `blocks` blocks, applying the mempool at the first one
    pub fn await_block(&self, blocks: u64) {
        let mut ledger = self.ledger.lock();
        ledger.slot += SLOTS_PER_BLOCK * blocks;
        ledger.block_height += blocks;
        self.apply_mempool(&mut ledger);
    }

    /// Advance `slots` slots, applying the mempool
    pub fn await_slot(&self, slots: u64) {
        let mut ledger = self.ledger.lock();
        ledger.slot += slots;
        self.apply_mempool(&mut ledger);
    }

    fn apply_mempool(&self, ledger: &mut Ledger) {
        let pending = std::mem::take(&mut ledger.mempool);
        for (tx_hash, tx) in pending {
            apply_transaction(ledger, tx_hash, &tx);
            info!(tx_hash = %tx_hash, slot = ledger.slot, "📦 Emulator applied transaction");
        }
        ledger.pending_spent.clear();
    }

    fn resolve(ledger: &Ledger, out_ref: &OutRef) -> Result<Utxo, String> {
        if ledger.pending_spent.contains(out_ref) {
            return Err(format!("BadInputsUTxO: {} already spent in mempool", out_ref));
        }
        ledger
            .utxos
            .get(out_ref)
            .cloned()
            .ok_or_else(|| format!("BadInputsUTxO: {} not found", out_ref))
    }

    fn validate(&self, ledger: &Ledger, tx: &Transaction, tx_hash: &TxHash, size: usize) -> Result<(), String> {
        let body = &tx.body;
        let params = &self.params;

        if body.validity_start.is_some_and(|start| ledger.slot < start)
            || body.ttl.is_some_and(|ttl| ledger.slot >= ttl)
        {
            return Err(format!(
                "OutsideValidityIntervalUTxO: slot {} not in [{:?}, {:?})",
                ledger.slot, body.validity_start, body.ttl
            ));
        }
        if size as u64 > params.max_tx_size {
            return Err(format!("MaxTxSizeUTxO: {} > {}", size, params.max_tx_size));
        }

        match (&body.auxiliary_data_hash, &tx.auxiliary_data) {
            (None, None) => {}
            (Some(declared), Some(aux)) => {
                let actual = self.codec.hash_auxiliary_data(aux).map_err(|e| e.to_string())?;
                if actual != *declared {
                    return Err(format!("ConflictingMetadataHash: {} != {}", declared, actual));
                }
            }
            (Some(declared), None) => return Err(format!("MissingTxMetadata: {}", declared)),
            (None, Some(_)) => return Err("MissingTxBodyMetadataHash".to_string()),
        }

        let mut inputs: Vec<OutRef> = body.inputs.clone();
        inputs.sort();
        inputs.dedup();
        if inputs.is_empty() {
            return Err("InputSetEmptyUTxO".to_string());
        }
        let spent: Vec<Utxo> = inputs
            .iter()
            .map(|r| Self::resolve(ledger, r))
            .collect::<Result<_, _>>()?;
        let referenced: Vec<Utxo> = body
            .reference_inputs
            .iter()
            .map(|r| Self::resolve(ledger, r))
            .collect::<Result<_, _>>()?;
        let collateral: Vec<Utxo> = body
            .collateral
            .iter()
            .map(|r| Self::resolve(ledger, r))
            .collect::<Result<_, _>>()?;

        // Signatures
        let mut signers: Vec<KeyHash> = Vec::new();
        for witness in &tx.witness_set.vkey_witnesses {
            let key = VerifyingKey::from_bytes(&witness.vkey)
                .map_err(|e| format!("InvalidWitnessesUTXOW: {}", e))?;
            let signature = Signature::from_bytes(&witness.signature);
            key.verify(tx_hash.as_bytes(), &signature)
                .map_err(|_| "InvalidWitnessesUTXOW: bad signature".to_string())?;
            signers.push(witness.key_hash());
        }

        // Scripts visible to this transaction
        let mut scripts: BTreeMap<ScriptHash, Script> = BTreeMap::new();
        for script in tx.witness_set.scripts() {
            scripts.insert(script.hash(), script);
        }
        let mut ref_script_bytes = 0u64;
        for utxo in spent.iter().chain(referenced.iter()) {
            if let Some(script) = &utxo.script_ref {
                ref_script_bytes += script.size() as u64;
                scripts.insert(script.hash(), script.clone());
            }
        }

        // Who must authorize what
        let mut required_keys: BTreeSet<KeyHash> = body.required_signers.iter().copied().collect();
        let mut purposes: Vec<(RedeemerTag, u64, ScriptHash)> = Vec::new();
        let mut need = |tag: RedeemerTag, index: usize, cred: Option<&Credential>| match cred {
            Some(Credential::Key(key)) => {
                required_keys.insert(*key);
            }
            Some(Credential::Script(hash)) => purposes.push((tag, index as u64, *hash)),
            None => {}
        };
        for (i, utxo) in spent.iter().enumerate() {
            need(RedeemerTag::Spend, i, utxo.address.payment_credential().as_ref());
        }
        for (i, policy) in body.mint.policies().iter().enumerate() {
            need(RedeemerTag::Mint, i, Some(&Credential::Script(*policy)));
        }
        for (i, cert) in body.certificates.iter().enumerate() {
            need(RedeemerTag::Cert, i, cert.witness_credential());
        }
        for (i, addr) in body.withdrawals.keys().enumerate() {
            need(RedeemerTag::Reward, i, addr.stake_credential().as_ref());
        }
        for utxo in &collateral {
            if let Some(Credential::Key(key)) = utxo.address.payment_credential() {
                required_keys.insert(key);
            }
        }
        if let Some(missing) = required_keys.iter().find(|k| !signers.contains(k)) {
            return Err(format!("MissingVKeyWitnessesUTXOW: {}", missing));
        }

        let redeemer_keys: BTreeSet<(RedeemerTag, u64)> = tx
            .witness_set
            .redeemers
            .iter()
            .map(|r| (r.tag, r.index))
            .collect();
        let mut languages: BTreeSet<ScriptType> = BTreeSet::new();
        let mut expected_redeemers: BTreeSet<(RedeemerTag, u64)> = BTreeSet::new();
        for (tag, index, hash) in &purposes {
            let script = scripts
                .get(hash)
                .ok_or_else(|| format!("MissingScriptWitnessesUTXOW: {}", hash))?;
            if script.script_type.is_plutus() {
                languages.insert(script.script_type);
                expected_redeemers.insert((*tag, *index));
                if !redeemer_keys.contains(&(*tag, *index)) {
                    return Err(format!("MissingRedeemers: {}:{}", tag, index));
                }
            } else {
                let native = script
                    .native()
                    .ok_or_else(|| format!("MalformedScriptWitnesses: {}", hash))?;
                if !native.is_satisfied(&signers, body.validity_start, body.ttl) {
                    return Err(format!("ScriptWitnessNotValidatingUTXOW: {}", hash));
                }
            }
        }
        if let Some(extra) = redeemer_keys.iter().find(|k| !expected_redeemers.contains(k)) {
            return Err(format!("ExtraRedeemers: {}:{}", extra.0, extra.1));
        }

        // Datums for hash-locked Plutus inputs
        let witness_datums: BTreeSet<DatumHash> =
            tx.witness_set.plutus_data.iter().map(|d| d.hash()).collect();
        for (i, utxo) in spent.iter().enumerate() {
            let is_plutus_spend = purposes
                .iter()
                .any(|(tag, idx, _)| *tag == RedeemerTag::Spend && *idx == i as u64)
                && expected_redeemers.contains(&(RedeemerTag::Spend, i as u64));
            if let (true, Some(hash)) = (is_plutus_spend, utxo.datum_hash) {
                if !witness_datums.contains(&hash) {
                    return Err(format!("MissingRequiredDatums: {}", hash));
                }
            }
        }

        let ex_units = tx.witness_set.total_ex_units();
        if !tx.witness_set.redeemers.is_empty() {
            if ex_units.mem > params.max_tx_ex_mem || ex_units.steps > params.max_tx_ex_steps {
                return Err(format!("ExUnitsTooBigUTxO: {:?}", ex_units));
            }
            let expected_hash = self
                .codec
                .script_data_hash(
                    &tx.witness_set.redeemers,
                    &tx.witness_set.plutus_data,
                    &languages,
                    &params.cost_models,
                )
                .map_err(|e| e.to_string())?;
            if body.script_data_hash != Some(expected_hash) {
                return Err("PPViewHashesDontMatch".to_string());
            }
            if collateral.is_empty() {
                return Err("NoCollateralInputs".to_string());
            }
            let collateral_total: i128 = collateral.iter().map(|u| u.assets.lovelace()).sum();
            let returned = body
                .collateral_return
                .as_ref()
                .map(|o| o.value.lovelace())
                .unwrap_or(0);
            let posted = collateral_total - returned;
            if posted < params.required_collateral(body.fee) as i128 {
                return Err(format!("InsufficientCollateral: {}", posted));
            }
            if let Some(total) = body.total_collateral {
                if total as i128 != posted {
                    return Err("IncorrectTotalCollateralField".to_string());
                }
            }
        }

        let min_fee = params.min_fee(size, ex_units, ref_script_bytes);
        if body.fee < min_fee {
            return Err(format!("FeeTooSmallUTxO: {} < {}", body.fee, min_fee));
        }

        for output in body.outputs.iter().chain(body.collateral_return.iter()) {
            let output_size = self.codec.encode_output(output).map_err(|e| e.to_string())?.len();
            let min_ada = params.min_ada_for_size(output_size) as i128;
            if output.value.lovelace() < min_ada {
                return Err(format!(
                    "BabbageOutputTooSmallUTxO: {} < {}",
                    output.value.lovelace(),
                    min_ada
                ));
            }
        }

        // Withdrawals drain the whole reward balance
        for (addr, amount) in &body.withdrawals {
            match ledger.rewards.get(addr) {
                Some(balance) if balance == amount => {}
                _ => return Err(format!("WithdrawalsNotInRewardsCERTS: {}", addr)),
            }
        }

        let mut consumed = Assets::sum(spent.iter().map(|u| &u.assets));
        consumed.merge(&body.mint);
        let withdrawn: u64 = body.withdrawals.values().sum();
        let refunds: u64 = body
            .certificates
            .iter()
            .map(|c| c.refund(params.key_deposit))
            .sum();
        consumed.adjust(Unit::Lovelace, (withdrawn + refunds) as i128);

        let mut produced = Assets::sum(body.outputs.iter().map(|o| &o.value));
        let deposits: u64 = body
            .certificates
            .iter()
            .map(|c| c.deposit(params.key_deposit))
            .sum();
        produced.adjust(Unit::Lovelace, (body.fee + deposits) as i128);

        if consumed != produced {
            return Err(format!(
                "ValueNotConservedUTxO: consumed {} produced {}",
                consumed, produced
            ));
        }
        Ok(())
    }
}

fn reward_address_of(cred: &Credential) -> Address {
    Address::reward(EMULATOR_NETWORK_ID, *cred)
}

fn apply_transaction(ledger: &mut Ledger, tx_hash: TxHash, tx: &Transaction) {
    let body = &tx.body;
    for input in &body.inputs {
        ledger.utxos.remove(input);
    }
    for datum in &tx.witness_set.plutus_data {
        ledger.datums.insert(datum.hash(), datum.clone());
    }
    for (index, output) in body.outputs.iter().enumerate() {
        let out_ref = OutRef::new(tx_hash, index as u64);
        let mut utxo = Utxo::new(out_ref, output.address.clone(), output.value.clone());
        match &output.datum {
            Some(DatumOption::Hash(hash)) => {
                utxo.datum_hash = Some(*hash);
            }
            Some(DatumOption::Inline(data)) => {
                ledger.datums.insert(data.hash(), data.clone());
                utxo.datum = Some(data.clone());
            }
            None => {}
        }
        utxo.script_ref = output.script_ref.clone();
        ledger.utxos.insert(out_ref, utxo);
    }
    for cert in &body.certificates {
        match cert {
            Certificate::StakeRegistration(cred)
            | Certificate::StakeRegistrationDelegation { stake: cred, .. }
            | Certificate::VoteRegistrationDelegation { stake: cred, .. }
            | Certificate::StakeVoteRegistrationDelegation { stake: cred, .. } => {
                ledger.rewards.entry(reward_address_of(cred)).or_insert(0);
            }
            Certificate::StakeDeregistration(cred) => {
                ledger.rewards.remove(&reward_address_of(cred));
            }
            _ => {}
        }
    }
    for addr in body.withdrawals.keys() {
        if let Some(balance) = ledger.rewards.get_mut(addr) {
            *balance = 0;
        }
    }
    ledger.applied.insert(tx_hash);
}

#[async_trait]
impl Provider for Emulator {
    async fn get_protocol_parameters(&self) -> Result<ProtocolParameters, ProviderError> {
        Ok(self.params.clone())
    }

    async fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ProviderError> {
        let ledger = self.ledger.lock();
        Ok(ledger
            .utxos
            .values()
            .filter(|u| &u.address == address && !ledger.pending_spent.contains(&u.out_ref))
            .cloned()
            .collect())
    }

    async fn get_utxos_with_unit(
        &self,
        address: &Address,
        unit: &Unit,
    ) -> Result<Vec<Utxo>, ProviderError> {
        Ok(self
            .get_utxos(address)
            .await?
            .into_iter()
            .filter(|u| u.assets.get(unit) > 0)
            .collect())
    }

    async fn get_utxo_by_unit(&self, unit: &Unit) -> Result<Utxo, ProviderError> {
        let ledger = self.ledger.lock();
        let mut holders = ledger.utxos.values().filter(|u| u.assets.get(unit) > 0);
        match (holders.next(), holders.next()) {
            (Some(utxo), None) => Ok(utxo.clone()),
            (None, _) => Err(ProviderError::NotFound(format!("no UTxO holds {}", unit))),
            (Some(_), Some(_)) => Err(ProviderError::InvalidResponse(format!(
                "{} is held by more than one UTxO",
                unit
            ))),
        }
    }

    async fn get_utxos_by_out_ref(&self, out_refs: &[OutRef]) -> Result<Vec<Utxo>, ProviderError> {
        let ledger = self.ledger.lock();
        Ok(out_refs
            .iter()
            .filter_map(|r| ledger.utxos.get(r).cloned())
            .collect())
    }

    async fn get_datum(&self, hash: &DatumHash) -> Result<PlutusData, ProviderError> {
        self.ledger
            .lock()
            .datums
            .get(hash)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("datum {}", hash)))
    }

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxHash, ProviderError> {
        let tx = self
            .codec
            .decode_transaction(tx_cbor)
            .map_err(|e| ProviderError::Rejected(format!("DeserialiseFailure: {}", e)))?;
        let tx_hash = self.codec.hash_body(&tx.body)?;

        let mut ledger = self.ledger.lock();
        if ledger.applied.contains(&tx_hash) || ledger.mempool.iter().any(|(h, _)| *h == tx_hash) {
            return Err(ProviderError::Rejected(format!("duplicate transaction {}", tx_hash)));
        }
        if let Err(reason) = self.validate(&ledger, &tx, &tx_hash, tx_cbor.len()) {
            debug!(tx_hash = %tx_hash, reason = %reason, "Emulator rejected transaction");
            return Err(ProviderError::Rejected(reason));
        }
        for input in &tx.body.inputs {
            ledger.pending_spent.insert(*input);
        }
        ledger.mempool.push((tx_hash, tx));
        info!(tx_hash = %tx_hash, "📨 Emulator accepted transaction into mempool");
        Ok(tx_hash)
    }

    async fn evaluate_tx(
        &self,
        tx_cbor: &[u8],
        _additional_utxos: &[Utxo],
    ) -> Result<Vec<EvalRedeemer>, ProviderError> {
        let tx = self.codec.decode_transaction(tx_cbor)?;
        Ok(tx
            .witness_set
            .redeemers
            .iter()
            .map(|r| EvalRedeemer {
                tag: r.tag,
                index: r.index,
                ex_units: self.evaluation_budget,
            })
            .collect())
    }

    async fn await_tx(&self, tx_hash: &TxHash) -> Result<bool, ProviderError> {
        let queued = self.ledger.lock().mempool.iter().any(|(h, _)| h == tx_hash);
        if queued {
            self.await_block(1);
        }
        Ok(self.ledger.lock().applied.contains(tx_hash))
    }
}
