//! In-memory transaction model (Conway-era layout)

use crate::address::{Address, Credential};
use crate::assets::Assets;
use crate::hash::{AuxiliaryDataHash, DatumHash, KeyHash, ScriptDataHash};
use crate::metadata::AuxiliaryData;
use crate::types::{ExUnits, OutRef, PlutusData, RedeemerTag, Script};
use std::collections::BTreeMap;

/// Datum attached to an output on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatumOption {
    Hash(DatumHash),
    Inline(PlutusData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub address: Address,
    pub value: Assets,
    pub datum: Option<DatumOption>,
    pub script_ref: Option<Script>,
}

impl TransactionOutput {
    pub fn new(address: Address, value: Assets) -> Self {
        Self {
            address,
            value,
            datum: None,
            script_ref: None,
        }
    }

    pub fn lovelace(&self) -> i128 {
        self.value.lovelace()
    }
}

/// Delegation target for governance votes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DRep {
    Key(KeyHash),
    Script(crate::hash::ScriptHash),
    AlwaysAbstain,
    AlwaysNoConfidence,
}

/// Off-chain metadata pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub url: String,
    pub data_hash: [u8; 32],
}

/// Pool operators are identified by the hash of their cold key
pub type PoolId = KeyHash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    StakeRegistration(Credential),
    StakeDeregistration(Credential),
    StakeDelegation { stake: Credential, pool: PoolId },
    VoteDelegation { stake: Credential, drep: DRep },
    StakeVoteDelegation { stake: Credential, pool: PoolId, drep: DRep },
    StakeRegistrationDelegation { stake: Credential, pool: PoolId, deposit: u64 },
    VoteRegistrationDelegation { stake: Credential, drep: DRep, deposit: u64 },
    StakeVoteRegistrationDelegation {
        stake: Credential,
        pool: PoolId,
        drep: DRep,
        deposit: u64,
    },
    AuthCommitteeHot { cold: Credential, hot: Credential },
    ResignCommitteeCold { cold: Credential, anchor: Option<Anchor> },
    DRepRegistration { drep: Credential, deposit: u64, anchor: Option<Anchor> },
    DRepDeregistration { drep: Credential, refund: u64 },
    DRepUpdate { drep: Credential, anchor: Option<Anchor> },
}

impl Certificate {
    /// Credential whose owner must witness the certificate, if any
    pub fn witness_credential(&self) -> Option<&Credential> {
        match self {
            Self::StakeRegistration(_) => None,
            Self::StakeDeregistration(cred) => Some(cred),
            Self::StakeDelegation { stake, .. }
            | Self::VoteDelegation { stake, .. }
            | Self::StakeVoteDelegation { stake, .. }
            | Self::StakeRegistrationDelegation { stake, .. }
            | Self::VoteRegistrationDelegation { stake, .. }
            | Self::StakeVoteRegistrationDelegation { stake, .. } => Some(stake),
            Self::AuthCommitteeHot { cold, .. } | Self::ResignCommitteeCold { cold, .. } => Some(cold),
            Self::DRepRegistration { drep, .. }
            | Self::DRepDeregistration { drep, .. }
            | Self::DRepUpdate { drep, .. } => Some(drep),
        }
    }

    /// Lovelace locked by this certificate
    pub fn deposit(&self, key_deposit: u64) -> u64 {
        match self {
            Self::StakeRegistration(_) => key_deposit,
            Self::StakeRegistrationDelegation { deposit, .. }
            | Self::VoteRegistrationDelegation { deposit, .. }
            | Self::StakeVoteRegistrationDelegation { deposit, .. }
            | Self::DRepRegistration { deposit, .. } => *deposit,
            _ => 0,
        }
    }

    /// Lovelace released by this certificate
    pub fn refund(&self, key_deposit: u64) -> u64 {
        match self {
            Self::StakeDeregistration(_) => key_deposit,
            Self::DRepDeregistration { refund, .. } => *refund,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    pub index: u64,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VkeyWitness {
    pub vkey: [u8; 32],
    pub signature: [u8; 64],
}

impl VkeyWitness {
    pub fn key_hash(&self) -> KeyHash {
        KeyHash::of_vkey(&self.vkey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WitnessSet {
    pub vkey_witnesses: Vec<VkeyWitness>,
    /// CBOR encodings of native scripts
    pub native_scripts: Vec<Vec<u8>>,
    pub plutus_v1_scripts: Vec<Vec<u8>>,
    pub plutus_v2_scripts: Vec<Vec<u8>>,
    pub plutus_v3_scripts: Vec<Vec<u8>>,
    pub plutus_data: Vec<PlutusData>,
    pub redeemers: Vec<Redeemer>,
}

impl WitnessSet {
    /// Add vkey witnesses from `other`, skipping keys already present
    pub fn merge_vkeys(&mut self, other: &WitnessSet) {
        for witness in &other.vkey_witnesses {
            if !self.vkey_witnesses.iter().any(|w| w.vkey == witness.vkey) {
                self.vkey_witnesses.push(witness.clone());
            }
        }
    }

    /// Scripts carried in this witness set, with their language
    pub fn scripts(&self) -> Vec<Script> {
        use crate::types::ScriptType;
        let tagged = [
            (ScriptType::Native, &self.native_scripts),
            (ScriptType::PlutusV1, &self.plutus_v1_scripts),
            (ScriptType::PlutusV2, &self.plutus_v2_scripts),
            (ScriptType::PlutusV3, &self.plutus_v3_scripts),
        ];
        tagged
            .into_iter()
            .flat_map(|(ty, scripts)| scripts.iter().map(move |b| Script::new(ty, b.clone())))
            .collect()
    }

    pub fn total_ex_units(&self) -> ExUnits {
        self.redeemers
            .iter()
            .fold(ExUnits::default(), |acc, r| acc.saturating_add(r.ex_units))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionBody {
    pub inputs: Vec<OutRef>,
    pub outputs: Vec<TransactionOutput>,
    pub fee: u64,
    pub ttl: Option<u64>,
    pub certificates: Vec<Certificate>,
    /// Reward address -> withdrawn lovelace
    pub withdrawals: BTreeMap<Address, u64>,
    pub auxiliary_data_hash: Option<AuxiliaryDataHash>,
    pub validity_start: Option<u64>,
    pub mint: Assets,
    pub script_data_hash: Option<ScriptDataHash>,
    pub collateral: Vec<OutRef>,
    pub required_signers: Vec<KeyHash>,
    pub network_id: Option<u8>,
    pub collateral_return: Option<TransactionOutput>,
    pub total_collateral: Option<u64>,
    pub reference_inputs: Vec<OutRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witness_set: WitnessSet,
    pub is_valid: bool,
    /// Committed to by `body.auxiliary_data_hash`
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl Transaction {
    pub fn new(body: TransactionBody, witness_set: WitnessSet) -> Self {
        Self {
            body,
            witness_set,
            is_valid: true,
            auxiliary_data: None,
        }
    }
}
