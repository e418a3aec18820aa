//! Shelley and Byron address bytes with structural validation
//!
//! Addresses are carried as raw bytes (header byte followed by credentials)
//! and parsed from hex. The header's high nibble selects the address kind,
//! the low nibble carries the network id.

use crate::hash::{KeyHash, ScriptHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const CREDENTIAL_LEN: usize = 28;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is not valid hex: {0}")]
    InvalidHex(String),

    #[error("Address is empty")]
    Empty,

    #[error("Unknown address header type {header:#04x}")]
    UnknownHeader { header: u8 },

    #[error("Address of kind {kind:?} must be {expected} bytes, got {actual}")]
    InvalidLength {
        kind: AddressKind,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed pointer in address")]
    InvalidPointer,
}

/// Payment or stake credential
///
/// Ordered the way the ledger orders credentials: scripts first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Credential {
    Script(ScriptHash),
    Key(KeyHash),
}

impl Credential {
    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }

    pub fn key_hash(&self) -> Option<&KeyHash> {
        match self {
            Self::Key(hash) => Some(hash),
            Self::Script(_) => None,
        }
    }

    pub fn script_hash(&self) -> Option<&ScriptHash> {
        match self {
            Self::Key(_) => None,
            Self::Script(hash) => Some(hash),
        }
    }

    fn bytes(&self) -> &[u8; 28] {
        match self {
            Self::Key(hash) => hash.as_bytes(),
            Self::Script(hash) => hash.as_bytes(),
        }
    }

    fn from_bytes(bytes: &[u8], script: bool) -> Option<Self> {
        if script {
            ScriptHash::from_slice(bytes).map(Self::Script)
        } else {
            KeyHash::from_slice(bytes).map(Self::Key)
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddressKind {
    Base,
    Pointer,
    Enterprise,
    Byron,
    Reward,
}

/// A validated address
///
/// Reward addresses order like the ledger's reward accounts, by network and
/// then credential; every other address orders by its bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    bytes: Vec<u8>,
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Address {
    /// Validate raw address bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AddressError> {
        let header = *bytes.first().ok_or(AddressError::Empty)?;
        let kind = kind_of(header)?;
        let expected = match kind {
            AddressKind::Base => Some(1 + 2 * CREDENTIAL_LEN),
            AddressKind::Enterprise | AddressKind::Reward => Some(1 + CREDENTIAL_LEN),
            AddressKind::Pointer | AddressKind::Byron => None,
        };
        if let Some(expected) = expected {
            if bytes.len() != expected {
                return Err(AddressError::InvalidLength {
                    kind,
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        if kind == AddressKind::Pointer {
            validate_pointer(&bytes)?;
        }
        if kind == AddressKind::Byron && bytes.len() < 2 {
            return Err(AddressError::InvalidLength {
                kind,
                expected: 2,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn enterprise(network_id: u8, payment: Credential) -> Self {
        let header = 0x60 | (payment.is_script() as u8) << 4 | (network_id & 0x0f);
        Self::assemble(header, &[payment.bytes()])
    }

    pub fn base(network_id: u8, payment: Credential, stake: Credential) -> Self {
        let kind = (payment.is_script() as u8) | (stake.is_script() as u8) << 1;
        let header = kind << 4 | (network_id & 0x0f);
        Self::assemble(header, &[payment.bytes(), stake.bytes()])
    }

    pub fn reward(network_id: u8, stake: Credential) -> Self {
        let header = 0xe0 | (stake.is_script() as u8) << 4 | (network_id & 0x0f);
        Self::assemble(header, &[stake.bytes()])
    }

    fn assemble(header: u8, credentials: &[&[u8; 28]]) -> Self {
        let mut bytes = Vec::with_capacity(1 + credentials.len() * CREDENTIAL_LEN);
        bytes.push(header);
        for cred in credentials {
            bytes.extend_from_slice(&cred[..]);
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    fn header(&self) -> u8 {
        self.bytes[0]
    }

    fn ordering_key(&self) -> (bool, u8, Option<Credential>, &[u8]) {
        match self.stake_credential().filter(|_| self.is_reward()) {
            Some(credential) => (true, self.header() & 0x0f, Some(credential), &[]),
            None => (false, 0, None, &self.bytes),
        }
    }

    pub fn kind(&self) -> AddressKind {
        // Construction guarantees a known header
        kind_of(self.header()).unwrap_or(AddressKind::Byron)
    }

    /// Network id from the header; Byron addresses report none
    pub fn network_id(&self) -> Option<u8> {
        match self.kind() {
            AddressKind::Byron => None,
            _ => Some(self.header() & 0x0f),
        }
    }

    pub fn payment_credential(&self) -> Option<Credential> {
        let header = self.header() >> 4;
        match self.kind() {
            AddressKind::Base | AddressKind::Pointer | AddressKind::Enterprise => {
                Credential::from_bytes(&self.bytes[1..1 + CREDENTIAL_LEN], header & 0x01 == 1)
            }
            AddressKind::Reward | AddressKind::Byron => None,
        }
    }

    pub fn stake_credential(&self) -> Option<Credential> {
        let header = self.header() >> 4;
        match self.kind() {
            AddressKind::Base => Credential::from_bytes(
                &self.bytes[1 + CREDENTIAL_LEN..1 + 2 * CREDENTIAL_LEN],
                header & 0x02 == 2,
            ),
            AddressKind::Reward => {
                Credential::from_bytes(&self.bytes[1..1 + CREDENTIAL_LEN], header & 0x01 == 1)
            }
            _ => None,
        }
    }

    pub fn is_reward(&self) -> bool {
        self.kind() == AddressKind::Reward
    }

    /// Reward address sharing this address's stake credential
    pub fn to_reward_address(&self) -> Option<Address> {
        let network_id = self.network_id()?;
        self.stake_credential().map(|cred| Address::reward(network_id, cred))
    }
}

fn kind_of(header: u8) -> Result<AddressKind, AddressError> {
    match header >> 4 {
        0..=3 => Ok(AddressKind::Base),
        4 | 5 => Ok(AddressKind::Pointer),
        6 | 7 => Ok(AddressKind::Enterprise),
        8 => Ok(AddressKind::Byron),
        14 | 15 => Ok(AddressKind::Reward),
        _ => Err(AddressError::UnknownHeader { header }),
    }
}

/// Pointer addresses carry three variable-length naturals after the payment
/// credential (slot, tx index, cert index, 7 bits per byte, high bit = more)
fn validate_pointer(bytes: &[u8]) -> Result<(), AddressError> {
    let mut rest = bytes.get(1 + CREDENTIAL_LEN..).ok_or(AddressError::InvalidPointer)?;
    for _ in 0..3 {
        let end = rest
            .iter()
            .position(|b| b & 0x80 == 0)
            .ok_or(AddressError::InvalidPointer)?;
        rest = &rest[end + 1..];
    }
    if rest.is_empty() {
        Ok(())
    } else {
        Err(AddressError::InvalidPointer)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
