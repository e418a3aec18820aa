//! Fixed-size hash identifiers and the blake2b digests used to derive them

use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A hex string did not decode into a hash of the expected width
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} '{input}': expected {expected} bytes of hex")]
pub struct HashParseError {
    pub kind: &'static str,
    pub input: String,
    pub expected: usize,
}

/// blake2b with a 224-bit digest (key hashes, script hashes)
pub fn blake2b_224(data: &[u8]) -> [u8; 28] {
    let digest = Blake2b::<U28>::digest(data);
    let mut out = [0u8; 28];
    out.copy_from_slice(&digest);
    out
}

/// blake2b with a 256-bit digest (transaction, datum and script-data hashes)
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let digest = Blake2b::<U32>::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

macro_rules! fixed_hash {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(bytes).ok().map(Self)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = HashParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let err = || HashParseError {
                    kind: $kind,
                    input: s.to_string(),
                    expected: $len,
                };
                let bytes = hex::decode(s).map_err(|_| err())?;
                Self::from_slice(&bytes).ok_or_else(err)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_hash!(
    /// blake2b-224 of an ed25519 verification key
    KeyHash, 28, "key hash"
);
fixed_hash!(
    /// blake2b-224 of a language-tagged script; doubles as a minting policy id
    ScriptHash, 28, "script hash"
);
fixed_hash!(
    /// blake2b-256 of a serialized transaction body
    TxHash, 32, "transaction hash"
);
fixed_hash!(
    /// blake2b-256 of serialized Plutus data
    DatumHash, 32, "datum hash"
);
fixed_hash!(
    /// Integrity hash over redeemers, datums and cost-model language views
    ScriptDataHash, 32, "script data hash"
);
fixed_hash!(
    /// blake2b-256 of serialized auxiliary data
    AuxiliaryDataHash, 32, "auxiliary data hash"
);

/// Minting policies are identified by the hash of their script
pub type PolicyId = ScriptHash;

impl KeyHash {
    /// Hash of a raw 32-byte verification key
    pub fn of_vkey(vkey: &[u8]) -> Self {
        Self(blake2b_224(vkey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip_and_width_check() {
        let hash = TxHash::new([0xab; 32]);
        let parsed: TxHash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);

        let err = "abcd".parse::<KeyHash>().unwrap_err();
        assert_eq!(err.expected, 28);
        assert!("zz".repeat(28).parse::<KeyHash>().is_err());
    }

    #[test]
    fn test_blake2b_known_vector() {
        // blake2b-256 of the empty string
        assert_eq!(
            hex::encode(blake2b_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
        assert_eq!(blake2b_224(b"abc").len(), 28);
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let low = TxHash::new([0x00; 32]);
        let high = TxHash::new([0xff; 32]);
        assert!(low < high);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = ScriptHash::new([1; 28]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(28)));
        let back: ScriptHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
