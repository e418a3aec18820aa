//! Transaction metadata carried in auxiliary data
//!
//! Metadata is a map from `u64` labels to [`Metadatum`] trees. The ledger
//! caps text and byte strings at 64 bytes and integers at the CBOR integer
//! range; [`Metadatum::validate`] applies those limits before anything is
//! queued on a builder.

use std::collections::BTreeMap;
use thiserror::Error;

/// Longest text or byte string a metadatum may hold
pub const MAX_METADATUM_BYTES: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("{kind} of {len} bytes exceeds the {MAX_METADATUM_BYTES}-byte limit")]
    TooLong { kind: &'static str, len: usize },

    #[error("Integer {0} is outside the metadata range")]
    IntOutOfRange(i128),

    #[error("JSON {0} has no metadata form")]
    Unrepresentable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Metadatum {
    Int(i128),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<Metadatum>),
    Map(BTreeMap<Metadatum, Metadatum>),
}

impl Metadatum {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Metadatum>,
        V: Into<Metadatum>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Check string lengths and integer bounds throughout the tree
    pub fn validate(&self) -> Result<(), MetadataError> {
        match self {
            Self::Int(n) => {
                let min = -(u64::MAX as i128) - 1;
                if *n < min || *n > u64::MAX as i128 {
                    return Err(MetadataError::IntOutOfRange(*n));
                }
            }
            Self::Bytes(b) if b.len() > MAX_METADATUM_BYTES => {
                return Err(MetadataError::TooLong {
                    kind: "Byte string",
                    len: b.len(),
                })
            }
            Self::Text(t) if t.len() > MAX_METADATUM_BYTES => {
                return Err(MetadataError::TooLong {
                    kind: "Text",
                    len: t.len(),
                })
            }
            Self::Bytes(_) | Self::Text(_) => {}
            Self::List(items) => items.iter().try_for_each(Metadatum::validate)?,
            Self::Map(entries) => {
                for (k, v) in entries {
                    k.validate()?;
                    v.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Objects become text-keyed maps, arrays lists, integers ints. Text
    /// longer than the string limit is split into a list of chunks on
    /// character boundaries.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, MetadataError> {
        use serde_json::Value as Json;
        match value {
            Json::Number(n) => n
                .as_i64()
                .map(|v| v as i128)
                .or_else(|| n.as_u64().map(|v| v as i128))
                .map(Self::Int)
                .ok_or_else(|| MetadataError::Unrepresentable(n.to_string())),
            Json::String(s) if s.len() <= MAX_METADATUM_BYTES => Ok(Self::text(s.as_str())),
            Json::String(s) => Ok(Self::List(chunk_text(s).into_iter().map(Self::Text).collect())),
            Json::Array(items) => items.iter().map(Self::from_json).collect::<Result<_, _>>().map(Self::List),
            Json::Object(fields) => {
                let mut entries = BTreeMap::new();
                for (key, value) in fields {
                    if key.len() > MAX_METADATUM_BYTES {
                        return Err(MetadataError::TooLong {
                            kind: "Map key",
                            len: key.len(),
                        });
                    }
                    entries.insert(Self::text(key.as_str()), Self::from_json(value)?);
                }
                Ok(Self::Map(entries))
            }
            other => Err(MetadataError::Unrepresentable(other.to_string())),
        }
    }
}

fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > MAX_METADATUM_BYTES {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl From<&str> for Metadatum {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Metadatum {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Metadatum {
    fn from(n: i64) -> Self {
        Self::Int(n as i128)
    }
}

impl From<u64> for Metadatum {
    fn from(n: u64) -> Self {
        Self::Int(n as i128)
    }
}

impl From<Vec<u8>> for Metadatum {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<Metadatum>> for Metadatum {
    fn from(items: Vec<Metadatum>) -> Self {
        Self::List(items)
    }
}

/// Auxiliary data of a transaction; only its metadata is modelled
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuxiliaryData {
    pub metadata: BTreeMap<u64, Metadatum>,
}

impl AuxiliaryData {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}
