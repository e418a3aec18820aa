//! Error types for the transaction build pipeline
//!
//! Every failure is a structured value: a kind (the variant), a message
//! (its `Display`) and, for collaborator failures, the originating error as
//! `source()`. Errors fall into four classes:
//! - Input: malformed arguments, reported at the call that introduced them
//! - Resource: not enough value to satisfy the transaction
//! - Convergence: a builder invariant could not be established
//! - External: provider, evaluator, wallet or submission failures

use crate::address::AddressError;
use crate::assets::{AssetError, Assets};
use crate::codec::CodecError;
use crate::hash::{DatumHash, ScriptHash};
use crate::metadata::MetadataError;
use crate::provider::ProviderError;
use crate::types::RedeemerTag;
use crate::wallet::WalletError;
use thiserror::Error;

/// Coarse classification used for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Input,
    Resource,
    Convergence,
    External,
}

#[derive(Error, Debug)]
pub enum TxBuilderError {
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Invalid reward address: {0}")]
    InvalidRewardAddress(String),

    #[error("Invalid output datum: {0}")]
    InvalidOutputDatum(String),

    /// Output that can never be valid on chain (negative value, reward address)
    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Invalid asset: {0}")]
    InvalidAsset(#[from] AssetError),

    #[error("No UTxOs provided to {stage}")]
    EmptyUtxos { stage: &'static str },

    /// A single mint call must stay within one policy
    #[error("Mint spans {count} policies, expected exactly one")]
    MultiplePolicies { count: usize },

    #[error("Invalid mint: {0}")]
    InvalidMint(String),

    #[error("Invalid validity interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid redeemer builder: {0}")]
    InvalidRedeemerBuilder(String),

    /// Only key credentials can be required signers
    #[error("Invalid signer: {0}")]
    InvalidSigner(String),

    #[error("Invalid metadata under label {label}: {source}")]
    InvalidMetadata {
        label: u64,
        #[source]
        source: MetadataError,
    },

    #[error("Missing script {hash} required by {purpose}")]
    MissingScript { hash: ScriptHash, purpose: String },

    #[error("Missing redeemer for {purpose}")]
    MissingRedeemer { purpose: String },

    #[error("Duplicate redeemer for {tag}:{index}")]
    DuplicateRedeemer { tag: RedeemerTag, index: u64 },

    /// An output carries less lovelace than its serialized size demands
    #[error("Insufficient ADA in output: required {required} lovelace, provided {provided}")]
    InsufficientAda { required: u64, provided: u64 },

    #[error("Insufficient funds: wallet is short by {shortfall}")]
    InsufficientFunds { shortfall: Assets },

    #[error("Missing collateral: need {required} lovelace from at most {max_inputs} inputs, found {available}")]
    MissingCollateral {
        required: u64,
        available: u64,
        max_inputs: u64,
    },

    #[error("Transaction too large: {size} bytes exceeds maximum {max}")]
    TxTooLarge { size: usize, max: u64 },

    /// The fee fixed point was not reached within the iteration bound
    #[error("Fee did not converge after {iterations} iterations")]
    FeeConvergence { iterations: u32 },

    #[error("Cannot resolve redeemer index: {0}")]
    RedeemerIndexing(String),

    #[error("Missing datum {hash}")]
    MissingDatum {
        hash: DatumHash,
        #[source]
        source: Option<ProviderError>,
    },

    #[error("Script evaluation failed: {message}")]
    ScriptEvaluation {
        message: String,
        #[source]
        source: Option<ProviderError>,
    },

    #[error("Provider error during {operation}: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("No wallet selected: {0}")]
    MissingWallet(String),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invariant violation inside the builder
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TxBuilderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAddress(_)
            | Self::InvalidRewardAddress(_)
            | Self::InvalidOutputDatum(_)
            | Self::InvalidOutput(_)
            | Self::InvalidAsset(_)
            | Self::EmptyUtxos { .. }
            | Self::MultiplePolicies { .. }
            | Self::InvalidMint(_)
            | Self::InvalidInterval(_)
            | Self::InvalidRedeemerBuilder(_)
            | Self::InvalidSigner(_)
            | Self::InvalidMetadata { .. }
            | Self::MissingScript { .. }
            | Self::MissingRedeemer { .. }
            | Self::DuplicateRedeemer { .. } => ErrorClass::Input,

            Self::InsufficientAda { .. }
            | Self::InsufficientFunds { .. }
            | Self::MissingCollateral { .. }
            | Self::TxTooLarge { .. } => ErrorClass::Resource,

            Self::FeeConvergence { .. }
            | Self::RedeemerIndexing(_)
            | Self::Codec(_)
            | Self::Internal(_) => ErrorClass::Convergence,

            Self::MissingDatum { .. }
            | Self::ScriptEvaluation { .. }
            | Self::Provider { .. }
            | Self::MissingWallet(_)
            | Self::Wallet(_) => ErrorClass::External,
        }
    }

    /// Only collaborator failures may be worth retrying, and only when the
    /// collaborator itself reports a transient condition. Script evaluation
    /// is deterministic and never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { source, .. } => source.is_retryable(),
            Self::MissingDatum {
                source: Some(source),
                ..
            } => source.is_retryable(),
            Self::Wallet(WalletError::Provider(source)) => source.is_retryable(),
            _ => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidRewardAddress(_) => "invalid_reward_address",
            Self::InvalidOutputDatum(_) => "invalid_output_datum",
            Self::InvalidOutput(_) => "invalid_output",
            Self::InvalidAsset(_) => "invalid_asset",
            Self::EmptyUtxos { .. } => "empty_utxos",
            Self::MultiplePolicies { .. } => "multiple_policies",
            Self::InvalidMint(_) => "invalid_mint",
            Self::InvalidInterval(_) => "invalid_interval",
            Self::InvalidRedeemerBuilder(_) => "invalid_redeemer_builder",
            Self::InvalidSigner(_) => "invalid_signer",
            Self::InvalidMetadata { .. } => "invalid_metadata",
            Self::MissingScript { .. } => "missing_script",
            Self::MissingRedeemer { .. } => "missing_redeemer",
            Self::DuplicateRedeemer { .. } => "duplicate_redeemer",
            Self::InsufficientAda { .. } => "insufficient_ada",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::MissingCollateral { .. } => "missing_collateral",
            Self::TxTooLarge { .. } => "tx_too_large",
            Self::FeeConvergence { .. } => "fee_convergence",
            Self::RedeemerIndexing(_) => "redeemer_indexing",
            Self::MissingDatum { .. } => "missing_datum",
            Self::ScriptEvaluation { .. } => "script_evaluation",
            Self::Provider { .. } => "provider",
            Self::MissingWallet(_) => "missing_wallet",
            Self::Wallet(_) => "wallet",
            Self::Codec(_) => "codec",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TxBuilderError {
    pub fn provider(operation: &'static str, source: ProviderError) -> Self {
        Self::Provider { operation, source }
    }

    pub fn missing_script(hash: ScriptHash, purpose: impl Into<String>) -> Self {
        Self::MissingScript {
            hash,
            purpose: purpose.into(),
        }
    }

    pub fn missing_redeemer(purpose: impl Into<String>) -> Self {
        Self::MissingRedeemer {
            purpose: purpose.into(),
        }
    }

    /// Evaluator errors: script failures are `ScriptEvaluation`, transport
    /// failures stay `Provider` so callers can retry them
    pub fn evaluation(source: ProviderError) -> Self {
        match source {
            ProviderError::Evaluation(message) => Self::ScriptEvaluation {
                source: Some(ProviderError::Evaluation(message.clone())),
                message,
            },
            other => Self::provider("evaluate_tx", other),
        }
    }

    pub fn evaluation_mismatch(message: impl Into<String>) -> Self {
        Self::ScriptEvaluation {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

/// Failures while collecting signatures
#[derive(Error, Debug)]
pub enum SignError {
    #[error("No wallet selected for signing")]
    MissingWallet,

    #[error("Signing failed: {0}")]
    Wallet(#[from] WalletError),

    #[error("Codec error while signing: {0}")]
    Codec(#[from] CodecError),
}

/// Failures while handing a signed transaction to the network
#[derive(Error, Debug)]
pub enum SubmitError {
    /// The collaborator refused the transaction; `reason` is its message
    #[error("Transaction rejected: {reason}")]
    Rejected {
        reason: String,
        #[source]
        source: Option<ProviderError>,
    },

    #[error("Submission transport failure: {0}")]
    Transport(#[source] ProviderError),

    #[error("Codec error while submitting: {0}")]
    Codec(#[from] CodecError),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub(crate) fn from_provider(err: ProviderError) -> Self {
        if err.is_retryable() {
            Self::Transport(err)
        } else {
            Self::Rejected {
                reason: err.to_string(),
                source: Some(err),
            }
        }
    }

    pub(crate) fn from_wallet(err: WalletError) -> Self {
        match err {
            WalletError::Provider(source) => Self::from_provider(source),
            other => Self::Rejected {
                reason: other.to_string(),
                source: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = TxBuilderError::InsufficientAda {
            required: 969_750,
            provided: 100,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient ADA in output: required 969750 lovelace, provided 100"
        );

        let err = TxBuilderError::DuplicateRedeemer {
            tag: RedeemerTag::Spend,
            index: 2,
        };
        assert_eq!(err.to_string(), "Duplicate redeemer for spend:2");
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            TxBuilderError::EmptyUtxos { stage: "collect_from" }.class(),
            ErrorClass::Input
        );
        assert_eq!(
            TxBuilderError::InsufficientFunds {
                shortfall: Assets::from_lovelace(1)
            }
            .class(),
            ErrorClass::Resource
        );
        assert_eq!(
            TxBuilderError::FeeConvergence { iterations: 10 }.class(),
            ErrorClass::Convergence
        );
        assert_eq!(
            TxBuilderError::evaluation(ProviderError::Evaluation("boom".into())).class(),
            ErrorClass::External
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(TxBuilderError::provider("get_utxos", ProviderError::Timeout("5s".into())).is_retryable());
        assert!(!TxBuilderError::provider("get_utxos", ProviderError::NotFound("x".into())).is_retryable());
        assert!(!TxBuilderError::evaluation(ProviderError::Evaluation("fail".into())).is_retryable());
        assert!(!TxBuilderError::FeeConvergence { iterations: 3 }.is_retryable());
    }

    #[test]
    fn test_evaluation_keeps_transport_failures_as_provider() {
        let err = TxBuilderError::evaluation(ProviderError::Transport("reset".into()));
        assert!(matches!(err, TxBuilderError::Provider { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sources_are_preserved() {
        let err = TxBuilderError::provider("get_datum", ProviderError::Rejected("nope".into()));
        assert!(err.source().is_some());

        let submit = SubmitError::from_provider(ProviderError::Rejected("BadInputsUTxO".into()));
        assert!(matches!(submit, SubmitError::Rejected { .. }));
        assert!(!submit.is_retryable());
        assert!(SubmitError::from_provider(ProviderError::Timeout("t".into())).is_retryable());
    }
}
