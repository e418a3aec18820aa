//! Errors raised at the chain-data provider boundary

use crate::codec::CodecError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Network-level failure talking to the backend
    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    /// The backend understood the request and refused it
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Script execution failed while computing budgets
    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Rejected(_)
            | Self::NotFound(_)
            | Self::Evaluation(_)
            | Self::InvalidResponse(_)
            | Self::Codec(_) => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Rejected(_) => "rejected",
            Self::NotFound(_) => "not_found",
            Self::Evaluation(_) => "evaluation",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Codec(_) => "codec",
        }
    }
}
