//! Engine-level error taxonomy.
//!
//! Translation errors pass through from the convert layer unchanged; the
//! engine only adds repository and assistant failure modes. Every variant
//! maps onto a stable `kind()` string for the wire contract.

use thiserror::Error;

use sigmaspl_convert::ConvertError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Referenced profile/mapping/config id does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate name or conflicting default/active toggle.
    #[error("conflict: {0}")]
    Conflict(String),

    /// `text_to_sigma` was called without a configured assistant, or the
    /// assistant call failed.
    #[error("assistant unavailable: {0}")]
    LlmUnavailable(String),

    /// Invariant violation (programmer error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sigmaspl_parser::SigmaParserError> for EngineError {
    fn from(e: sigmaspl_parser::SigmaParserError) -> Self {
        EngineError::Convert(ConvertError::Parser(e))
    }
}

impl EngineError {
    /// Stable kind string for the error taxonomy surfaced over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Convert(e) => e.kind(),
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::LlmUnavailable(_) => "llm_unavailable",
            EngineError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
