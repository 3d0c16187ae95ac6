//! Translation-specific error types.

use thiserror::Error;

use sigmaspl_parser::SigmaParserError;

/// Errors that can occur during translation in either direction.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A parser error propagated during compilation.
    #[error(transparent)]
    Parser(#[from] SigmaParserError),

    /// A structural violation detected after parsing (e.g. a numeric
    /// modifier applied to a string value). Carries a dotted path.
    #[error("Invalid Sigma rule at {path}: {reason}")]
    InvalidSigma { reason: String, path: String },

    /// The reverse recognizer hit SPL outside the supported grammar.
    /// `offset` is the byte position of the offending fragment.
    #[error("Unsupported SPL at offset {offset}: {fragment}")]
    UnsupportedSpl { fragment: String, offset: usize },

    /// Invariant violation (programmer error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub fn invalid(reason: impl Into<String>, path: impl Into<String>) -> Self {
        ConvertError::InvalidSigma {
            reason: reason.into(),
            path: path.into(),
        }
    }

    pub fn unsupported(fragment: impl Into<String>, offset: usize) -> Self {
        ConvertError::UnsupportedSpl {
            fragment: fragment.into(),
            offset,
        }
    }

    /// Stable kind string for the error taxonomy surfaced over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::Parser(e) => e.kind(),
            ConvertError::InvalidSigma { .. } => "invalid_sigma",
            ConvertError::UnsupportedSpl { .. } => "unsupported_spl",
            ConvertError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
