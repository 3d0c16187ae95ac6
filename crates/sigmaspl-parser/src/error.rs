use std::fmt;

use thiserror::Error;

/// Source location within a Sigma document.
///
/// Attached to condition parse errors when position information is available
/// (from pest parse failures). Line and column are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Errors that can occur while loading a Sigma rule.
///
/// `UnknownModifier` and `UnresolvedSelection` are structural violations like
/// `InvalidSigma`, kept as distinct variants so callers can surface them as
/// their own kinds.
#[derive(Debug, Error)]
pub enum SigmaParserError {
    #[error("YAML parsing error: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    /// Structural violation. `path` is a dotted location inside the document
    /// (e.g. `detection.selection`).
    #[error("Invalid Sigma rule at {path}: {reason}")]
    InvalidSigma { reason: String, path: String },

    #[error("Unknown modifier '{0}'")]
    UnknownModifier(String),

    /// The condition references a selection name that does not exist.
    #[error("Unresolved selection '{0}' in condition")]
    UnresolvedSelection(String),

    #[error("{}", format_with_location(.0, .1))]
    Condition(String, Option<SourceLocation>),
}

impl SigmaParserError {
    pub fn invalid(reason: impl Into<String>, path: impl Into<String>) -> Self {
        SigmaParserError::InvalidSigma {
            reason: reason.into(),
            path: path.into(),
        }
    }

    /// Returns the source location if this error variant carries one.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            SigmaParserError::Condition(_, loc) => *loc,
            _ => None,
        }
    }

    /// Stable kind string for the error taxonomy surfaced over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SigmaParserError::InvalidYaml(_) => "invalid_yaml",
            SigmaParserError::InvalidSigma { .. } => "invalid_sigma",
            SigmaParserError::UnknownModifier(_) => "unknown_modifier",
            SigmaParserError::UnresolvedSelection(_) => "unresolved_selection",
            SigmaParserError::Condition(..) => "invalid_sigma",
        }
    }
}

fn format_with_location(msg: &str, loc: &Option<SourceLocation>) -> String {
    match loc {
        Some(loc) => format!("Condition parse error at {loc}: {msg}"),
        None => format!("Condition parse error: {msg}"),
    }
}

pub type Result<T> = std::result::Result<T, SigmaParserError>;
