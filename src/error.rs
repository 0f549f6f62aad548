//! Error types for filter parsing and compilation

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, FesError>;

/// Errors raised while parsing or compiling a filter.
///
/// Everything except [`FesError::Invariant`] is caused by the request and can be
/// reported back to the client. `Invariant` means the lowering code broke its own
/// contract and should be treated as a bug.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FesError {
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    #[error("{0}")]
    ExternalParsing(String),

    #[error("Unexpected {found}, expected one of: {expected}")]
    UnexpectedNode { found: String, expected: String },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Unsupported tag: {0}")]
    UnsupportedTag(String),

    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("Lookup '{0}' is not registered with the query executor")]
    UnsupportedLookup(String),

    #[error("Unable to resolve the reference system of '{locator}': {reason}")]
    CrsResolution { locator: String, reason: String },

    #[error("Internal error: {0}")]
    Invariant(String),
}

impl FesError {
    pub(crate) fn parsing(message: impl Into<String>) -> Self {
        FesError::ExternalParsing(message.into())
    }

    pub(crate) fn not_implemented(feature: impl Into<String>) -> Self {
        FesError::NotImplemented(feature.into())
    }

    /// True when the error was caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        !self.is_internal()
    }

    /// True for broken lowering contracts (e.g. unconsumed stashed lookups).
    pub fn is_internal(&self) -> bool {
        matches!(self, FesError::Invariant(_))
    }
}

impl From<roxmltree::Error> for FesError {
    fn from(err: roxmltree::Error) -> Self {
        FesError::MalformedXml(err.to_string())
    }
}
