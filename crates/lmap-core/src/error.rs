//! Error types for directory object-mapper operations.
//!
//! Local failures (missing attributes, naming collisions, misuse of the transaction
//! state machine) and remote failures reported by a directory client share one enum so
//! callers can propagate everything with `?`.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Attribute, entry or child absent after a confirmed fetch
    #[error("Not found: {0}")]
    NotFound(String),

    /// A child with the requested RDN already exists
    #[error("Name collision: {0}")]
    NameCollision(String),

    /// The entry already has a distinguished name
    #[error("Entry already attached: {0}")]
    AlreadyAttached(String),

    /// The entry has no distinguished name and no remote counterpart
    #[error("Entry is detached: {0}")]
    Detached(String),

    /// Remote directory operation failed
    #[error("Directory error{}: {message}", format_code(.code))]
    Directory {
        /// LDAP result code, when the server produced one
        code: Option<u32>,
        /// Error message
        message: String,
    },

    /// Transaction boundary used in the wrong state
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// Malformed input such as a bad RDN or an empty value list
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unusable connection settings
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Directory URL could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Configuration failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The server did not answer within the operation timeout
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

fn format_code(code: &Option<u32>) -> String {
    code.map(|c| format!(" (code {c})")).unwrap_or_default()
}

impl Error {
    /// Builds a [`Error::Directory`] without a result code.
    #[must_use]
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            code: None,
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::NameCollision(_) => "NAME_COLLISION",
            Self::AlreadyAttached(_) => "ALREADY_ATTACHED",
            Self::Detached(_) => "DETACHED",
            Self::Directory { .. } => "DIRECTORY_ERROR",
            Self::TransactionState(_) => "TRANSACTION_STATE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    /// Returns the LDAP result code carried by a directory error.
    #[must_use]
    pub const fn directory_code(&self) -> Option<u32> {
        match self {
            Self::Directory { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the failure points at infrastructure rather than caller misuse.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Directory { .. } | Self::ConfigError(_) | Self::Timeout(_)
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
