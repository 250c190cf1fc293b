//! Error types for the core library.

use thiserror::Error;

use crate::automation::AutomationError;
use crate::backend::BackendError;
use crate::credentials::CredentialError;
use crate::threading::ThreadingError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable credential, or the stored one was rejected.
    ///
    /// Callers should present this as "re-authenticate".
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Referenced account, draft or thread does not exist in any source.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A REST backend answered with a non-success status.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The live-session fallback failed.
    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    /// A reply could not be planned from the thread snapshot.
    #[error("Threading error: {0}")]
    Threading(#[from] ThreadingError),

    /// The owning source cannot perform the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when the only way forward is a fresh interactive bootstrap.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        match self {
            Self::Credential(e) => e.requires_reauth(),
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
