//! Credential lifecycle.
//!
//! One [`CredentialStore`] per process holds a [`CredentialRecord`] per
//! account, refreshes records before they expire and writes the cache back
//! through a pluggable [`CredentialPersistence`] backend.

mod persistence;
mod record;
mod refresh;
mod store;

pub use persistence::{
    CredentialMap, CredentialPersistence, FilePersistence, KeyringPersistence, MemoryPersistence,
};
pub use record::{BackendKind, CredentialRecord, normalize_email};
pub use refresh::{Bootstrapper, OAuthRefresher, TokenRefresher};
pub use store::CredentialStore;

use crate::automation::AutomationError;

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Nothing cached for the request and no live client to bootstrap from.
    #[error("no_cached_and_no_live_session: no cached credential and no live client session")]
    NoCachedAndNoLiveSession,

    /// The token endpoint rejected the stored refresh token.
    #[error("invalid_grant: refresh token for {account} was rejected ({detail})")]
    InvalidGrant {
        /// Account whose grant was rejected.
        account: String,
        /// Endpoint-provided detail.
        detail: String,
    },

    /// Refresh failed for a reason that may be transient (5xx, network).
    #[error("refresh_failed: could not refresh {account}: {detail}")]
    RefreshFailed {
        /// Account being refreshed.
        account: String,
        /// Failure detail.
        detail: String,
    },

    /// The account has no refresh token and no live session is attached.
    #[error("live_session_required: {account} has not been bootstrapped from the live client")]
    LiveSessionRequired {
        /// Account needing bootstrap.
        account: String,
    },

    /// No OAuth client is configured for the record's backend.
    #[error("missing_oauth_client: no {backend} OAuth client configured")]
    MissingOAuthClient {
        /// Backend lacking configuration.
        backend: BackendKind,
    },

    /// Reading the credential out of the live client failed.
    #[error("extraction_failed: {0}")]
    Extraction(#[from] AutomationError),

    /// The credential read from the live client is unusable.
    #[error("extraction_invalid: {0}")]
    InvalidExtraction(String),

    /// No record exists for the account and none can be created.
    #[error("unknown_account: {0}")]
    UnknownAccount(String),

    /// The cache could not be read or written.
    #[error("persistence: {0}")]
    Persistence(String),
}

impl CredentialError {
    /// Stable short code for the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoCachedAndNoLiveSession => "no_cached_and_no_live_session",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::RefreshFailed { .. } => "refresh_failed",
            Self::LiveSessionRequired { .. } => "live_session_required",
            Self::MissingOAuthClient { .. } => "missing_oauth_client",
            Self::Extraction(_) => "extraction_failed",
            Self::InvalidExtraction(_) => "extraction_invalid",
            Self::UnknownAccount(_) => "unknown_account",
            Self::Persistence(_) => "persistence",
        }
    }

    /// True when the user has to run the interactive bootstrap again.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::NoCachedAndNoLiveSession
                | Self::InvalidGrant { .. }
                | Self::LiveSessionRequired { .. }
                | Self::UnknownAccount(_)
        )
    }
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;
