//! Error types for `OAuth2` operations.

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error (connection refused, TLS failure, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error returned by the token endpoint.
    #[error("OAuth2 error ({status}): {error} - {description}")]
    OAuth {
        /// HTTP status of the token endpoint response.
        status: u16,
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Invalid token response.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from status, error code and description.
    #[must_use]
    pub fn oauth_error(
        status: u16,
        error: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::OAuth {
            status,
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns the HTTP status of a token endpoint rejection, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::OAuth { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the token endpoint rejected the grant itself (any 4xx).
    ///
    /// A rejected grant will not succeed on retry; the account has to be
    /// bootstrapped again.
    #[must_use]
    pub fn is_rejected_grant(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_grant_is_any_client_error() {
        assert!(Error::oauth_error(400, "invalid_grant", "revoked").is_rejected_grant());
        assert!(Error::oauth_error(401, "invalid_client", "").is_rejected_grant());
        assert!(!Error::oauth_error(503, "temporarily_unavailable", "").is_rejected_grant());
        assert!(!Error::NoRefreshToken.is_rejected_grant());
    }
}
