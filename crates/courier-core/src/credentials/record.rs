//! Credential record model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which OAuth backend issued a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google account, served by the Gmail API.
    Google,
    /// Microsoft account, served by Graph.
    Microsoft,
}

impl BackendKind {
    /// Human-readable name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Microsoft => "Microsoft",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Cached credential for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Account email; the cache key.
    pub account_email: String,
    /// Bearer token for the account's REST backend.
    pub access_token: String,
    /// Refresh token, once the account has been bootstrapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Authoritative expiry of `access_token`.
    pub expires_at: DateTime<Utc>,
    /// Issuing backend.
    pub backend_kind: BackendKind,
    /// Token for the client's own backend (native drafts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proprietary_token: Option<String>,
    /// User id on the client's own backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proprietary_user_id: Option<String>,
}

impl CredentialRecord {
    /// Creates a record without refresh or proprietary tokens.
    #[must_use]
    pub fn new(
        account_email: &str,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        backend_kind: BackendKind,
    ) -> Self {
        Self {
            account_email: normalize_email(account_email),
            access_token: access_token.into(),
            refresh_token: None,
            expires_at,
            backend_kind,
            proprietary_token: None,
            proprietary_user_id: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the proprietary backend token and user id.
    #[must_use]
    pub fn with_proprietary(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.proprietary_token = Some(token.into());
        self.proprietary_user_id = Some(user_id.into());
        self
    }

    /// True when the access token outlives `now + skew`.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at > now + skew
    }

    /// True when the access token has not yet expired at `now`.
    #[must_use]
    pub fn is_unexpired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// True when a refresh token allows renewal without the live client.
    #[must_use]
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Converts to an OAuth token for the refresh grant.
    #[must_use]
    pub fn to_oauth_token(&self) -> courier_oauth::Token {
        let token = courier_oauth::Token::new(self.access_token.clone(), "Bearer")
            .with_expires_at(self.expires_at);
        match &self.refresh_token {
            Some(refresh) => token.with_refresh_token(refresh.clone()),
            None => token,
        }
    }

    /// Applies a refreshed OAuth token, keeping identity and proprietary fields.
    ///
    /// Tokens without an expiry are treated as valid for one hour, the
    /// lifetime both providers issue.
    #[must_use]
    pub fn refreshed_with(&self, token: courier_oauth::Token, now: DateTime<Utc>) -> Self {
        Self {
            access_token: token.access_token,
            expires_at: token.expires_at.unwrap_or(now + Duration::hours(1)),
            refresh_token: token.refresh_token.or_else(|| self.refresh_token.clone()),
            ..self.clone()
        }
    }
}

/// Canonical cache key for an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
