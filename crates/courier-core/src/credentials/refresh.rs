//! The two ways a credential gets renewed.

use async_trait::async_trait;
use chrono::Utc;
use courier_oauth::{OAuthClient, Provider};
use tracing::info;

use super::{BackendKind, CredentialError, CredentialRecord, CredentialResult};
use crate::config::{Config, OAuthAppConfig};

/// Token-refresh path: exchanges a stored refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns `record` with a new access token and expiry.
    ///
    /// # Errors
    ///
    /// [`CredentialError::InvalidGrant`] on a 4xx from the token endpoint;
    /// [`CredentialError::RefreshFailed`] on anything else.
    async fn refresh(&self, record: &CredentialRecord) -> CredentialResult<CredentialRecord>;
}

/// Extraction path: reads a credential out of the live client.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Switches the client to `account_email` and reads its credential.
    async fn extract(&self, account_email: &str) -> CredentialResult<CredentialRecord>;
}

/// [`TokenRefresher`] backed by the Google and Microsoft token endpoints.
#[derive(Debug, Clone, Default)]
pub struct OAuthRefresher {
    google: Option<OAuthClient>,
    microsoft: Option<OAuthClient>,
}

impl OAuthRefresher {
    /// Creates a refresher with explicit per-backend clients.
    #[must_use]
    pub const fn new(google: Option<OAuthClient>, microsoft: Option<OAuthClient>) -> Self {
        Self { google, microsoft }
    }

    /// Builds clients for every backend that has a client id configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured token URL does not parse.
    pub fn from_config(config: &Config, http: &reqwest::Client) -> crate::Result<Self> {
        let google = build_client(&config.google, Provider::google(), http)?;
        let microsoft = build_client(&config.microsoft, Provider::microsoft(), http)?;
        Ok(Self { google, microsoft })
    }

    fn client_for(&self, backend: BackendKind) -> CredentialResult<&OAuthClient> {
        match backend {
            BackendKind::Google => self.google.as_ref(),
            BackendKind::Microsoft => self.microsoft.as_ref(),
        }
        .ok_or(CredentialError::MissingOAuthClient { backend })
    }
}

fn build_client(
    app: &OAuthAppConfig,
    provider: courier_oauth::Result<Provider>,
    http: &reqwest::Client,
) -> crate::Result<Option<OAuthClient>> {
    let Some(client_id) = &app.client_id else {
        return Ok(None);
    };

    let mut provider = provider.map_err(|e| crate::Error::Config(e.to_string()))?;
    if let Some(token_url) = &app.token_url {
        provider = provider
            .with_token_url(token_url)
            .map_err(|e| crate::Error::Config(e.to_string()))?;
    }
    provider
        .validate()
        .map_err(|e| crate::Error::Config(e.to_string()))?;

    let mut client = OAuthClient::new(client_id, provider).with_http_client(http.clone());
    if let Some(secret) = &app.client_secret {
        client = client.with_client_secret(secret);
    }
    Ok(Some(client))
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, record: &CredentialRecord) -> CredentialResult<CredentialRecord> {
        let client = self.client_for(record.backend_kind)?;
        let account = record.account_email.clone();

        let token = client
            .refresh_token(&record.to_oauth_token())
            .await
            .map_err(|e| {
                if e.is_rejected_grant() {
                    CredentialError::InvalidGrant {
                        account: account.clone(),
                        detail: e.to_string(),
                    }
                } else {
                    CredentialError::RefreshFailed {
                        account: account.clone(),
                        detail: e.to_string(),
                    }
                }
            })?;
        if token.is_expired() {
            return Err(CredentialError::RefreshFailed {
                account,
                detail: "token endpoint issued an already expiring token".into(),
            });
        }

        info!(account = %account, backend = %record.backend_kind, "Refreshed access token");
        Ok(record.refreshed_with(token, Utc::now()))
    }
}
