//! Refresh-token grant against a provider's token endpoint.

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID registered with the provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Shares an existing HTTP client (connection pool) with this OAuth client.
    #[must_use]
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Refreshes an access token using the token's refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token has no refresh token or the refresh fails.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;
        self.refresh(refresh_token).await
    }

    /// Exchanges a raw refresh token for a fresh access token.
    ///
    /// The returned token always carries a refresh token: the rotated one
    /// when the endpoint sends it, otherwise the one passed in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] with the response status when the endpoint
    /// rejects the request, or a transport/JSON error.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let scope = self.provider.default_scopes.join(" ");

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }
        if !scope.is_empty() {
            params.insert("scope", &scope);
        }

        debug!(provider = %self.provider.name, "refreshing access token");

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(error) => error.into_error(status.as_u16()),
                Err(_) => Error::oauth_error(status.as_u16(), "http_error", body),
            });
        }

        let token_response: TokenResponse = response.json().await?;
        let mut new_token = Token::from_response(token_response, Utc::now())?;

        // Preserve refresh token if not returned
        if new_token.refresh_token.is_none() {
            new_token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(new_token)
    }
}
