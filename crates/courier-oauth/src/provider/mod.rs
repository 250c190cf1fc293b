//! `OAuth2` token endpoint configurations.

use crate::error::{Error, Result};
use url::Url;

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes sent with refresh requests.
    ///
    /// Google ignores the scope on refresh; Microsoft requires it.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(name: impl Into<String>, token_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Replaces the token endpoint, keeping name and scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_token_url(mut self, token_url: impl AsRef<str>) -> Result<Self> {
        self.token_url = Url::parse(token_url.as_ref())?;
        Ok(self)
    }

    /// Google `OAuth2` provider configuration.
    ///
    /// Scopes:
    /// - `https://mail.google.com/` - Full Gmail API access
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new("Google", "https://oauth2.googleapis.com/token")?
            .with_default_scopes(vec!["https://mail.google.com/".to_string()]))
    }

    /// Microsoft identity platform configuration for Graph mail.
    ///
    /// Scopes:
    /// - `https://graph.microsoft.com/Mail.ReadWrite` - messages and drafts
    /// - `https://graph.microsoft.com/Mail.Send` - sending
    /// - `offline_access` - Refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Ok(Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        )?
        .with_default_scopes(vec![
            "https://graph.microsoft.com/Mail.ReadWrite".to_string(),
            "https://graph.microsoft.com/Mail.Send".to_string(),
            "offline_access".to_string(),
        ]))
    }

    /// Validates that the token endpoint is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.token_url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "token_url must be http(s), got {}",
                self.token_url.scheme()
            )));
        }
        Ok(())
    }
}
