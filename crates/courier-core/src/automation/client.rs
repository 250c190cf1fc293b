//! Scripts run inside the live client.
//!
//! The client exposes its signed-in accounts and their OAuth credentials on
//! an in-page application object. Only this module knows that shape; callers
//! get typed [`Account`] and [`ExtractedCredential`] values back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{AutomationError, AutomationResult, LiveSession};
use crate::credentials::{
    BackendKind, Bootstrapper, CredentialError, CredentialRecord, CredentialResult,
    normalize_email,
};

/// Lists linked accounts and flags the one in view.
const LIST_ACCOUNTS_SCRIPT: &str = r"(() => {
  const app = window.App;
  if (!app || !app.accounts) { throw new Error('client not ready'); }
  const current = app.currentAccount && app.currentAccount.emailAddress;
  return app.accounts.list().map((a) => ({
    email: a.emailAddress,
    isCurrent: a.emailAddress === current,
  }));
})()";

/// Reads the credential object of the account in view.
const READ_CREDENTIAL_SCRIPT: &str = r"(async () => {
  const account = window.App && window.App.currentAccount;
  if (!account) { throw new Error('no current account'); }
  const cred = await account.credential.ensureFresh();
  return {
    email: account.emailAddress,
    provider: account.isMicrosoft ? 'microsoft' : 'google',
    accessToken: cred.accessToken,
    expiresAt: cred.expires,
    refreshToken: cred.refreshToken || null,
    proprietaryToken: (account.backend && account.backend.idToken) || null,
    proprietaryUserId: (account.backend && account.backend.userId) || null,
  };
})()";

/// Linked account in the live client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account email.
    pub email: String,
    /// Whether the client currently shows this account.
    pub is_current: bool,
}

/// Credential as read from the client's in-process object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedCredential {
    /// Account the credential belongs to.
    pub email: String,
    /// "google" or "microsoft".
    pub provider: String,
    /// Access token.
    pub access_token: String,
    /// Expiry in milliseconds since the Unix epoch.
    pub expires_at: i64,
    /// Refresh token, when the client holds one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token for the client's own backend.
    #[serde(default)]
    pub proprietary_token: Option<String>,
    /// User id on the client's own backend.
    #[serde(default)]
    pub proprietary_user_id: Option<String>,
}

impl ExtractedCredential {
    /// Converts into a cache record.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown provider, empty token or bad expiry.
    pub fn into_record(self) -> CredentialResult<CredentialRecord> {
        let backend = match self.provider.to_ascii_lowercase().as_str() {
            "google" | "gmail" => BackendKind::Google,
            "microsoft" | "outlook" => BackendKind::Microsoft,
            other => {
                return Err(CredentialError::InvalidExtraction(format!(
                    "unknown provider {other:?}"
                )));
            }
        };
        if self.access_token.is_empty() {
            return Err(CredentialError::InvalidExtraction(format!(
                "empty access token for {}",
                self.email
            )));
        }
        let expires_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.expires_at)
            .single()
            .ok_or_else(|| {
                CredentialError::InvalidExtraction(format!("bad expiry {}", self.expires_at))
            })?;

        let mut record = CredentialRecord::new(&self.email, self.access_token, expires_at, backend);
        record.refresh_token = self.refresh_token.filter(|t| !t.is_empty());
        record.proprietary_token = self.proprietary_token;
        record.proprietary_user_id = self.proprietary_user_id;
        Ok(record)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> AutomationResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AutomationError::UnexpectedValue(format!("{what}: {e}")))
}

/// Lists the accounts linked in the client.
///
/// # Errors
///
/// Returns an error if the script fails or returns an unexpected shape.
pub async fn list_accounts(session: &dyn LiveSession) -> AutomationResult<Vec<Account>> {
    let value = session.evaluate(LIST_ACCOUNTS_SCRIPT, false).await?;
    decode(value, "account list")
}

/// Switches the client to `email` and waits `settle`.
///
/// The client has no reliable "switch complete" signal, so a fixed delay
/// stands in for one. Returns `false` if the account was already current.
///
/// # Errors
///
/// Returns an error if the account is not linked or the script fails.
pub async fn switch_account(
    session: &dyn LiveSession,
    email: &str,
    settle: Duration,
) -> AutomationResult<bool> {
    let wanted = normalize_email(email);
    let accounts = list_accounts(session).await?;
    let Some(account) = accounts
        .iter()
        .find(|a| normalize_email(&a.email) == wanted)
    else {
        return Err(AutomationError::ScriptFailed(format!(
            "account {email} is not linked in the client"
        )));
    };
    if account.is_current {
        debug!(account = %wanted, "Account already current");
        return Ok(false);
    }

    let script = format!(
        "(() => {{ window.App.accounts.switchTo({}); return true; }})()",
        Value::String(account.email.clone())
    );
    session.evaluate(&script, false).await?;
    info!(account = %wanted, "Switched live client account");
    tokio::time::sleep(settle).await;
    Ok(true)
}

/// Reads the credential of the account currently in view.
///
/// # Errors
///
/// Returns an error if the script fails or returns an unexpected shape.
pub async fn read_credential(session: &dyn LiveSession) -> AutomationResult<ExtractedCredential> {
    let value = session.evaluate(READ_CREDENTIAL_SCRIPT, true).await?;
    decode(value, "credential")
}

/// Extraction-path [`Bootstrapper`] driving a live session.
pub struct SessionBootstrapper {
    session: Arc<dyn LiveSession>,
    settle: Duration,
}

impl SessionBootstrapper {
    /// Creates a bootstrapper over `session`.
    #[must_use]
    pub fn new(session: Arc<dyn LiveSession>, settle: Duration) -> Self {
        Self { session, settle }
    }
}

#[async_trait]
impl Bootstrapper for SessionBootstrapper {
    async fn extract(&self, account_email: &str) -> CredentialResult<CredentialRecord> {
        switch_account(self.session.as_ref(), account_email, self.settle).await?;
        let extracted = read_credential(self.session.as_ref()).await?;

        if normalize_email(&extracted.email) != normalize_email(account_email) {
            return Err(CredentialError::InvalidExtraction(format!(
                "asked for {account_email}, client returned {}",
                extracted.email
            )));
        }
        extracted.into_record()
    }
}
