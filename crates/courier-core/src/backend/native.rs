//! Client for the mail client's proprietary backend.
//!
//! Every call is a `POST` of a JSON body carrying the user id, authorized
//! with the proprietary token read out of the live client.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Backend, BackendError, Rest};
use crate::credentials::CredentialRecord;

/// Prefix carried by every native draft id.
pub const NATIVE_DRAFT_PREFIX: &str = "draft00";

/// Token and user id pair the native backend authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub struct NativeCredential {
    /// Proprietary session token.
    pub token: String,
    /// Proprietary user id.
    pub user_id: String,
}

impl std::fmt::Debug for NativeCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCredential")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl NativeCredential {
    /// Extracts the proprietary pair from a credential record, if present.
    #[must_use]
    pub fn from_record(record: &CredentialRecord) -> Option<Self> {
        Some(Self {
            token: record.proprietary_token.clone()?,
            user_id: record.proprietary_user_id.clone()?,
        })
    }
}

/// A draft stored by the native backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeDraft {
    /// Draft id, starting with [`NATIVE_DRAFT_PREFIX`].
    pub id: String,
    /// Subject line.
    pub subject: String,
    /// Sender address.
    pub from: String,
    /// Recipients.
    pub to: Vec<String>,
    /// Copied recipients.
    pub cc: Vec<String>,
    /// Plain-text body.
    pub body: String,
    /// Last edit.
    pub updated_at: Option<DateTime<Utc>>,
    /// Thread the draft replies to.
    pub thread_id: Option<String>,
}

/// A message inside a native thread.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeMessage {
    /// Message id.
    pub id: String,
    /// Sender.
    pub from: String,
    /// Recipients.
    pub to: Vec<String>,
    /// Copied recipients.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// RFC 5322 `Message-ID`.
    pub message_id: Option<String>,
    /// When the message arrived.
    pub date: Option<DateTime<Utc>>,
}

/// A thread as returned by `threads.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeThread {
    /// Thread id.
    pub id: String,
    /// Messages, oldest first.
    pub messages: Vec<NativeMessage>,
}

/// Answer to `sync`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncResponse {
    /// Drafts known to the backend, most recent first.
    pub drafts: Vec<NativeDraft>,
    /// Ids of threads changed since the cursor.
    pub thread_ids: Vec<String>,
    /// Cursor for the next incremental sync.
    pub cursor: Option<String>,
}

/// Stateless native backend client.
#[derive(Debug, Clone)]
pub struct NativeClient {
    rest: Rest,
}

impl NativeClient {
    /// Creates a client for the backend at `base`.
    #[must_use]
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(http, base, Backend::Native),
        }
    }

    fn post(
        &self,
        credential: &NativeCredential,
        method: &str,
        mut body: serde_json::Value,
    ) -> reqwest::RequestBuilder {
        body["userId"] = json!(credential.user_id);
        self.rest
            .request(Method::POST, &credential.token, method)
            .json(&body)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        credential: &NativeCredential,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, BackendError> {
        self.rest.json(self.post(credential, method, body)).await
    }

    /// Fetches everything changed since `cursor` (everything when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn sync(
        &self,
        credential: &NativeCredential,
        cursor: Option<&str>,
    ) -> Result<SyncResponse, BackendError> {
        self.call(credential, "sync", json!({ "cursor": cursor }))
            .await
    }

    /// Fetches one thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_thread(
        &self,
        credential: &NativeCredential,
        thread_id: &str,
    ) -> Result<NativeThread, BackendError> {
        self.call(credential, "threads.get", json!({ "threadId": thread_id }))
            .await
    }

    /// Creates or overwrites a draft; the backend assigns ids to new drafts.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn write_draft(
        &self,
        credential: &NativeCredential,
        draft: &NativeDraft,
    ) -> Result<NativeDraft, BackendError> {
        self.call(credential, "drafts.write", json!({ "draft": draft }))
            .await
    }

    /// Deletes a draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_draft(
        &self,
        credential: &NativeCredential,
        draft_id: &str,
    ) -> Result<(), BackendError> {
        let request = self.post(credential, "drafts.delete", json!({ "draftId": draft_id }));
        self.rest.empty(request).await
    }
}
