//! Gmail REST API client.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Backend, BackendError, OutgoingMessage, Rest};
use crate::threading::{ThreadSnapshot, split_address_list};

/// Headers fetched with `format=metadata`.
const METADATA_HEADERS: [&str; 8] = [
    "Subject",
    "From",
    "Reply-To",
    "To",
    "Cc",
    "Date",
    "Message-ID",
    "References",
];

/// Largest page Gmail accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Label Gmail puts on unsent drafts, including those inside threads.
const DRAFT_LABEL: &str = "DRAFT";

/// Message id pair returned by list and send calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default)]
    pub thread_id: String,
}

/// One page of `messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Message ids on this page.
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    /// Token for the next page.
    pub next_page_token: Option<String>,
    /// Server estimate of the total.
    pub result_size_estimate: Option<u64>,
}

/// A message header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// MIME part tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Part MIME type.
    pub mime_type: Option<String>,
    /// Part headers.
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Child parts.
    #[serde(default)]
    pub parts: Vec<Self>,
}

/// A message as returned by `messages.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default)]
    pub thread_id: String,
    /// Applied labels.
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Short plain-text preview.
    #[serde(default)]
    pub snippet: String,
    /// Milliseconds since the epoch, as a string.
    pub internal_date: Option<String>,
    /// Headers and MIME structure.
    #[serde(default)]
    pub payload: Payload,
    /// Whole RFC 5322 message, base64url; only with `format=raw`.
    pub raw: Option<String>,
}

impl GmailMessage {
    /// First header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// True for an unsent draft.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.label_ids.iter().any(|l| l == DRAFT_LABEL)
    }

    /// The decoded RFC 5322 text of a `format=raw` message.
    #[must_use]
    pub fn raw_message(&self) -> Option<String> {
        let raw = self.raw.as_deref()?;
        let bytes = URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Text after the header block of a `format=raw` message.
    #[must_use]
    pub fn raw_body(&self) -> Option<String> {
        let text = self.raw_message()?;
        let body = text
            .split_once("\r\n\r\n")
            .or_else(|| text.split_once("\n\n"))
            .map_or("", |(_, body)| body);
        Some(body.replace("\r\n", "\n"))
    }

    /// Parsed `internalDate`.
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.internal_date.as_deref()?.parse::<i64>().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

/// A thread with its messages, oldest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GmailThread {
    /// Thread id.
    pub id: String,
    /// Messages in the thread.
    #[serde(default)]
    pub messages: Vec<GmailMessage>,
}

impl GmailThread {
    /// Newest message that is not an unsent draft.
    #[must_use]
    pub fn latest_sent(&self) -> Option<&GmailMessage> {
        self.messages.iter().rev().find(|m| !m.is_draft())
    }
}

/// Draft id pair returned by `drafts.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftRef {
    /// Draft id.
    pub id: String,
    /// Underlying message ids.
    pub message: MessageRef,
}

/// One page of `drafts.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftList {
    /// Drafts on this page.
    #[serde(default)]
    pub drafts: Vec<DraftRef>,
    /// Token for the next page.
    pub next_page_token: Option<String>,
}

/// A draft with its message metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailDraft {
    /// Draft id.
    pub id: String,
    /// Draft message.
    pub message: GmailMessage,
}

/// Stateless Gmail client.
#[derive(Debug, Clone)]
pub struct GmailClient {
    rest: Rest,
}

impl GmailClient {
    /// Creates a client for `base` (normally `.../gmail/v1/users/me`).
    #[must_use]
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(http, base, Backend::Gmail),
        }
    }

    /// Lists message ids matching an optional Gmail search query.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_messages(
        &self,
        token: &str,
        query: Option<&str>,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<MessageList, BackendError> {
        let mut request = self
            .rest
            .request(Method::GET, token, "messages")
            .query(&[("maxResults", max_results.min(MAX_PAGE_SIZE).to_string())]);
        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }
        if let Some(page) = page_token {
            request = request.query(&[("pageToken", page)]);
        }
        self.rest.json(request).await
    }

    /// Fetches one message with headers only.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_message(&self, token: &str, id: &str) -> Result<GmailMessage, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, &format!("messages/{id}"))
            .query(&metadata_query());
        self.rest.json(request).await
    }

    /// Fetches one message as raw RFC 5322.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_message_raw(&self, token: &str, id: &str) -> Result<GmailMessage, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, &format!("messages/{id}"))
            .query(&[("format", "raw")]);
        self.rest.json(request).await
    }

    /// Adds and removes labels on a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn modify_labels(
        &self,
        token: &str,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<MessageRef, BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, &format!("messages/{id}/modify"))
            .json(&json!({ "addLabelIds": add, "removeLabelIds": remove }));
        self.rest.json(request).await
    }

    /// Sends a message, optionally inside an existing thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send(
        &self,
        token: &str,
        message: &OutgoingMessage,
        thread_id: Option<&str>,
    ) -> Result<MessageRef, BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, "messages/send")
            .json(&raw_request(message, thread_id));
        self.rest.json(request).await
    }

    /// Fetches a thread with per-message headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_thread(&self, token: &str, id: &str) -> Result<GmailThread, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, &format!("threads/{id}"))
            .query(&metadata_query());
        self.rest.json(request).await
    }

    /// Lists draft ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_drafts(
        &self,
        token: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<DraftList, BackendError> {
        let mut request = self
            .rest
            .request(Method::GET, token, "drafts")
            .query(&[("maxResults", max_results.min(MAX_PAGE_SIZE).to_string())]);
        if let Some(page) = page_token {
            request = request.query(&[("pageToken", page)]);
        }
        self.rest.json(request).await
    }

    /// Collects up to `wanted` draft ids, newest first, across pages.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn list_drafts_upto(
        &self,
        token: &str,
        wanted: usize,
    ) -> Result<Vec<DraftRef>, BackendError> {
        let mut drafts = Vec::new();
        let mut page_token: Option<String> = None;
        while drafts.len() < wanted {
            let remaining = u32::try_from(wanted - drafts.len()).unwrap_or(MAX_PAGE_SIZE);
            let page = self
                .list_drafts(token, remaining, page_token.as_deref())
                .await?;
            let got_any = !page.drafts.is_empty();
            drafts.extend(page.drafts);
            match page.next_page_token {
                Some(next) if got_any && !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        drafts.truncate(wanted);
        Ok(drafts)
    }

    /// Fetches a draft with message headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_draft(&self, token: &str, id: &str) -> Result<GmailDraft, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, &format!("drafts/{id}"))
            .query(&[("format", "metadata")]);
        self.rest.json(request).await
    }

    /// Fetches a draft with its full raw message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_draft_raw(&self, token: &str, id: &str) -> Result<GmailDraft, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, &format!("drafts/{id}"))
            .query(&[("format", "raw")]);
        self.rest.json(request).await
    }

    /// Creates a draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_draft(
        &self,
        token: &str,
        message: &OutgoingMessage,
        thread_id: Option<&str>,
    ) -> Result<DraftRef, BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, "drafts")
            .json(&json!({ "message": raw_request(message, thread_id) }));
        self.rest.json(request).await
    }

    /// Replaces a draft's content.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_draft(
        &self,
        token: &str,
        id: &str,
        message: &OutgoingMessage,
        thread_id: Option<&str>,
    ) -> Result<DraftRef, BackendError> {
        let request = self
            .rest
            .request(Method::PUT, token, &format!("drafts/{id}"))
            .json(&json!({ "id": id, "message": raw_request(message, thread_id) }));
        self.rest.json(request).await
    }

    /// Deletes a draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_draft(&self, token: &str, id: &str) -> Result<(), BackendError> {
        let request = self
            .rest
            .request(Method::DELETE, token, &format!("drafts/{id}"));
        self.rest.empty(request).await
    }

    /// Sends an existing draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send_draft(&self, token: &str, id: &str) -> Result<MessageRef, BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, "drafts/send")
            .json(&json!({ "id": id }));
        self.rest.json(request).await
    }

    /// Projects the latest message of a thread into a [`ThreadSnapshot`].
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be fetched or has no messages.
    pub async fn thread_snapshot(
        &self,
        token: &str,
        thread_id: &str,
        self_address: Option<&str>,
    ) -> Result<ThreadSnapshot, BackendError> {
        let thread = self.get_thread(token, thread_id).await?;
        snapshot_of(&thread, self_address).ok_or_else(|| {
            BackendError::status(Backend::Gmail, 404, &format!("thread {thread_id} is empty"))
        })
    }
}

fn metadata_query() -> Vec<(&'static str, &'static str)> {
    let mut query = vec![("format", "metadata")];
    query.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));
    query
}

fn raw_request(message: &OutgoingMessage, thread_id: Option<&str>) -> serde_json::Value {
    let mut body = json!({ "raw": message.to_raw() });
    if let Some(thread_id) = thread_id {
        body["threadId"] = json!(thread_id);
    }
    body
}

pub(crate) fn snapshot_of(thread: &GmailThread, self_address: Option<&str>) -> Option<ThreadSnapshot> {
    let last = thread.latest_sent()?;
    let addresses = |name: &str| last.header(name).map(split_address_list).unwrap_or_default();

    Some(ThreadSnapshot {
        thread_id: thread.id.clone(),
        subject: last.header("Subject").unwrap_or_default().to_string(),
        last_message_id: last.header("Message-ID").map(str::to_string),
        references: last
            .header("References")
            .map(|r| r.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        reply_to_address: last
            .header("Reply-To")
            .or_else(|| last.header("From"))
            .and_then(|v| split_address_list(v).into_iter().next()),
        all_to: addresses("To"),
        all_cc: addresses("Cc"),
        self_address: self_address.map(str::to_string),
    })
}
