//! Microsoft Graph mail client.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Backend, BackendError, Rest};
use crate::threading::ThreadSnapshot;

/// Fields requested for message listings.
const MESSAGE_FIELDS: &str = "id,subject,from,replyTo,toRecipients,ccRecipients,bodyPreview,\
conversationId,internetMessageId,receivedDateTime,lastModifiedDateTime,isDraft";

/// `emailAddress` wrapper Graph uses for every recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// The address itself.
    pub email_address: EmailAddress,
}

/// Display name and address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Mailbox address.
    #[serde(default)]
    pub address: String,
}

impl Recipient {
    /// Recipient with only an address.
    #[must_use]
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            email_address: EmailAddress {
                name: None,
                address: address.into(),
            },
        }
    }

    /// `Name <address>` when a name is known, else the bare address.
    #[must_use]
    pub fn display(&self) -> String {
        match self.email_address.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() && name != self.email_address.address => {
                format!("{name} <{}>", self.email_address.address)
            }
            _ => self.email_address.address.clone(),
        }
    }
}

/// Raw header returned in `internetMessageHeaders`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InternetHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// A Graph message resource (selected fields).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    /// Message id.
    pub id: String,
    /// Subject line.
    #[serde(default)]
    pub subject: Option<String>,
    /// Sender.
    pub from: Option<Recipient>,
    /// Explicit reply targets.
    #[serde(default)]
    pub reply_to: Vec<Recipient>,
    /// Primary recipients.
    #[serde(default)]
    pub to_recipients: Vec<Recipient>,
    /// Copied recipients.
    #[serde(default)]
    pub cc_recipients: Vec<Recipient>,
    /// Plain-text preview.
    #[serde(default)]
    pub body_preview: String,
    /// Conversation (thread) id.
    pub conversation_id: Option<String>,
    /// RFC 5322 `Message-ID`.
    pub internet_message_id: Option<String>,
    /// When the message arrived.
    pub received_date_time: Option<DateTime<Utc>>,
    /// Last edit, meaningful for drafts.
    pub last_modified_date_time: Option<DateTime<Utc>>,
    /// True for unsent drafts.
    #[serde(default)]
    pub is_draft: bool,
    /// Raw headers; only present when selected.
    #[serde(default)]
    pub internet_message_headers: Vec<InternetHeader>,
}

impl GraphMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.internet_message_headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// One page of a message collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePage {
    /// Messages on this page.
    #[serde(default)]
    pub value: Vec<GraphMessage>,
    /// Link to the next page.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Partial update sent with `PATCH /messages/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// New subject.
    pub subject: Option<String>,
    /// New plain-text body.
    pub body: Option<String>,
    /// Replacement primary recipients.
    pub to: Option<Vec<String>>,
    /// Replacement copied recipients.
    pub cc: Option<Vec<String>>,
}

impl MessagePatch {
    /// True when nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.subject.is_none() && self.body.is_none() && self.to.is_none() && self.cc.is_none()
    }

    fn to_json(&self) -> Value {
        let recipients = |list: &[String]| -> Vec<Recipient> {
            list.iter()
                .map(|a| Recipient::address(crate::threading::mailbox(a)))
                .collect()
        };
        let mut body = json!({});
        if let Some(subject) = &self.subject {
            body["subject"] = json!(subject);
        }
        if let Some(content) = &self.body {
            body["body"] = json!({ "contentType": "Text", "content": content });
        }
        if let Some(to) = &self.to {
            body["toRecipients"] = json!(recipients(to));
        }
        if let Some(cc) = &self.cc {
            body["ccRecipients"] = json!(recipients(cc));
        }
        body
    }
}

/// Stateless Graph mail client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    rest: Rest,
}

impl GraphClient {
    /// Creates a client for `base` (normally `https://graph.microsoft.com/v1.0/me`).
    #[must_use]
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            rest: Rest::new(http, base, Backend::Graph),
        }
    }

    /// Lists messages, newest first, from a folder or the whole mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_messages(
        &self,
        token: &str,
        folder: Option<&str>,
        top: usize,
        skip: usize,
    ) -> Result<MessagePage, BackendError> {
        let path = folder.map_or_else(
            || "messages".to_string(),
            |f| format!("mailFolders/{f}/messages"),
        );
        let request = self.rest.request(Method::GET, token, &path).query(&[
            ("$top", top.to_string()),
            ("$skip", skip.to_string()),
            ("$select", MESSAGE_FIELDS.to_string()),
            ("$orderby", "receivedDateTime desc".to_string()),
        ]);
        self.rest.json(request).await
    }

    /// Fetches one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_message(&self, token: &str, id: &str) -> Result<GraphMessage, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, &format!("messages/{id}"))
            .query(&[("$select", MESSAGE_FIELDS)]);
        self.rest.json(request).await
    }

    /// Moves a message to another folder, returning the moved copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn move_message(
        &self,
        token: &str,
        id: &str,
        destination: &str,
    ) -> Result<GraphMessage, BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, &format!("messages/{id}/move"))
            .json(&json!({ "destinationId": destination }));
        self.rest.json(request).await
    }

    /// Creates a reply draft (`createReply` or `createReplyAll`).
    ///
    /// `comment` becomes the new text above the quoted original, which Graph
    /// builds into the draft body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_reply(
        &self,
        token: &str,
        id: &str,
        reply_all: bool,
        comment: &str,
    ) -> Result<GraphMessage, BackendError> {
        let action = if reply_all { "createReplyAll" } else { "createReply" };
        let request = self
            .rest
            .request(Method::POST, token, &format!("messages/{id}/{action}"))
            .json(&json!({ "comment": comment }));
        self.rest.json(request).await
    }

    /// Creates a forward draft with `comment` above the forwarded message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_forward(
        &self,
        token: &str,
        id: &str,
        comment: &str,
    ) -> Result<GraphMessage, BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, &format!("messages/{id}/createForward"))
            .json(&json!({ "comment": comment }));
        self.rest.json(request).await
    }

    /// Applies a partial update to a message, usually a draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn patch_message(
        &self,
        token: &str,
        id: &str,
        patch: &MessagePatch,
    ) -> Result<GraphMessage, BackendError> {
        let request = self
            .rest
            .request(Method::PATCH, token, &format!("messages/{id}"))
            .json(&patch.to_json());
        self.rest.json(request).await
    }

    /// Sends an existing draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send_draft(&self, token: &str, id: &str) -> Result<(), BackendError> {
        let request = self
            .rest
            .request(Method::POST, token, &format!("messages/{id}/send"));
        self.rest.empty(request).await
    }

    /// Lists the drafts folder, most recently edited first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_drafts(
        &self,
        token: &str,
        top: usize,
        skip: usize,
    ) -> Result<MessagePage, BackendError> {
        let request = self
            .rest
            .request(Method::GET, token, "mailFolders/drafts/messages")
            .query(&[
                ("$top", top.to_string()),
                ("$skip", skip.to_string()),
                ("$select", MESSAGE_FIELDS.to_string()),
                ("$orderby", "lastModifiedDateTime desc".to_string()),
            ]);
        self.rest.json(request).await
    }

    /// Deletes a message or draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_message(&self, token: &str, id: &str) -> Result<(), BackendError> {
        let request = self
            .rest
            .request(Method::DELETE, token, &format!("messages/{id}"));
        self.rest.empty(request).await
    }

    /// All non-draft messages of a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn conversation_messages(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> Result<Vec<GraphMessage>, BackendError> {
        let filter = format!("conversationId eq '{}'", conversation_id.replace('\'', "''"));
        let request = self.rest.request(Method::GET, token, "messages").query(&[
            ("$filter", filter),
            ("$select", format!("{MESSAGE_FIELDS},internetMessageHeaders")),
            ("$top", "50".to_string()),
        ]);
        let mut page: MessagePage = self.rest.json(request).await?;
        let mut messages = std::mem::take(&mut page.value);
        while let Some(next) = page.next_link.take() {
            page = self
                .rest
                .json(self.rest.request_url(Method::GET, token, &next))
                .await?;
            messages.append(&mut page.value);
        }

        // Graph rejects $orderby combined with this filter, so sort here.
        messages.retain(|m| !m.is_draft);
        messages.sort_by_key(|m| m.received_date_time);
        Ok(messages)
    }

    /// Projects the latest message of a conversation into a [`ThreadSnapshot`].
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation cannot be fetched or is empty.
    pub async fn thread_snapshot(
        &self,
        token: &str,
        conversation_id: &str,
        self_address: Option<&str>,
    ) -> Result<ThreadSnapshot, BackendError> {
        let messages = self.conversation_messages(token, conversation_id).await?;
        snapshot_of(conversation_id, &messages, self_address).ok_or_else(|| {
            BackendError::status(
                Backend::Graph,
                404,
                &format!("conversation {conversation_id} is empty"),
            )
        })
    }
}

pub(crate) fn snapshot_of(
    conversation_id: &str,
    messages: &[GraphMessage],
    self_address: Option<&str>,
) -> Option<ThreadSnapshot> {
    let (last, earlier) = messages.split_last()?;

    // Prefer the header chain; fall back to the ids seen in the conversation.
    let references = last.header("References").map_or_else(
        || {
            earlier
                .iter()
                .filter_map(|m| m.internet_message_id.clone())
                .collect()
        },
        |r| r.split_whitespace().map(str::to_string).collect(),
    );

    Some(ThreadSnapshot {
        thread_id: conversation_id.to_string(),
        subject: last.subject.clone().unwrap_or_default(),
        last_message_id: last.internet_message_id.clone(),
        references,
        reply_to_address: last
            .reply_to
            .first()
            .or(last.from.as_ref())
            .map(Recipient::display),
        all_to: last.to_recipients.iter().map(Recipient::display).collect(),
        all_cc: last.cc_recipients.iter().map(Recipient::display).collect(),
        self_address: self_address.map(str::to_string),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GraphClient {
        GraphClient::new(reqwest::Client::new(), format!("{}/v1.0/me", server.uri()))
    }

    fn person(name: &str, address: &str) -> Value {
        json!({ "emailAddress": { "name": name, "address": address } })
    }

    #[tokio::test]
    async fn snapshot_orders_conversation_and_skips_drafts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/messages"))
            .and(query_param("$filter", "conversationId eq 'c1'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [
                {
                    "id": "b", "subject": "RE: Budget", "conversationId": "c1",
                    "internetMessageId": "<b@x>", "receivedDateTime": "2024-05-02T10:00:00Z",
                    "from": person("Ann", "ann@x.com"),
                    "toRecipients": [person("Me", "me@x.com"), person("", "bo@x.com")],
                    "ccRecipients": [person("Cy", "cy@x.com")]
                },
                {
                    "id": "d", "subject": "RE: Budget", "conversationId": "c1", "isDraft": true,
                    "receivedDateTime": "2024-05-03T10:00:00Z"
                },
                {
                    "id": "a", "subject": "Budget", "conversationId": "c1",
                    "internetMessageId": "<a@x>", "receivedDateTime": "2024-05-01T10:00:00Z"
                }
            ]})))
            .mount(&server)
            .await;

        let snap = client(&server)
            .thread_snapshot("tok", "c1", Some("me@x.com"))
            .await
            .unwrap();

        assert_eq!(snap.subject, "RE: Budget");
        assert_eq!(snap.last_message_id.as_deref(), Some("<b@x>"));
        assert_eq!(snap.references, vec!["<a@x>"]);
        assert_eq!(snap.reply_to_address.as_deref(), Some("Ann <ann@x.com>"));
        assert_eq!(snap.all_to, vec!["Me <me@x.com>", "bo@x.com"]);
        assert_eq!(snap.all_cc, vec!["Cy <cy@x.com>"]);
    }

    #[tokio::test]
    async fn conversation_follows_next_link() {
        let server = MockServer::start().await;
        let next = format!("{}/v1.0/me/messages?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/v1.0/me/messages"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [
                { "id": "late", "subject": "RE: Budget", "conversationId": "c1",
                  "internetMessageId": "<late@x>", "receivedDateTime": "2024-06-01T10:00:00Z",
                  "from": person("Bo", "bo@x.com") }
            ]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/messages"))
            .and(query_param("$filter", "conversationId eq 'c1'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "id": "a", "subject": "Budget", "conversationId": "c1",
                      "internetMessageId": "<a@x>", "receivedDateTime": "2024-05-01T10:00:00Z" }
                ],
                "@odata.nextLink": next
            })))
            .expect(1)
            .mount(&server)
            .await;

        let messages = client(&server)
            .conversation_messages("tok", "c1")
            .await
            .unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "late"]);

        let snap = snapshot_of("c1", &messages, None).unwrap();
        assert_eq!(snap.last_message_id.as_deref(), Some("<late@x>"));
        assert_eq!(snap.references, vec!["<a@x>"]);
    }

    #[tokio::test]
    async fn reply_draft_carries_comment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/me/messages/m1/createReplyAll"))
            .and(body_json(json!({ "comment": "Works for me" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "d9" })))
            .expect(1)
            .mount(&server)
            .await;

        let draft = client(&server)
            .create_reply("tok", "m1", true, "Works for me")
            .await
            .unwrap();
        assert_eq!(draft.id, "d9");
    }

    #[tokio::test]
    async fn patch_sends_only_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1.0/me/messages/d1"))
            .and(body_json(json!({
                "toRecipients": [{ "emailAddress": { "address": "ann@x.com" } }],
                "body": { "contentType": "Text", "content": "hi" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "d1" })))
            .expect(1)
            .mount(&server)
            .await;

        let patch = MessagePatch {
            to: Some(vec!["Ann <ANN@x.com>".into()]),
            body: Some("hi".into()),
            ..MessagePatch::default()
        };
        let updated = client(&server).patch_message("tok", "d1", &patch).await.unwrap();
        assert_eq!(updated.id, "d1");
    }

    #[tokio::test]
    async fn drafts_come_from_drafts_folder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/mailFolders/drafts/messages"))
            .and(query_param("$top", "5"))
            .and(query_param("$skip", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [
                { "id": "d1", "subject": "Hello", "isDraft": true,
                  "lastModifiedDateTime": "2024-05-01T10:00:00Z" }
            ]})))
            .mount(&server)
            .await;

        let page = client(&server).list_drafts("tok", 5, 10).await.unwrap();
        assert_eq!(page.value.len(), 1);
        assert!(page.value[0].is_draft);
    }

    #[tokio::test]
    async fn send_accepts_empty_202() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/me/messages/d1/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).send_draft("tok", "d1").await.unwrap();
    }

    #[test]
    fn recipient_display_omits_redundant_name() {
        let r: Recipient = serde_json::from_value(person("a@x.com", "a@x.com")).unwrap();
        assert_eq!(r.display(), "a@x.com");
    }
}
