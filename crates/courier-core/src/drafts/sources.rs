//! Draft sources backed by the REST clients.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Draft, DraftOrigin, DraftSource, DraftUpdate};
use crate::backend::gmail::GmailDraft;
use crate::backend::graph::{GraphMessage, MessagePatch, Recipient};
use crate::backend::native::NativeDraft;
use crate::backend::{GmailClient, GraphClient, NativeClient, NativeCredential, OutgoingMessage};
use crate::credentials::{CredentialError, CredentialStore};
use crate::threading::split_address_list;
use crate::{Error, Result};

/// Longest preview kept for native drafts.
const PREVIEW_CHARS: usize = 140;

/// Gmail drafts of one account.
#[derive(Debug, Clone)]
pub struct GmailDraftSource {
    client: GmailClient,
    store: Arc<CredentialStore>,
    account: String,
}

impl GmailDraftSource {
    /// Creates a source that authenticates as `account`.
    #[must_use]
    pub fn new(client: GmailClient, store: Arc<CredentialStore>, account: impl Into<String>) -> Self {
        Self {
            client,
            store,
            account: account.into(),
        }
    }

    async fn token(&self) -> Result<String> {
        Ok(self.store.get(&self.account).await?.access_token)
    }
}

fn gmail_draft(draft: GmailDraft) -> Draft {
    let message = draft.message;
    Draft {
        subject: message.header("Subject").unwrap_or_default().to_string(),
        from: message.header("From").unwrap_or_default().to_string(),
        to: message.header("To").map(split_address_list).unwrap_or_default(),
        preview: message.snippet.clone(),
        timestamp: message.received_at(),
        source: DraftOrigin::Gmail,
        thread_id: Some(message.thread_id).filter(|t| !t.is_empty()),
        id: draft.id,
    }
}

#[async_trait]
impl DraftSource for GmailDraftSource {
    fn origin(&self) -> DraftOrigin {
        DraftOrigin::Gmail
    }

    async fn list_drafts(&self, limit: usize, offset: usize) -> Result<Vec<Draft>> {
        let token = self.token().await?;
        let listed = self
            .client
            .list_drafts_upto(&token, limit.saturating_add(offset))
            .await?;

        let mut drafts = Vec::new();
        for entry in listed.iter().skip(offset).take(limit) {
            let full = self.client.get_draft(&token, &entry.id).await?;
            drafts.push(gmail_draft(full));
        }
        Ok(drafts)
    }

    async fn update_draft(&self, id: &str, update: &DraftUpdate) -> Result<()> {
        let token = self.token().await?;
        // Gmail replaces the whole message, so start from the current one.
        let current = self.client.get_draft(&token, id).await?.message;
        let body = match &update.body {
            Some(body) => body.clone(),
            None => self
                .client
                .get_draft_raw(&token, id)
                .await?
                .message
                .raw_body()
                .unwrap_or_default(),
        };
        let header_list = |name: &str| {
            current
                .header(name)
                .map(split_address_list)
                .unwrap_or_default()
        };

        let message = OutgoingMessage {
            from: current.header("From").map(str::to_string),
            to: update.to.clone().unwrap_or_else(|| header_list("To")),
            cc: update.cc.clone().unwrap_or_else(|| header_list("Cc")),
            subject: update
                .subject
                .clone()
                .unwrap_or_else(|| current.header("Subject").unwrap_or_default().to_string()),
            body,
            in_reply_to: current.header("In-Reply-To").map(str::to_string),
            references: current
                .header("References")
                .map(|r| r.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            forwarded: None,
        };
        let thread_id = Some(current.thread_id.as_str()).filter(|t| !t.is_empty());
        self.client
            .update_draft(&token, id, &message, thread_id)
            .await?;
        Ok(())
    }

    async fn delete_draft(&self, id: &str) -> Result<()> {
        let token = self.token().await?;
        self.client.delete_draft(&token, id).await?;
        Ok(())
    }
}

/// Graph drafts folder of one account.
#[derive(Debug, Clone)]
pub struct GraphDraftSource {
    client: GraphClient,
    store: Arc<CredentialStore>,
    account: String,
}

impl GraphDraftSource {
    /// Creates a source that authenticates as `account`.
    #[must_use]
    pub fn new(client: GraphClient, store: Arc<CredentialStore>, account: impl Into<String>) -> Self {
        Self {
            client,
            store,
            account: account.into(),
        }
    }

    async fn token(&self) -> Result<String> {
        Ok(self.store.get(&self.account).await?.access_token)
    }
}

fn graph_draft(message: GraphMessage) -> Draft {
    Draft {
        subject: message.subject.unwrap_or_default(),
        from: message.from.as_ref().map(Recipient::display).unwrap_or_default(),
        to: message.to_recipients.iter().map(Recipient::display).collect(),
        preview: message.body_preview,
        timestamp: message
            .last_modified_date_time
            .or(message.received_date_time),
        source: DraftOrigin::Graph,
        thread_id: message.conversation_id,
        id: message.id,
    }
}

#[async_trait]
impl DraftSource for GraphDraftSource {
    fn origin(&self) -> DraftOrigin {
        DraftOrigin::Graph
    }

    async fn list_drafts(&self, limit: usize, offset: usize) -> Result<Vec<Draft>> {
        let token = self.token().await?;
        let page = self.client.list_drafts(&token, limit, offset).await?;
        Ok(page.value.into_iter().map(graph_draft).collect())
    }

    async fn update_draft(&self, id: &str, update: &DraftUpdate) -> Result<()> {
        let patch = MessagePatch {
            subject: update.subject.clone(),
            body: update.body.clone(),
            to: update.to.clone(),
            cc: update.cc.clone(),
        };
        if patch.is_empty() {
            return Ok(());
        }
        let token = self.token().await?;
        self.client.patch_message(&token, id, &patch).await?;
        Ok(())
    }

    async fn delete_draft(&self, id: &str) -> Result<()> {
        let token = self.token().await?;
        self.client.delete_message(&token, id).await?;
        Ok(())
    }
}

/// Drafts kept only in the client's proprietary backend.
#[derive(Debug, Clone)]
pub struct NativeDraftSource {
    client: NativeClient,
    store: Arc<CredentialStore>,
    account: String,
}

impl NativeDraftSource {
    /// Creates a source using `account`'s proprietary token.
    #[must_use]
    pub fn new(client: NativeClient, store: Arc<CredentialStore>, account: impl Into<String>) -> Self {
        Self {
            client,
            store,
            account: account.into(),
        }
    }

    async fn credential(&self) -> Result<NativeCredential> {
        let record = self.store.get(&self.account).await?;
        NativeCredential::from_record(&record).ok_or_else(|| {
            Error::Credential(CredentialError::LiveSessionRequired {
                account: record.account_email,
            })
        })
    }

    async fn current(&self, credential: &NativeCredential, id: &str) -> Result<NativeDraft> {
        self.client
            .sync(credential, None)
            .await?
            .drafts
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::NotFound(format!("native draft {id}")))
    }
}

fn native_draft(draft: NativeDraft) -> Draft {
    Draft {
        preview: draft.body.chars().take(PREVIEW_CHARS).collect(),
        subject: draft.subject,
        from: draft.from,
        to: draft.to,
        timestamp: draft.updated_at,
        source: DraftOrigin::Native,
        thread_id: draft.thread_id,
        id: draft.id,
    }
}

#[async_trait]
impl DraftSource for NativeDraftSource {
    fn origin(&self) -> DraftOrigin {
        DraftOrigin::Native
    }

    async fn list_drafts(&self, limit: usize, offset: usize) -> Result<Vec<Draft>> {
        let credential = self.credential().await?;
        let synced = self.client.sync(&credential, None).await?;
        Ok(synced
            .drafts
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(native_draft)
            .collect())
    }

    async fn update_draft(&self, id: &str, update: &DraftUpdate) -> Result<()> {
        let credential = self.credential().await?;
        let mut draft = self.current(&credential, id).await?;
        if let Some(subject) = &update.subject {
            draft.subject.clone_from(subject);
        }
        if let Some(body) = &update.body {
            draft.body.clone_from(body);
        }
        if let Some(to) = &update.to {
            draft.to.clone_from(to);
        }
        if let Some(cc) = &update.cc {
            draft.cc.clone_from(cc);
        }
        self.client.write_draft(&credential, &draft).await?;
        Ok(())
    }

    async fn delete_draft(&self, id: &str) -> Result<()> {
        let credential = self.credential().await?;
        self.client.delete_draft(&credential, id).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::{BackendKind, CredentialRecord, MemoryPersistence, TokenRefresher};
    use crate::drafts::DraftAggregationService;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(
            &self,
            record: &CredentialRecord,
        ) -> crate::credentials::CredentialResult<CredentialRecord> {
            Err(CredentialError::RefreshFailed {
                account: record.account_email.clone(),
                detail: "not in tests".into(),
            })
        }
    }

    async fn store(record: CredentialRecord) -> Arc<CredentialStore> {
        let persistence = Arc::new(MemoryPersistence::with_records([record]));
        Arc::new(
            CredentialStore::open(persistence, Arc::new(NoRefresh), Duration::minutes(5))
                .await
                .unwrap(),
        )
    }

    fn record(kind: BackendKind) -> CredentialRecord {
        CredentialRecord::new("me@x.com", "tok", Utc::now() + Duration::hours(1), kind)
            .with_proprietary("ptok", "u1")
    }

    #[tokio::test]
    async fn gmail_listing_fetches_each_draft() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drafts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "drafts": [
                { "id": "r1", "message": { "id": "m1", "threadId": "t1" } },
                { "id": "r2", "message": { "id": "m2", "threadId": "t2" } }
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drafts/r2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r2",
                "message": { "id": "m2", "threadId": "t2", "snippet": "hello",
                    "payload": { "headers": [
                        { "name": "Subject", "value": "Plan" },
                        { "name": "To", "value": "a@x.com, b@x.com" }
                    ]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = GmailDraftSource::new(
            GmailClient::new(reqwest::Client::new(), server.uri()),
            store(record(BackendKind::Google)).await,
            "me@x.com",
        );
        let drafts = source.list_drafts(1, 1).await.unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, "r2");
        assert_eq!(drafts[0].source, DraftOrigin::Gmail);
        assert_eq!(drafts[0].to, vec!["a@x.com", "b@x.com"]);
        assert_eq!(drafts[0].thread_id.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn gmail_offset_past_first_page_reads_next_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drafts"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "drafts": [
                { "id": "r3", "message": { "id": "m3", "threadId": "t3" } }
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drafts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "drafts": [
                { "id": "r1", "message": { "id": "m1", "threadId": "t1" } },
                { "id": "r2", "message": { "id": "m2", "threadId": "t2" } }
            ], "nextPageToken": "p2" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drafts/r3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r3", "message": { "id": "m3", "threadId": "t3" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = GmailDraftSource::new(
            GmailClient::new(reqwest::Client::new(), server.uri()),
            store(record(BackendKind::Google)).await,
            "me@x.com",
        );
        let drafts = source.list_drafts(5, 2).await.unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, "r3");
    }

    #[tokio::test]
    async fn native_update_merges_into_current_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "drafts": [
                { "id": "draft00a", "subject": "Old", "body": "keep me", "to": ["a@x.com"] }
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/drafts.write"))
            .and(body_partial_json(json!({ "draft": {
                "id": "draft00a", "subject": "New", "body": "keep me", "to": ["a@x.com"]
            }})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "draft00a" })))
            .expect(1)
            .mount(&server)
            .await;

        let source = NativeDraftSource::new(
            NativeClient::new(reqwest::Client::new(), server.uri()),
            store(record(BackendKind::Microsoft)).await,
            "me@x.com",
        );
        let update = DraftUpdate {
            subject: Some("New".into()),
            ..DraftUpdate::default()
        };
        source.update_draft("draft00a", &update).await.unwrap();
    }

    #[tokio::test]
    async fn native_source_without_proprietary_token_fails_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mailFolders/drafts/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [
                { "id": "o1", "subject": "Hi", "isDraft": true, "conversationId": "c1" }
            ]})))
            .mount(&server)
            .await;

        let plain = CredentialRecord::new(
            "me@x.com",
            "tok",
            Utc::now() + Duration::hours(1),
            BackendKind::Microsoft,
        );
        let store = store(plain).await;
        let service = DraftAggregationService::default()
            .with_source(Arc::new(GraphDraftSource::new(
                GraphClient::new(reqwest::Client::new(), server.uri()),
                store.clone(),
                "me@x.com",
            )))
            .with_source(Arc::new(NativeDraftSource::new(
                NativeClient::new(reqwest::Client::new(), server.uri()),
                store,
                "me@x.com",
            )));

        let report = service.list_drafts_report(10, 0).await;
        assert_eq!(report.drafts.len(), 1);
        assert_eq!(report.drafts[0].source, DraftOrigin::Graph);
        assert_eq!(report.drafts[0].thread_id.as_deref(), Some("c1"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].origin, DraftOrigin::Native);
    }
}
