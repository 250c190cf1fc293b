//! Sending reply plans through the backend that owns the thread.
//!
//! Planning and sending are separate steps. [`MailBackend::prepare`] reads
//! the thread once and computes a [`ReplyPlan`]; [`MailBackend::send`]
//! encodes that plan for its backend without recomputing anything.

use serde::Serialize;
use tracing::info;

use crate::backend::graph::{self, MessagePatch};
use crate::backend::{Backend, BackendError, GmailClient, GraphClient, OutgoingMessage, gmail};
use crate::config::Config;
use crate::credentials::BackendKind;
use crate::threading::{ReplyMode, ReplyPlan, build_reply_plan};
use crate::Result;

/// A plan plus the backend ids needed to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedReply {
    /// What will be sent.
    pub plan: ReplyPlan,
    /// Gmail thread id or Graph conversation id.
    pub thread_id: String,
    /// Backend id of the message being answered.
    pub anchor_message_id: String,
}

/// Outcome of a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentReply {
    /// Backend id of the sent message (the draft id on Graph).
    pub message_id: String,
    /// Thread the message landed in.
    pub thread_id: String,
}

/// The REST backend serving an account.
#[derive(Debug, Clone)]
pub enum MailBackend {
    /// Gmail: raw RFC 5322 envelopes.
    Gmail(GmailClient),
    /// Graph: reply drafts patched then sent.
    Graph(GraphClient),
}

impl MailBackend {
    /// Backend for an account of `kind`, using the configured base URLs.
    #[must_use]
    pub fn for_kind(kind: BackendKind, http: reqwest::Client, config: &Config) -> Self {
        match kind {
            BackendKind::Google => Self::Gmail(GmailClient::new(http, &config.gmail_api_base)),
            BackendKind::Microsoft => Self::Graph(GraphClient::new(http, &config.graph_api_base)),
        }
    }

    /// Reads `thread_id` and plans a `mode` response to its latest message.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be read or is empty, or if
    /// no plan can be built (see [`build_reply_plan`]).
    pub async fn prepare(
        &self,
        token: &str,
        thread_id: &str,
        mode: ReplyMode,
        explicit_to: Option<&[String]>,
        self_address: Option<&str>,
    ) -> Result<PreparedReply> {
        let (snapshot, anchor) = match self {
            Self::Gmail(client) => {
                let thread = client.get_thread(token, thread_id).await?;
                let anchor = thread.latest_sent().map(|m| m.id.clone());
                (gmail::snapshot_of(&thread, self_address), anchor)
            }
            Self::Graph(client) => {
                let messages = client.conversation_messages(token, thread_id).await?;
                let anchor = messages.last().map(|m| m.id.clone());
                (graph::snapshot_of(thread_id, &messages, self_address), anchor)
            }
        };
        let (Some(snapshot), Some(anchor_message_id)) = (snapshot, anchor) else {
            return Err(BackendError::status(
                self.backend(),
                404,
                &format!("thread {thread_id} has no messages"),
            )
            .into());
        };

        let plan = build_reply_plan(&snapshot, mode, explicit_to)?;
        Ok(PreparedReply {
            plan,
            thread_id: thread_id.to_string(),
            anchor_message_id,
        })
    }

    /// Sends `prepared` with `body` as the new text.
    ///
    /// Replies and forwards keep the original message: Graph quotes or
    /// attaches it when the reply draft is created, and Gmail forwards carry
    /// it as a `message/rfc822` part.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend call fails.
    pub async fn send(&self, token: &str, prepared: &PreparedReply, body: &str) -> Result<SentReply> {
        let plan = &prepared.plan;
        let sent = match self {
            Self::Gmail(client) => {
                let mut message = OutgoingMessage::from_plan(plan, body);
                if plan.mode == ReplyMode::Forward {
                    let original = client
                        .get_message_raw(token, &prepared.anchor_message_id)
                        .await?;
                    if let Some(text) = original.raw_message() {
                        message = message.forwarding(text);
                    }
                }
                let sent = client
                    .send(token, &message, Some(prepared.thread_id.as_str()))
                    .await?;
                SentReply {
                    message_id: sent.id,
                    thread_id: if sent.thread_id.is_empty() {
                        prepared.thread_id.clone()
                    } else {
                        sent.thread_id
                    },
                }
            }
            Self::Graph(client) => {
                let anchor = &prepared.anchor_message_id;
                let draft = match plan.mode {
                    ReplyMode::Reply => client.create_reply(token, anchor, false, body).await?,
                    ReplyMode::ReplyAll => client.create_reply(token, anchor, true, body).await?,
                    ReplyMode::Forward => client.create_forward(token, anchor, body).await?,
                };
                // The body stays as Graph built it around the comment.
                let patch = MessagePatch {
                    subject: Some(plan.subject.clone()),
                    body: None,
                    to: Some(plan.to.clone()),
                    cc: Some(plan.cc.clone()),
                };
                client.patch_message(token, &draft.id, &patch).await?;
                client.send_draft(token, &draft.id).await?;
                SentReply {
                    message_id: draft.id,
                    thread_id: prepared.thread_id.clone(),
                }
            }
        };
        info!(
            backend = %self.backend(),
            mode = %plan.mode,
            thread = %sent.thread_id,
            "Reply sent"
        );
        Ok(sent)
    }

    const fn backend(&self) -> Backend {
        match self {
            Self::Gmail(_) => Backend::Gmail,
            Self::Graph(_) => Backend::Graph,
        }
    }
}
