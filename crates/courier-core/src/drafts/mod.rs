//! Draft listing across every backend an account can reach.
//!
//! A [`DraftAggregationService`] owns an ordered list of [`DraftSource`]s
//! and merges their listings. A failing source only drops its own drafts.

mod service;
mod sources;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use service::{DraftAggregationService, DraftReport, SourceFailure};
pub use sources::{GmailDraftSource, GraphDraftSource, NativeDraftSource};

/// Which backend a draft lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftOrigin {
    /// Gmail drafts.
    Gmail,
    /// Microsoft Graph drafts folder.
    Graph,
    /// The client's proprietary backend.
    Native,
}

impl std::fmt::Display for DraftOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gmail => "gmail",
            Self::Graph => "graph",
            Self::Native => "native",
        })
    }
}

/// Identity of a draft: ids are only unique within one origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftKey {
    /// Backend holding the draft.
    pub source: DraftOrigin,
    /// Backend-local id.
    pub id: String,
}

impl DraftKey {
    /// Creates a key.
    #[must_use]
    pub fn new(source: DraftOrigin, id: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DraftKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// Summary of one draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    /// Backend-local id.
    pub id: String,
    /// Subject line.
    pub subject: String,
    /// Sender.
    pub from: String,
    /// Recipients.
    pub to: Vec<String>,
    /// Short body preview.
    pub preview: String,
    /// Last edit or creation time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Backend that produced this draft.
    pub source: DraftOrigin,
    /// Thread the draft belongs to.
    pub thread_id: Option<String>,
}

impl Draft {
    /// The `(source, id)` key.
    #[must_use]
    pub fn key(&self) -> DraftKey {
        DraftKey::new(self.source, self.id.clone())
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
    /// New subject.
    pub subject: Option<String>,
    /// New plain-text body.
    pub body: Option<String>,
    /// Replacement recipients.
    pub to: Option<Vec<String>>,
    /// Replacement copied recipients.
    pub cc: Option<Vec<String>>,
}

impl DraftUpdate {
    /// True when the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.subject.is_none() && self.body.is_none() && self.to.is_none() && self.cc.is_none()
    }
}

/// One backend's drafts.
///
/// Implementations tag every draft they return with [`origin`](Self::origin).
#[async_trait]
pub trait DraftSource: Send + Sync {
    /// Tag applied to this source's drafts.
    fn origin(&self) -> DraftOrigin;

    /// Lists up to `limit` drafts after skipping `offset`.
    async fn list_drafts(&self, limit: usize, offset: usize) -> Result<Vec<Draft>>;

    /// Applies `update` to draft `id`.
    async fn update_draft(&self, id: &str, update: &DraftUpdate) -> Result<()> {
        let _ = update;
        Err(Error::Unsupported(format!(
            "{} drafts cannot be updated (draft {id})",
            self.origin()
        )))
    }

    /// Deletes draft `id`.
    async fn delete_draft(&self, id: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} drafts cannot be deleted (draft {id})",
            self.origin()
        )))
    }
}
