//! Fan-out draft listing and draft mutation routing.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{Draft, DraftKey, DraftOrigin, DraftSource, DraftUpdate};
use crate::{Error, Result};

/// How many drafts a fresh listing fetches when locating an unknown id.
const LOCATE_LIMIT: usize = 100;

/// A source whose listing failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    /// Origin of the failed source.
    pub origin: DraftOrigin,
    /// Position of the source in registration order.
    pub index: usize,
    /// Rendered error.
    pub error: String,
}

/// Listing result including per-source failures.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftReport {
    /// Drafts from every source that answered, in registration order.
    pub drafts: Vec<Draft>,
    /// Sources that did not answer.
    pub failures: Vec<SourceFailure>,
}

/// Merges drafts from an ordered set of sources.
pub struct DraftAggregationService {
    sources: Vec<Arc<dyn DraftSource>>,
    /// Last listing, each draft paired with the index of its source.
    last_listing: RwLock<Vec<(usize, Draft)>>,
}

impl std::fmt::Debug for DraftAggregationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origins: Vec<_> = self.sources.iter().map(|s| s.origin()).collect();
        f.debug_struct("DraftAggregationService")
            .field("sources", &origins)
            .finish_non_exhaustive()
    }
}

impl Default for DraftAggregationService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DraftAggregationService {
    /// Creates a service over `sources`, kept in the given order.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn DraftSource>>) -> Self {
        Self {
            sources,
            last_listing: RwLock::new(Vec::new()),
        }
    }

    /// Appends a source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn DraftSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of registered sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Lists drafts from all sources, skipping sources that fail.
    ///
    /// Never fails; returns an empty list when every source fails.
    pub async fn list_drafts(&self, limit: usize, offset: usize) -> Vec<Draft> {
        self.list_drafts_report(limit, offset).await.drafts
    }

    /// Lists drafts from all sources and reports which ones failed.
    pub async fn list_drafts_report(&self, limit: usize, offset: usize) -> DraftReport {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                tokio::spawn(async move { source.list_drafts(limit, offset).await })
            })
            .collect();

        // Awaiting in registration order keeps the merge order stable
        // regardless of which source answers first.
        let mut report = DraftReport::default();
        let mut listing = Vec::new();
        for (index, handle) in handles.into_iter().enumerate() {
            let origin = self.sources[index].origin();
            let outcome = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join) => Err(format!("source task failed: {join}")),
            };
            match outcome {
                Ok(drafts) => {
                    debug!(%origin, index, count = drafts.len(), "draft source listed");
                    for mut draft in drafts {
                        draft.source = origin;
                        listing.push((index, draft.clone()));
                        report.drafts.push(draft);
                    }
                }
                Err(error) => {
                    warn!(%origin, index, %error, "draft source failed; skipping");
                    report.failures.push(SourceFailure {
                        origin,
                        index,
                        error,
                    });
                }
            }
        }

        *self.last_listing.write().await = listing;
        report
    }

    /// Updates the draft with backend-local id `id`.
    ///
    /// Returns the key of the draft that was changed.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no source lists the id; [`Error::Unsupported`]
    /// if the owning source cannot update drafts; otherwise the source's error.
    pub async fn update_draft(&self, id: &str, update: &DraftUpdate) -> Result<DraftKey> {
        let (index, key) = self.locate(|d| d.id == id, id).await?;
        self.sources[index].update_draft(&key.id, update).await?;
        Ok(key)
    }

    /// Deletes the draft with backend-local id `id`.
    ///
    /// # Errors
    ///
    /// Same as [`update_draft`](Self::update_draft).
    pub async fn delete_draft(&self, id: &str) -> Result<DraftKey> {
        let (index, key) = self.locate(|d| d.id == id, id).await?;
        self.sources[index].delete_draft(&key.id).await?;
        self.forget(index, &key).await;
        Ok(key)
    }

    /// Updates the draft identified by `key`.
    ///
    /// # Errors
    ///
    /// Same as [`update_draft`](Self::update_draft).
    pub async fn update_draft_key(&self, key: &DraftKey, update: &DraftUpdate) -> Result<()> {
        let (index, _) = self
            .locate(|d| d.source == key.source && d.id == key.id, &key.to_string())
            .await?;
        self.sources[index].update_draft(&key.id, update).await
    }

    /// Deletes the draft identified by `key`.
    ///
    /// # Errors
    ///
    /// Same as [`update_draft`](Self::update_draft).
    pub async fn delete_draft_key(&self, key: &DraftKey) -> Result<()> {
        let (index, _) = self
            .locate(|d| d.source == key.source && d.id == key.id, &key.to_string())
            .await?;
        self.sources[index].delete_draft(&key.id).await?;
        self.forget(index, key).await;
        Ok(())
    }

    /// Finds the owning source, consulting a fresh listing on a cache miss.
    async fn locate(
        &self,
        matches: impl Fn(&Draft) -> bool,
        label: &str,
    ) -> Result<(usize, DraftKey)> {
        let find = |listing: &[(usize, Draft)]| {
            listing
                .iter()
                .find(|(_, d)| matches(d))
                .map(|(i, d)| (*i, d.key()))
        };

        if let Some(found) = find(&self.last_listing.read().await) {
            return Ok(found);
        }

        debug!(draft = label, "draft not in last listing; relisting");
        self.list_drafts(LOCATE_LIMIT, 0).await;
        find(&self.last_listing.read().await)
            .ok_or_else(|| Error::NotFound(format!("draft {label}")))
    }

    async fn forget(&self, index: usize, key: &DraftKey) {
        self.last_listing
            .write()
            .await
            .retain(|(i, d)| !(*i == index && d.source == key.source && d.id == key.id));
    }
}
