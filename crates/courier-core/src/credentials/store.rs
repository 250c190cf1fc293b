//! Expiry-aware credential cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{
    Bootstrapper, CredentialError, CredentialMap, CredentialPersistence, CredentialRecord,
    CredentialResult, TokenRefresher, normalize_email,
};

/// Default refresh-ahead window.
const DEFAULT_SKEW_MINUTES: i64 = 5;

/// Process-wide credential cache.
///
/// Create one per process and share it behind an [`Arc`]. Records are handed
/// out by value; every record returned by [`get`](Self::get) expires strictly
/// after the moment it is returned.
pub struct CredentialStore {
    records: RwLock<CredentialMap>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    persistence: Arc<dyn CredentialPersistence>,
    refresher: Arc<dyn TokenRefresher>,
    bootstrapper: RwLock<Option<Arc<dyn Bootstrapper>>>,
    skew: Duration,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Creates an empty store. Call [`load`](Self::load) once at startup.
    #[must_use]
    pub fn new(
        persistence: Arc<dyn CredentialPersistence>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            records: RwLock::new(CredentialMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            persistence,
            refresher,
            bootstrapper: RwLock::new(None),
            skew: Duration::minutes(DEFAULT_SKEW_MINUTES),
        }
    }

    /// Overrides the refresh-ahead window.
    #[must_use]
    pub const fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Creates a store and loads the persisted cache into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted cache cannot be read.
    pub async fn open(
        persistence: Arc<dyn CredentialPersistence>,
        refresher: Arc<dyn TokenRefresher>,
        skew: Duration,
    ) -> CredentialResult<Self> {
        let store = Self::new(persistence, refresher).with_skew(skew);
        store.load().await?;
        Ok(store)
    }

    /// Replaces the in-memory cache with the persisted one.
    ///
    /// Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted cache cannot be read.
    pub async fn load(&self) -> CredentialResult<usize> {
        let loaded = self.persistence.load().await?;
        // Keys may have been written by hand; re-key on the normalized email.
        let loaded: CredentialMap = loaded
            .into_values()
            .map(|mut r| {
                r.account_email = normalize_email(&r.account_email);
                (r.account_email.clone(), r)
            })
            .collect();
        let count = loaded.len();
        *self.records.write().await = loaded;
        debug!("Loaded {count} cached credential(s)");
        Ok(count)
    }

    /// Writes the full in-memory cache through the persistence backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn persist(&self) -> CredentialResult<()> {
        let snapshot = self.records.read().await.clone();
        self.persistence.save(&snapshot).await
    }

    /// Drops every in-memory record. The persisted cache is untouched.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    /// Returns a record for `account_email` that outlives the refresh window,
    /// refreshing it first when needed.
    ///
    /// Concurrent calls for the same account share one refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is stale and cannot be refreshed.
    pub async fn get(&self, account_email: &str) -> CredentialResult<CredentialRecord> {
        let key = normalize_email(account_email);
        if let Some(record) = self.fresh(&key).await {
            debug!(account = %key, "Credential cache hit");
            return Ok(record);
        }

        let guard = self.key_guard(&key).await;
        let result = {
            let _held = guard.lock().await;
            // Whoever held the guard before us may have refreshed already.
            if let Some(record) = self.fresh(&key).await {
                debug!(account = %key, "Credential refreshed by concurrent caller");
                Ok(record)
            } else {
                self.refresh_locked(&key).await
            }
        };
        self.release_guard(&key, guard).await;
        result
    }

    /// Refreshes `account_email` unconditionally and overwrites the cache entry.
    ///
    /// Uses the stored refresh token when there is one, otherwise reads the
    /// credential from the live client through the attached bootstrapper.
    ///
    /// # Errors
    ///
    /// See [`CredentialError`]; nothing is retried beyond the single attempt.
    pub async fn refresh(&self, account_email: &str) -> CredentialResult<CredentialRecord> {
        let key = normalize_email(account_email);
        let guard = self.key_guard(&key).await;
        let result = {
            let _held = guard.lock().await;
            self.refresh_locked(&key).await
        };
        self.release_guard(&key, guard).await;
        result
    }

    /// Seeds or replaces a record (after an interactive bootstrap) and persists.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub async fn insert(&self, mut record: CredentialRecord) -> CredentialResult<()> {
        record.account_email = normalize_email(&record.account_email);
        info!(account = %record.account_email, "Storing credential");
        self.records
            .write()
            .await
            .insert(record.account_email.clone(), record);
        self.persist().await
    }

    /// Removes a record and persists. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub async fn remove(&self, account_email: &str) -> CredentialResult<bool> {
        let key = normalize_email(account_email);
        let existed = self.records.write().await.remove(&key).is_some();
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    /// Cached account emails, sorted.
    pub async fn accounts(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }

    /// Copy of the cached record without any freshness check.
    pub async fn peek(&self, account_email: &str) -> Option<CredentialRecord> {
        self.records
            .read()
            .await
            .get(&normalize_email(account_email))
            .cloned()
    }

    /// Resolves an account that can be served without the live client.
    ///
    /// With `Some(email)`, returns that account if its record is fresh or
    /// refreshable. With `None`, returns the first such cached account.
    pub async fn usable_account(&self, account_email: Option<&str>) -> Option<String> {
        let now = Utc::now();
        let records = self.records.read().await;
        let usable = |r: &CredentialRecord| r.is_fresh_at(now, self.skew) || r.is_refreshable();

        match account_email {
            Some(email) => records
                .get(&normalize_email(email))
                .filter(|r| usable(*r))
                .map(|r| r.account_email.clone()),
            None => records
                .values()
                .find(|r| usable(*r))
                .map(|r| r.account_email.clone()),
        }
    }

    /// True when [`usable_account`](Self::usable_account) finds an account.
    pub async fn has_usable(&self, account_email: Option<&str>) -> bool {
        self.usable_account(account_email).await.is_some()
    }

    /// Enables the extraction path, typically once a live session is open.
    pub async fn attach_bootstrapper(&self, bootstrapper: Arc<dyn Bootstrapper>) {
        *self.bootstrapper.write().await = Some(bootstrapper);
    }

    /// Disables the extraction path.
    pub async fn detach_bootstrapper(&self) {
        *self.bootstrapper.write().await = None;
    }

    /// True when a live-session bootstrapper is attached.
    pub async fn has_bootstrapper(&self) -> bool {
        self.bootstrapper.read().await.is_some()
    }

    async fn fresh(&self, key: &str) -> Option<CredentialRecord> {
        let now = Utc::now();
        self.records
            .read()
            .await
            .get(key)
            .filter(|r| r.is_fresh_at(now, self.skew))
            .cloned()
    }

    async fn key_guard(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.in_flight
                .lock()
                .await
                .entry(key.to_string())
                .or_default(),
        )
    }

    /// Drops the map entry for `key` once no other caller holds or waits on it.
    async fn release_guard(&self, key: &str, guard: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // One reference in the map, one in `guard`.
        if Arc::strong_count(&guard) == 2 {
            in_flight.remove(key);
        }
    }

    /// Performs the refresh. The caller holds the per-key guard.
    async fn refresh_locked(&self, key: &str) -> CredentialResult<CredentialRecord> {
        let current = self.records.read().await.get(key).cloned();

        let mut refreshed = match current {
            Some(record) if record.is_refreshable() => self.refresher.refresh(&record).await?,
            _ => {
                let bootstrapper = self.bootstrapper.read().await.clone();
                let Some(bootstrapper) = bootstrapper else {
                    return Err(CredentialError::LiveSessionRequired {
                        account: key.to_string(),
                    });
                };
                info!(account = %key, "Bootstrapping credential from live client");
                bootstrapper.extract(key).await?
            }
        };

        refreshed.account_email = key.to_string();
        if !refreshed.is_unexpired_at(Utc::now()) {
            return Err(CredentialError::InvalidExtraction(format!(
                "credential for {key} expired at {}",
                refreshed.expires_at
            )));
        }

        self.records
            .write()
            .await
            .insert(key.to_string(), refreshed.clone());

        if let Err(e) = self.persist().await {
            // Persist failure leaves the refreshed record in memory only.
            warn!(account = %key, "Failed to persist refreshed credential: {e}");
        }

        Ok(refreshed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::{BackendKind, MemoryPersistence};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Refresher that counts calls and yields before answering.
    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, record: &CredentialRecord) -> CredentialResult<CredentialRecord> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.reject {
                return Err(CredentialError::InvalidGrant {
                    account: record.account_email.clone(),
                    detail: "revoked".into(),
                });
            }
            let mut next = record.clone();
            next.access_token = format!("refreshed-{n}");
            next.expires_at = Utc::now() + Duration::hours(1);
            Ok(next)
        }
    }

    struct FakeBootstrapper;

    #[async_trait]
    impl Bootstrapper for FakeBootstrapper {
        async fn extract(&self, account_email: &str) -> CredentialResult<CredentialRecord> {
            Ok(CredentialRecord::new(
                account_email,
                "extracted",
                Utc::now() + Duration::hours(1),
                BackendKind::Microsoft,
            )
            .with_refresh_token("from-client"))
        }
    }

    fn record(email: &str, expires_in: Duration) -> CredentialRecord {
        CredentialRecord::new(email, "cached", Utc::now() + expires_in, BackendKind::Google)
            .with_refresh_token("r1")
    }

    async fn store_with(
        records: Vec<CredentialRecord>,
        refresher: Arc<CountingRefresher>,
    ) -> (CredentialStore, Arc<MemoryPersistence>) {
        let persistence = Arc::new(MemoryPersistence::with_records(records));
        let store = CredentialStore::open(persistence.clone(), refresher, Duration::minutes(5))
            .await
            .unwrap();
        (store, persistence)
    }

    #[tokio::test]
    async fn fresh_record_is_served_from_cache() {
        let refresher = Arc::new(CountingRefresher::default());
        let (store, _) = store_with(vec![record("a@x.com", Duration::hours(1))], refresher.clone())
            .await;

        let got = store.get("A@X.com").await.unwrap();
        assert_eq!(got.access_token, "cached");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_record_is_refreshed_and_persisted() {
        let refresher = Arc::new(CountingRefresher::default());
        let (store, persistence) = store_with(
            vec![record("a@x.com", Duration::minutes(-10))],
            refresher.clone(),
        )
        .await;

        let got = store.get("a@x.com").await.unwrap();
        assert!(got.expires_at > Utc::now());
        assert_eq!(got.access_token, "refreshed-1");
        assert_eq!(persistence.save_count(), 1);
        assert_eq!(
            persistence.snapshot().await["a@x.com"].access_token,
            "refreshed-1"
        );
    }

    #[tokio::test]
    async fn record_inside_refresh_window_is_refreshed_ahead() {
        let refresher = Arc::new(CountingRefresher::default());
        let (store, _) = store_with(
            vec![record("a@x.com", Duration::minutes(2))],
            refresher.clone(),
        )
        .await;

        let got = store.get("a@x.com").await.unwrap();
        assert_eq!(got.access_token, "refreshed-1");
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_refresh() {
        let refresher = Arc::new(CountingRefresher::default());
        let (store, persistence) = store_with(
            vec![record("a@x.com", Duration::minutes(-1))],
            refresher.clone(),
        )
        .await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.get("a@x.com").await })
            })
            .collect();

        for handle in handles {
            let got = handle.await.unwrap().unwrap();
            assert_eq!(got.access_token, "refreshed-1");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(persistence.save_count(), 1);
        assert!(store.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_releases_its_guard() {
        let (store, _) = store_with(vec![], Arc::new(CountingRefresher::default())).await;

        assert!(store.get("ghost@x.com").await.is_err());
        assert!(store.refresh("ghost@x.com").await.is_err());
        assert!(store.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_grant_propagates_and_keeps_old_record() {
        let refresher = Arc::new(CountingRefresher {
            reject: true,
            ..CountingRefresher::default()
        });
        let (store, persistence) = store_with(
            vec![record("a@x.com", Duration::minutes(-1))],
            refresher,
        )
        .await;

        let err = store.get("a@x.com").await.unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
        assert_eq!(store.peek("a@x.com").await.unwrap().access_token, "cached");
        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test]
    async fn unknown_account_needs_live_session() {
        let (store, _) = store_with(vec![], Arc::new(CountingRefresher::default())).await;
        let err = store.get("new@x.com").await.unwrap_err();
        assert!(matches!(err, CredentialError::LiveSessionRequired { .. }));
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn extraction_path_bootstraps_unknown_account() {
        let refresher = Arc::new(CountingRefresher::default());
        let (store, persistence) = store_with(vec![], refresher.clone()).await;
        store.attach_bootstrapper(Arc::new(FakeBootstrapper)).await;

        let got = store.get("New@X.com").await.unwrap();
        assert_eq!(got.account_email, "new@x.com");
        assert_eq!(got.access_token, "extracted");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert!(persistence.snapshot().await.contains_key("new@x.com"));

        store.detach_bootstrapper().await;
        assert!(!store.has_bootstrapper().await);
    }

    #[tokio::test]
    async fn usable_account_prefers_requested_then_any() {
        let stale_unrefreshable = CredentialRecord::new(
            "old@x.com",
            "a",
            Utc::now() - Duration::hours(1),
            BackendKind::Google,
        );
        let (store, _) = store_with(
            vec![stale_unrefreshable, record("b@x.com", Duration::minutes(-5))],
            Arc::new(CountingRefresher::default()),
        )
        .await;

        assert_eq!(store.usable_account(Some("old@x.com")).await, None);
        assert_eq!(
            store.usable_account(Some("B@x.com")).await.as_deref(),
            Some("b@x.com")
        );
        assert_eq!(store.usable_account(None).await.as_deref(), Some("b@x.com"));
    }

    #[tokio::test]
    async fn clear_drops_memory_but_load_restores() {
        let (store, _) = store_with(
            vec![record("a@x.com", Duration::hours(1))],
            Arc::new(CountingRefresher::default()),
        )
        .await;

        store.clear().await;
        assert!(store.accounts().await.is_empty());

        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(store.accounts().await, vec!["a@x.com".to_string()]);
    }

    #[tokio::test]
    async fn insert_and_remove_persist() {
        let (store, persistence) = store_with(vec![], Arc::new(CountingRefresher::default())).await;

        store.insert(record("C@x.com", Duration::hours(1))).await.unwrap();
        assert!(persistence.snapshot().await.contains_key("c@x.com"));

        assert!(store.remove("c@x.com").await.unwrap());
        assert!(!store.remove("c@x.com").await.unwrap());
        assert!(persistence.snapshot().await.is_empty());
        assert_eq!(persistence.save_count(), 2);
    }
}
