//! Storage backends for the credential cache.
//!
//! The whole cache is read and written as one JSON object keyed by account
//! email, whatever the backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CredentialError, CredentialRecord, CredentialResult};

/// Cache contents keyed by normalized account email.
pub type CredentialMap = BTreeMap<String, CredentialRecord>;

/// Where the credential cache lives between processes.
#[async_trait]
pub trait CredentialPersistence: Send + Sync {
    /// Reads the full cache; an absent cache is empty.
    async fn load(&self) -> CredentialResult<CredentialMap>;

    /// Replaces the stored cache with `records`.
    async fn save(&self, records: &CredentialMap) -> CredentialResult<()>;
}

/// Single JSON file, rewritten atomically.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    /// Creates a file backend at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persistence_error(context: &str, path: &Path, e: impl std::fmt::Display) -> CredentialError {
    CredentialError::Persistence(format!("{context} {}: {e}", path.display()))
}

#[async_trait]
impl CredentialPersistence for FilePersistence {
    async fn load(&self) -> CredentialResult<CredentialMap> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credential cache at {}", self.path.display());
                return Ok(CredentialMap::new());
            }
            Err(e) => return Err(persistence_error("read", &self.path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(CredentialMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| persistence_error("parse", &self.path, e))
    }

    async fn save(&self, records: &CredentialMap) -> CredentialResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence_error("create", parent, e))?;
        }

        let contents = serde_json::to_string_pretty(records)
            .map_err(|e| persistence_error("serialize", &self.path, e))?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| persistence_error("write", &tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| persistence_error("chmod", &tmp, e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persistence_error("rename", &self.path, e))?;

        debug!(
            "Saved {} credential(s) to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// In-process cache, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: Mutex<CredentialMap>,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = CredentialRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.account_email.clone(), r))
            .collect();
        Self {
            records: Mutex::new(map),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the last saved cache.
    pub async fn snapshot(&self) -> CredentialMap {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl CredentialPersistence for MemoryPersistence {
    async fn load(&self) -> CredentialResult<CredentialMap> {
        Ok(self.records.lock().await.clone())
    }

    async fn save(&self, records: &CredentialMap) -> CredentialResult<()> {
        records.clone_into(&mut *self.records.lock().await);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "courier";

/// Keyring user under which the cache blob is stored.
const CACHE_ENTRY: &str = "courier_credential_cache";

/// OS keyring entry holding the whole cache as one JSON blob.
#[derive(Debug, Clone)]
pub struct KeyringPersistence {
    service: String,
    user: String,
}

impl Default for KeyringPersistence {
    fn default() -> Self {
        Self::new(SERVICE_NAME, CACHE_ENTRY)
    }
}

impl KeyringPersistence {
    /// Creates a keyring backend for a custom service/user pair.
    #[must_use]
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }

    fn entry(&self) -> CredentialResult<Entry> {
        Entry::new(&self.service, &self.user)
            .map_err(|e| CredentialError::Persistence(format!("keyring: {e}")))
    }
}

#[async_trait]
impl CredentialPersistence for KeyringPersistence {
    async fn load(&self) -> CredentialResult<CredentialMap> {
        match self.entry()?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| CredentialError::Persistence(format!("keyring parse: {e}"))),
            Err(keyring::Error::NoEntry) => {
                debug!("No credential cache in keyring");
                Ok(CredentialMap::new())
            }
            Err(e) => Err(CredentialError::Persistence(format!("keyring: {e}"))),
        }
    }

    async fn save(&self, records: &CredentialMap) -> CredentialResult<()> {
        let json = serde_json::to_string(records)
            .map_err(|e| CredentialError::Persistence(format!("keyring serialize: {e}")))?;
        self.entry()?
            .set_password(&json)
            .map_err(|e| CredentialError::Persistence(format!("keyring: {e}")))?;
        debug!("Stored {} credential(s) in keyring", records.len());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::BackendKind;
    use chrono::{Duration, Utc};

    fn record(email: &str) -> CredentialRecord {
        CredentialRecord::new(
            email,
            "access",
            Utc::now() + Duration::hours(1),
            BackendKind::Google,
        )
        .with_refresh_token("refresh")
    }

    #[tokio::test]
    async fn file_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilePersistence::new(dir.path().join("nested").join("credentials.json"));

        let mut map = CredentialMap::new();
        map.insert("a@example.com".into(), record("a@example.com"));
        backend.save(&map).await.unwrap();

        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded, map);
        assert!(!backend.path().with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let backend = FilePersistence::new(dir.path().join("credentials.json"));
        backend.save(&CredentialMap::new()).await.unwrap();

        let mode = std::fs::metadata(backend.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn missing_or_empty_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilePersistence::new(dir.path().join("credentials.json"));
        assert!(backend.load().await.unwrap().is_empty());

        std::fs::write(backend.path(), "  \n").unwrap();
        assert!(backend.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilePersistence::new(dir.path().join("credentials.json"));
        std::fs::write(backend.path(), "{not json").unwrap();

        let err = backend.load().await.unwrap_err();
        assert_eq!(err.code(), "persistence");
    }

    #[tokio::test]
    async fn memory_backend_counts_saves() {
        let backend = MemoryPersistence::with_records([record("a@example.com")]);
        assert_eq!(backend.load().await.unwrap().len(), 1);

        backend.save(&CredentialMap::new()).await.unwrap();
        assert_eq!(backend.save_count(), 1);
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    #[ignore = "Interacts with system keyring"]
    async fn keyring_round_trip() {
        let backend = KeyringPersistence::new(SERVICE_NAME, "courier_test_cache");
        let mut map = CredentialMap::new();
        map.insert("a@example.com".into(), record("a@example.com"));

        backend.save(&map).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), map);
        backend.save(&CredentialMap::new()).await.unwrap();
    }
}
