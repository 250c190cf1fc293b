//! Choosing between cached credentials and the live client.
//!
//! [`ProviderResolver::resolve`] prefers a usable cached credential. Only
//! when there is none does it reach for the live client, launching it if
//! nothing is listening on the debugging port.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::automation::client::list_accounts;
use crate::automation::{
    AutomationBridge, AutomationError, AutomationResult, LiveSession, SessionBootstrapper, Target,
    find_target,
};
use crate::config::Config;
use crate::credentials::{CredentialError, CredentialRecord, CredentialStore, normalize_email};
use crate::Result;

/// Access to credentials, and to the live client when one was needed.
pub enum Provider {
    /// Served from the credential cache alone.
    Cached {
        /// Shared credential cache.
        store: Arc<CredentialStore>,
        /// Account used when callers do not name one.
        default_account: String,
    },
    /// Backed by a session in the running client.
    Live {
        /// Shared credential cache, with a session bootstrapper attached.
        store: Arc<CredentialStore>,
        /// Connected page.
        session: Arc<dyn LiveSession>,
        /// Account requested at resolution, if any.
        account: Option<String>,
    },
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached {
                default_account, ..
            } => f
                .debug_struct("Cached")
                .field("default_account", default_account)
                .finish_non_exhaustive(),
            Self::Live { account, .. } => f
                .debug_struct("Live")
                .field("account", account)
                .finish_non_exhaustive(),
        }
    }
}

impl Provider {
    /// True for [`Provider::Live`].
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// The live session, when this provider has one.
    #[must_use]
    pub fn session(&self) -> Option<Arc<dyn LiveSession>> {
        match self {
            Self::Cached { .. } => None,
            Self::Live { session, .. } => Some(Arc::clone(session)),
        }
    }

    /// Fresh credential for `email`, or for the provider's default account.
    ///
    /// # Errors
    ///
    /// Returns an error if no account can be determined or the credential
    /// cannot be refreshed.
    pub async fn credential(&self, email: Option<&str>) -> Result<CredentialRecord> {
        let account = self.account_for(email).await?;
        Ok(self.store().get(&account).await?)
    }

    /// Fresh access token for `email`, or for the provider's default account.
    ///
    /// # Errors
    ///
    /// Same as [`credential`](Self::credential).
    pub async fn get_token(&self, email: Option<&str>) -> Result<String> {
        Ok(self.credential(email).await?.access_token)
    }

    /// Releases the live session, if any, and stops bootstrapping from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be closed cleanly.
    pub async fn disconnect(&self) -> Result<()> {
        if let Self::Live { store, session, .. } = self {
            store.detach_bootstrapper().await;
            session.close().await?;
            debug!("Live session closed");
        }
        Ok(())
    }

    const fn store(&self) -> &Arc<CredentialStore> {
        match self {
            Self::Cached { store, .. } | Self::Live { store, .. } => store,
        }
    }

    async fn account_for(&self, email: Option<&str>) -> Result<String> {
        if let Some(email) = email {
            return Ok(normalize_email(email));
        }
        match self {
            Self::Cached {
                default_account, ..
            } => Ok(default_account.clone()),
            Self::Live {
                account: Some(account),
                ..
            } => Ok(account.clone()),
            Self::Live { session, .. } => {
                let accounts = list_accounts(session.as_ref()).await?;
                accounts
                    .iter()
                    .find(|a| a.is_current)
                    .or_else(|| accounts.first())
                    .map(|a| normalize_email(&a.email))
                    .ok_or_else(|| {
                        CredentialError::UnknownAccount("live client has no accounts".into())
                            .into()
                    })
            }
        }
    }
}

/// Resolves a [`Provider`] for a command.
pub struct ProviderResolver {
    store: Arc<CredentialStore>,
    bridge: Arc<dyn AutomationBridge>,
    url_match: String,
    launch_timeout: Duration,
    poll_interval: Duration,
    settle: Duration,
}

impl std::fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderResolver")
            .field("url_match", &self.url_match)
            .field("launch_timeout", &self.launch_timeout)
            .finish_non_exhaustive()
    }
}

impl ProviderResolver {
    /// Creates a resolver with timings taken from `config`.
    #[must_use]
    pub fn new(
        store: Arc<CredentialStore>,
        bridge: Arc<dyn AutomationBridge>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            bridge,
            url_match: config.target_url_match.clone(),
            launch_timeout: config.launch_timeout(),
            poll_interval: config.launch_poll_interval(),
            settle: config.switch_settle(),
        }
    }

    /// Overrides how long to wait for a launched client.
    #[must_use]
    pub const fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Picks the cheapest way to serve `account` (any cached account when `None`).
    ///
    /// # Errors
    ///
    /// [`CredentialError::NoCachedAndNoLiveSession`] when nothing usable is
    /// cached and the live client cannot be found, launched or connected.
    pub async fn resolve(&self, account: Option<&str>, port: u16) -> Result<Provider> {
        if let Some(default_account) = self.store.usable_account(account).await {
            debug!(account = %default_account, "Using cached credential");
            return Ok(Provider::Cached {
                store: Arc::clone(&self.store),
                default_account,
            });
        }

        if !self.bridge.can_connect() {
            warn!(port, "Live client sessions are not available");
            return Err(CredentialError::NoCachedAndNoLiveSession.into());
        }

        let session = match self.connect_live(port).await {
            Ok(session) => session,
            Err(e) => {
                warn!(port, "No live client session: {e}");
                return Err(CredentialError::NoCachedAndNoLiveSession.into());
            }
        };

        self.store
            .attach_bootstrapper(Arc::new(SessionBootstrapper::new(
                Arc::clone(&session),
                self.settle,
            )))
            .await;
        info!(port, "Using live client session");

        Ok(Provider::Live {
            store: Arc::clone(&self.store),
            session,
            account: account.map(normalize_email),
        })
    }

    async fn connect_live(&self, port: u16) -> AutomationResult<Arc<dyn LiveSession>> {
        let target = match find_target(self.bridge.as_ref(), port, &self.url_match).await? {
            Some(target) => target,
            None => self.launch_and_wait(port).await?,
        };
        debug!(target = %target.url, "Connecting to live target");
        self.bridge.connect(&target).await
    }

    async fn launch_and_wait(&self, port: u16) -> AutomationResult<Target> {
        info!(port, "Launching client with remote debugging");
        self.bridge.launch(port).await?;

        let started = Instant::now();
        loop {
            // A starting client refuses connections for a while.
            match find_target(self.bridge.as_ref(), port, &self.url_match).await {
                Ok(Some(target)) => {
                    info!(port, waited_ms = started.elapsed().as_millis(), "Client ready");
                    return Ok(target);
                }
                Ok(None) => {}
                Err(e) => debug!(port, "Client not ready: {e}"),
            }
            if started.elapsed() >= self.launch_timeout {
                return Err(AutomationError::LaunchTimeout {
                    port,
                    waited_secs: self.launch_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
