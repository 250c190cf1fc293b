//! Runtime configuration.
//!
//! Settings live in `<config_dir>/courier/config.json`. Every field has a
//! default, so a missing file is the same as `{}`. A handful of environment
//! variables override the file for one-off runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Directory name under the platform config dir.
const APP_DIR: &str = "courier";

/// Settings file name.
const CONFIG_FILE: &str = "config.json";

/// Credential cache file name.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Default Gmail REST base (per-user prefix included).
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Default Microsoft Graph base (signed-in user prefix included).
pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0/me";

/// OAuth application registered with one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthAppConfig {
    /// Client ID the client's refresh tokens were issued to.
    pub client_id: Option<String>,
    /// Client secret, for confidential clients.
    pub client_secret: Option<String>,
    /// Token endpoint override (tests, sovereign clouds).
    pub token_url: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote debugging port of the mail client.
    pub debug_port: u16,
    /// Path of the mail client executable, used when it has to be launched.
    pub app_path: Option<PathBuf>,
    /// Substring identifying the client's page among debugging targets.
    pub target_url_match: String,
    /// Upper bound on waiting for a launched client to expose a target.
    pub launch_timeout_secs: u64,
    /// Interval between readiness checks while waiting for a launch.
    pub launch_poll_interval_ms: u64,
    /// Fixed delay after switching accounts in the live client.
    pub switch_settle_ms: u64,
    /// Records expiring sooner than this are refreshed before hand-off.
    pub refresh_skew_secs: i64,
    /// Credential cache location; defaults to the config directory.
    pub credentials_path: Option<PathBuf>,
    /// Google OAuth application.
    pub google: OAuthAppConfig,
    /// Microsoft OAuth application.
    pub microsoft: OAuthAppConfig,
    /// Gmail REST base URL.
    pub gmail_api_base: String,
    /// Graph REST base URL.
    pub graph_api_base: String,
    /// Native backend base URL; native drafts are skipped when unset.
    pub native_api_base: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_port: 9333,
            app_path: None,
            target_url_match: "mail".to_string(),
            launch_timeout_secs: 30,
            launch_poll_interval_ms: 500,
            switch_settle_ms: 1500,
            refresh_skew_secs: 300,
            credentials_path: None,
            google: OAuthAppConfig::default(),
            microsoft: OAuthAppConfig::default(),
            gmail_api_base: DEFAULT_GMAIL_API_BASE.to_string(),
            graph_api_base: DEFAULT_GRAPH_API_BASE.to_string(),
            native_api_base: None,
        }
    }
}

impl Config {
    /// Directory holding settings and the credential cache.
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Default settings file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::config_dir().join(CONFIG_FILE)
    }

    /// Loads settings from the default path and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// an override holds an unparsable value.
    pub async fn load() -> Result<Self> {
        let mut config = Self::from_path(&Self::default_path()).await?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Loads settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn from_path(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let config = serde_json::from_str(&contents)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Applies `COURIER_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `COURIER_DEBUG_PORT` is not a port number.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("COURIER_DEBUG_PORT") {
            self.debug_port = port
                .parse()
                .map_err(|_| Error::Config(format!("COURIER_DEBUG_PORT is not a port: {port}")))?;
        }
        if let Some(path) = lookup("COURIER_APP_PATH") {
            self.app_path = Some(PathBuf::from(path));
        }
        if let Some(id) = lookup("COURIER_GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(id);
        }
        if let Some(id) = lookup("COURIER_MICROSOFT_CLIENT_ID") {
            self.microsoft.client_id = Some(id);
        }
        Ok(())
    }

    /// Credential cache path, honoring the override.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join(CREDENTIALS_FILE))
    }

    /// Launch readiness bound as a [`Duration`].
    #[must_use]
    pub const fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    /// Readiness check interval as a [`Duration`].
    #[must_use]
    pub const fn launch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.launch_poll_interval_ms)
    }

    /// Account-switch settle delay as a [`Duration`].
    #[must_use]
    pub const fn switch_settle(&self) -> Duration {
        Duration::from_millis(self.switch_settle_ms)
    }

    /// Refresh-ahead window.
    #[must_use]
    pub fn refresh_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_skew_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = Config::default();
        assert_eq!(config.launch_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_skew(), chrono::Duration::minutes(5));
        assert!(config.native_api_base.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"debug_port": 9444, "google": {"client_id": "g"}}"#).unwrap();
        assert_eq!(config.debug_port, 9444);
        assert_eq!(config.google.client_id.as_deref(), Some("g"));
        assert_eq!(config.gmail_api_base, DEFAULT_GMAIL_API_BASE);
        assert_eq!(config.switch_settle_ms, 1500);
    }

    #[test]
    fn environment_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("COURIER_DEBUG_PORT", "9555"),
            ("COURIER_MICROSOFT_CLIENT_ID", "ms-app"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.debug_port, 9555);
        assert_eq!(config.microsoft.client_id.as_deref(), Some("ms-app"));
        assert!(config.google.client_id.is_none());
    }

    #[test]
    fn bad_port_override_is_a_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == "COURIER_DEBUG_PORT").then(|| "nope".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn credentials_path_override() {
        let config = Config {
            credentials_path: Some(PathBuf::from("/tmp/creds.json")),
            ..Config::default()
        };
        assert_eq!(config.credentials_path(), PathBuf::from("/tmp/creds.json"));
    }
}
