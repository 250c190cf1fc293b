//! DevTools HTTP discovery and process launch.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AutomationBridge, AutomationError, AutomationResult, LiveSession, Target};

/// Opens a [`LiveSession`] on a target's debugger endpoint.
///
/// The wire transport is supplied by the embedding application.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connects to `web_socket_url`.
    async fn open(&self, web_socket_url: &str) -> AutomationResult<Arc<dyn LiveSession>>;
}

/// [`AutomationBridge`] speaking the DevTools HTTP discovery protocol.
pub struct DevToolsBridge {
    http: reqwest::Client,
    host: String,
    app_path: Option<PathBuf>,
    connector: Option<Arc<dyn SessionConnector>>,
}

impl std::fmt::Debug for DevToolsBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevToolsBridge")
            .field("host", &self.host)
            .field("app_path", &self.app_path)
            .field("has_connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

impl DevToolsBridge {
    /// Creates a bridge polling `127.0.0.1`.
    #[must_use]
    pub fn new(http: reqwest::Client, app_path: Option<PathBuf>) -> Self {
        Self {
            http,
            host: "127.0.0.1".to_string(),
            app_path,
            connector: None,
        }
    }

    /// Overrides the discovery host (tests, remote machines).
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Installs the session transport.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    fn list_url(&self, port: u16) -> String {
        format!("http://{}:{port}/json/list", self.host)
    }
}

#[async_trait]
impl AutomationBridge for DevToolsBridge {
    async fn list_targets(&self, port: u16) -> AutomationResult<Vec<Target>> {
        let url = self.list_url(port);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                debug!("Nothing listening on {url}");
                return Ok(Vec::new());
            }
            Err(e) => return Err(AutomationError::Discovery(e.to_string())),
        };

        if !response.status().is_success() {
            return Err(AutomationError::Discovery(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AutomationError::Discovery(format!("bad target list: {e}")))
    }

    async fn connect(&self, target: &Target) -> AutomationResult<Arc<dyn LiveSession>> {
        let Some(ws_url) = &target.web_socket_debugger_url else {
            return Err(AutomationError::Transport(format!(
                "target {} has no debugger endpoint (already attached?)",
                target.id
            )));
        };
        let Some(connector) = &self.connector else {
            return Err(AutomationError::Transport(
                "no session connector configured".to_string(),
            ));
        };
        debug!(target = %target.id, "Opening live session");
        connector.open(ws_url).await
    }

    async fn launch(&self, port: u16) -> AutomationResult<()> {
        let Some(app_path) = &self.app_path else {
            return Err(AutomationError::Launch(
                "no client executable configured".to_string(),
            ));
        };

        info!("Launching {} with debugging port {port}", app_path.display());
        tokio::process::Command::new(app_path)
            .arg(format!("--remote-debugging-port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map(drop)
            .map_err(|e| AutomationError::Launch(format!("{}: {e}", app_path.display())))
    }

    fn can_connect(&self) -> bool {
        self.connector.is_some()
    }
}
