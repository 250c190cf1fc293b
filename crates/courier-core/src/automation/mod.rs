//! Remote control of the live mail client.
//!
//! Everything that touches the running client goes through two traits:
//! [`AutomationBridge`] finds, launches and connects to the client's debugging
//! targets, and [`LiveSession`] evaluates scripts and dispatches input inside
//! one connected page. The rest of the crate never sees the client's internal
//! object graph; the scripts that inspect it live in [`client`].

pub mod client;
mod devtools;
#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{Account, ExtractedCredential, SessionBootstrapper};
pub use devtools::{DevToolsBridge, SessionConnector};

/// Errors from the live-session fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutomationError {
    /// A script threw or returned an exception.
    #[error("script failed: {0}")]
    ScriptFailed(String),

    /// The launched client never exposed a matching target.
    #[error("client did not become ready on port {port} within {waited_secs}s")]
    LaunchTimeout {
        /// Debugging port polled.
        port: u16,
        /// Seconds waited.
        waited_secs: u64,
    },

    /// The client process could not be started.
    #[error("failed to launch client: {0}")]
    Launch(String),

    /// Target enumeration failed for a reason other than "nothing listening".
    #[error("target discovery failed: {0}")]
    Discovery(String),

    /// The session transport failed or is unavailable.
    #[error("session transport: {0}")]
    Transport(String),

    /// A script returned a value of the wrong shape.
    #[error("unexpected script result: {0}")]
    UnexpectedValue(String),
}

/// Result type for automation operations.
pub type AutomationResult<T> = std::result::Result<T, AutomationError>;

/// A debuggable page exposed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Target id.
    pub id: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Page URL.
    #[serde(default)]
    pub url: String,
    /// Target type ("page", "worker", ...).
    #[serde(rename = "type", default)]
    pub target_type: String,
    /// Session endpoint for this target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
}

impl Target {
    /// True for page targets whose URL contains `url_match`.
    #[must_use]
    pub fn matches(&self, url_match: &str) -> bool {
        self.target_type == "page" && self.url.contains(url_match)
    }
}

/// A synthetic key press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    /// DOM key value ("Enter", "e").
    pub key: String,
    /// DOM code value ("Enter", "KeyE").
    pub code: String,
    /// Modifier bit mask (1 alt, 2 ctrl, 4 meta, 8 shift).
    pub modifiers: u8,
    /// Text inserted by the key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl KeyEvent {
    /// Alt modifier bit.
    pub const ALT: u8 = 1;
    /// Control modifier bit.
    pub const CTRL: u8 = 2;
    /// Meta/Command modifier bit.
    pub const META: u8 = 4;
    /// Shift modifier bit.
    pub const SHIFT: u8 = 8;

    /// Plain key press with no modifiers.
    #[must_use]
    pub fn key(key: &str, code: &str) -> Self {
        let text = (key.chars().count() == 1).then(|| key.to_string());
        Self {
            key: key.to_string(),
            code: code.to_string(),
            modifiers: 0,
            text,
        }
    }

    /// Adds modifier bits; modified presses insert no text.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: u8) -> Self {
        self.modifiers |= modifiers;
        if modifiers & (Self::CTRL | Self::META | Self::ALT) != 0 {
            self.text = None;
        }
        self
    }
}

/// One connected page in the live client.
///
/// A session is a single shared resource; callers serialize commands
/// against it.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Evaluates `expression` in the page and returns its JSON value.
    ///
    /// With `await_promise`, a returned promise is awaited first.
    async fn evaluate(
        &self,
        expression: &str,
        await_promise: bool,
    ) -> AutomationResult<serde_json::Value>;

    /// Dispatches a key down/up pair.
    async fn dispatch_key(&self, event: &KeyEvent) -> AutomationResult<()>;

    /// Closes the session.
    async fn close(&self) -> AutomationResult<()>;
}

/// Finds, launches and connects to the live client.
#[async_trait]
pub trait AutomationBridge: Send + Sync {
    /// Lists targets on `port`; an empty list when nothing is listening.
    async fn list_targets(&self, port: u16) -> AutomationResult<Vec<Target>>;

    /// Opens a session against `target`.
    async fn connect(&self, target: &Target) -> AutomationResult<Arc<dyn LiveSession>>;

    /// Starts the client with remote debugging on `port`. Does not wait.
    async fn launch(&self, port: u16) -> AutomationResult<()>;

    /// Whether [`connect`](Self::connect) can succeed at all. A bridge that
    /// cannot open sessions is never asked to launch the client.
    fn can_connect(&self) -> bool {
        true
    }
}

/// First target on `port` matching `url_match`.
///
/// # Errors
///
/// Returns an error if enumeration itself fails.
pub async fn find_target(
    bridge: &dyn AutomationBridge,
    port: u16,
    url_match: &str,
) -> AutomationResult<Option<Target>> {
    Ok(bridge
        .list_targets(port)
        .await?
        .into_iter()
        .find(|t| t.matches(url_match)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_matching_pages_are_targets() {
        let page = Target {
            id: "1".into(),
            title: "Inbox".into(),
            url: "https://mail.example.com/inbox".into(),
            target_type: "page".into(),
            web_socket_debugger_url: None,
        };
        let worker = Target {
            target_type: "service_worker".into(),
            ..page.clone()
        };
        assert!(page.matches("mail.example.com"));
        assert!(!page.matches("calendar"));
        assert!(!worker.matches("mail.example.com"));
    }

    #[test]
    fn target_parses_devtools_listing() {
        let json = r#"{
            "description": "",
            "id": "ABC",
            "title": "Mail",
            "type": "page",
            "url": "https://mail.example.com/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9333/devtools/page/ABC"
        }"#;
        let target: Target = serde_json::from_str(json).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(target.id, "ABC");
        assert_eq!(
            target.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9333/devtools/page/ABC")
        );
    }

    #[test]
    fn modified_keys_insert_no_text() {
        let plain = KeyEvent::key("e", "KeyE");
        assert_eq!(plain.text.as_deref(), Some("e"));

        let chord = KeyEvent::key("e", "KeyE").with_modifiers(KeyEvent::META);
        assert_eq!(chord.modifiers, KeyEvent::META);
        assert!(chord.text.is_none());

        assert!(KeyEvent::key("Enter", "Enter").text.is_none());
    }
}
