//! Canned automation doubles for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{AutomationBridge, AutomationError, AutomationResult, KeyEvent, LiveSession, Target};

/// Session answering scripts by substring match.
#[derive(Default)]
pub struct FakeSession {
    answers: Mutex<Vec<(String, Value)>>,
    pub evaluated: Mutex<Vec<String>>,
    pub keys: Mutex<Vec<KeyEvent>>,
    pub closed: AtomicUsize,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers any script containing `needle` with `value`. Later answers win.
    pub async fn answer(&self, needle: &str, value: Value) {
        self.answers.lock().await.push((needle.to_string(), value));
    }
}

#[async_trait]
impl LiveSession for FakeSession {
    async fn evaluate(&self, expression: &str, _await_promise: bool) -> AutomationResult<Value> {
        self.evaluated.lock().await.push(expression.to_string());
        self.answers
            .lock()
            .await
            .iter()
            .rev()
            .find(|(needle, _)| expression.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| AutomationError::ScriptFailed("no canned answer".into()))
    }

    async fn dispatch_key(&self, event: &KeyEvent) -> AutomationResult<()> {
        self.keys.lock().await.push(event.clone());
        Ok(())
    }

    async fn close(&self) -> AutomationResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Bridge whose targets appear after a configurable number of polls past launch.
pub struct FakeBridge {
    pub targets: Mutex<Vec<Target>>,
    pub launch_targets: Option<Vec<Target>>,
    pub session: Arc<FakeSession>,
    pub launches: AtomicUsize,
    pub connects: AtomicUsize,
    /// Listings that fail with a discovery error before targets show.
    pub discovery_failures: AtomicUsize,
    pub connectable: bool,
}

impl FakeBridge {
    pub fn new(targets: Vec<Target>, launch_targets: Option<Vec<Target>>) -> Self {
        Self {
            targets: Mutex::new(targets),
            launch_targets,
            session: Arc::new(FakeSession::new()),
            launches: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            discovery_failures: AtomicUsize::new(0),
            connectable: true,
        }
    }

    /// A bridge with no way to open sessions.
    pub fn unconnectable() -> Self {
        Self {
            connectable: false,
            ..Self::new(vec![], None)
        }
    }
}

pub fn page(url: &str) -> Target {
    Target {
        id: "page-1".into(),
        title: "Mail".into(),
        url: url.into(),
        target_type: "page".into(),
        web_socket_debugger_url: Some("ws://127.0.0.1/devtools/page/page-1".into()),
    }
}

#[async_trait]
impl AutomationBridge for FakeBridge {
    async fn list_targets(&self, _port: u16) -> AutomationResult<Vec<Target>> {
        let failing = self
            .discovery_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AutomationError::Discovery("connection refused".into()));
        }
        Ok(self.targets.lock().await.clone())
    }

    async fn connect(&self, _target: &Target) -> AutomationResult<Arc<dyn LiveSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.clone())
    }

    async fn launch(&self, _port: u16) -> AutomationResult<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        match &self.launch_targets {
            Some(targets) => {
                *self.targets.lock().await = targets.clone();
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn can_connect(&self) -> bool {
        self.connectable
    }
}
