//! REST clients for the mail backends.
//!
//! Each client is a thin, stateless wrapper over one API. Calls take the
//! access token as an argument so the caller decides which account (and
//! which [`CredentialStore`](crate::credentials::CredentialStore) entry)
//! a request runs as.

mod envelope;
pub mod gmail;
pub mod graph;
pub mod native;

use std::fmt;

use reqwest::{Method, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use tracing::debug;

pub use envelope::OutgoingMessage;
pub use gmail::GmailClient;
pub use graph::GraphClient;
pub use native::{NativeClient, NativeCredential};

/// Longest response body kept in an error.
const MAX_ERROR_BODY: usize = 200;

/// Which API a request went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Gmail REST API.
    Gmail,
    /// Microsoft Graph mail API.
    Graph,
    /// The client's proprietary backend.
    Native,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gmail => "gmail",
            Self::Graph => "graph",
            Self::Native => "native",
        })
    }
}

/// A backend call that did not produce a usable response.
///
/// `status` is `None` when no HTTP response was received or the response
/// body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{backend} request failed{}: {body}",
    .status.map(|s| format!(" ({s})")).unwrap_or_default()
)]
pub struct BackendError {
    /// API that failed.
    pub backend: Backend,
    /// HTTP status, if a response arrived.
    pub status: Option<u16>,
    /// Truncated response body or transport error text.
    pub body: String,
}

impl BackendError {
    /// Error for a non-success HTTP response.
    #[must_use]
    pub fn status(backend: Backend, status: u16, body: &str) -> Self {
        Self {
            backend,
            status: Some(status),
            body: redact_body(body),
        }
    }

    /// Error for a request that never got a response.
    #[must_use]
    pub fn transport(backend: Backend, detail: impl fmt::Display) -> Self {
        Self {
            backend,
            status: None,
            body: detail.to_string(),
        }
    }

    /// Worth retrying later: 5xx, 429, or no response at all.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self.status {
            Some(s) => s == 429 || (500..600).contains(&s),
            None => true,
        }
    }

    /// The backend reported the resource missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

fn redact_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated {} bytes]", &trimmed[..end], trimmed.len())
}

/// Shared request plumbing for one API base URL.
#[derive(Debug, Clone)]
pub(crate) struct Rest {
    http: reqwest::Client,
    base: String,
    backend: Backend,
}

impl Rest {
    pub(crate) fn new(http: reqwest::Client, base: impl Into<String>, backend: Backend) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            backend,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub(crate) fn request(&self, method: Method, token: &str, path: &str) -> RequestBuilder {
        self.request_url(method, token, &self.url(path))
    }

    /// Request to an absolute URL, such as a server-issued next-page link.
    pub(crate) fn request_url(&self, method: Method, token: &str, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::transport(self.backend, e))?;
        let status = response.status();
        debug!(backend = %self.backend, url = %response.url(), %status, "backend call");

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::status(self.backend, status.as_u16(), &body))
    }

    /// Sends `request` and decodes the JSON answer.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self.execute(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::transport(self.backend, format!("decode: {e}")))
    }

    /// Sends `request` and ignores any answer body.
    pub(crate) async fn empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        self.execute(request).await.map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BackendError::status(Backend::Gmail, 503, "").is_transient());
        assert!(BackendError::status(Backend::Gmail, 429, "").is_transient());
        assert!(BackendError::transport(Backend::Graph, "reset").is_transient());
        assert!(!BackendError::status(Backend::Graph, 403, "").is_transient());
        assert!(BackendError::status(Backend::Native, 404, "").is_not_found());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(300);
        let err = BackendError::status(Backend::Gmail, 500, &body);
        assert!(err.body.contains("truncated 600 bytes"));
        assert!(err.body.len() < 300);
    }

    #[test]
    fn display_mentions_backend_and_status() {
        let err = BackendError::status(Backend::Graph, 401, " denied ");
        assert_eq!(err.to_string(), "graph request failed (401): denied");
        let err = BackendError::transport(Backend::Gmail, "connection reset");
        assert_eq!(err.to_string(), "gmail request failed: connection reset");
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let rest = Rest::new(reqwest::Client::new(), "http://h/v1/", Backend::Gmail);
        assert_eq!(rest.url("/messages"), "http://h/v1/messages");
    }
}
