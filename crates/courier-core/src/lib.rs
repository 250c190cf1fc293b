//! # courier-core
//!
//! Credential lifecycle and mail plumbing for driving a third-party mail
//! client through its REST backends, with the running client as fallback.
//!
//! This crate provides:
//! - **Credentials** - process-wide cache with refresh-ahead and pluggable persistence
//! - **Provider resolution** - cached credentials first, then the live client
//! - **Automation** - discovery, launch and scripting of the live client
//! - **Backends** - Gmail, Microsoft Graph and native REST clients
//! - **Drafts** - listing merged across backends, tolerant of failing sources
//! - **Threading** - reply, reply-all and forward planning
//! - **Dispatch** - sending a reply plan through the owning backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod automation;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod drafts;
mod error;
pub mod provider;
pub mod threading;

pub use automation::{AutomationBridge, AutomationError, DevToolsBridge, LiveSession};
pub use backend::{BackendError, GmailClient, GraphClient, NativeClient};
pub use config::Config;
pub use credentials::{
    BackendKind, CredentialError, CredentialRecord, CredentialStore, FilePersistence,
    OAuthRefresher,
};
pub use dispatch::{MailBackend, PreparedReply, SentReply};
pub use drafts::{Draft, DraftAggregationService, DraftKey, DraftOrigin, DraftSource, DraftUpdate};
pub use error::{Error, Result};
pub use provider::{Provider, ProviderResolver};
pub use threading::{ReplyMode, ReplyPlan, ThreadSnapshot, ThreadingError, build_reply_plan};
