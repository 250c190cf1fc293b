//! Reply, reply-all and forward planning.
//!
//! Pure functions over a [`ThreadSnapshot`]. The result, a [`ReplyPlan`], is
//! backend-neutral: the dispatch step decides how to encode it for the
//! backend that owns the thread, but never recomputes recipients, subject or
//! threading headers.

mod address;
mod metadata;
mod recipients;
mod subject;

use serde::{Deserialize, Serialize};

pub use address::{dedupe_addresses, mailbox, same_mailbox, split_address_list};
pub use metadata::{ThreadingMetadata, compute_threading_metadata};
pub use recipients::{Recipients, compute_recipients};
pub use subject::normalize_subject;

/// Kind of response being composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyMode {
    /// Reply to the sender only.
    Reply,
    /// Reply to sender and every other recipient.
    ReplyAll,
    /// Forward to caller-chosen recipients.
    Forward,
}

impl ReplyMode {
    /// True for `Reply` and `ReplyAll`.
    #[must_use]
    pub const fn is_reply(self) -> bool {
        matches!(self, Self::Reply | Self::ReplyAll)
    }
}

impl std::fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reply => "reply",
            Self::ReplyAll => "reply-all",
            Self::Forward => "forward",
        })
    }
}

impl std::str::FromStr for ReplyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reply" => Ok(Self::Reply),
            "reply-all" | "replyall" | "reply_all" => Ok(Self::ReplyAll),
            "forward" | "fwd" => Ok(Self::Forward),
            other => Err(format!("unknown reply mode: {other}")),
        }
    }
}

/// Read-only projection of one thread, enough to plan a reply.
///
/// Built fresh for each operation and never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnapshot {
    /// Backend thread or conversation id.
    pub thread_id: String,
    /// Subject of the latest message.
    pub subject: String,
    /// `Message-ID` of the latest message.
    pub last_message_id: Option<String>,
    /// `References` chain of the latest message, oldest first.
    pub references: Vec<String>,
    /// Where replies go: `Reply-To` if present, else `From`.
    pub reply_to_address: Option<String>,
    /// `To` recipients of the latest message.
    pub all_to: Vec<String>,
    /// `Cc` recipients of the latest message.
    pub all_cc: Vec<String>,
    /// The replying account's own address.
    pub self_address: Option<String>,
}

/// Everything the dispatch step needs to send a reply or forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPlan {
    /// What is being composed.
    pub mode: ReplyMode,
    /// Normalized subject.
    pub subject: String,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Copied recipients.
    pub cc: Vec<String>,
    /// `In-Reply-To` value.
    pub in_reply_to: Option<String>,
    /// `References` chain to send.
    pub references: Vec<String>,
}

/// Why a plan could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadingError {
    /// No address to reply to could be determined.
    #[error("no sender address to reply to in thread {0}")]
    NoSender(String),

    /// A forward was requested without targets.
    #[error("forward requires at least one recipient")]
    NoForwardRecipients,
}

/// Builds the complete plan for `mode` on `snapshot`.
///
/// `explicit_to` supplies the forward targets and is ignored for replies.
///
/// # Errors
///
/// [`ThreadingError::NoSender`] for replies with nobody to address;
/// [`ThreadingError::NoForwardRecipients`] for forwards with no targets.
pub fn build_reply_plan(
    snapshot: &ThreadSnapshot,
    mode: ReplyMode,
    explicit_to: Option<&[String]>,
) -> Result<ReplyPlan, ThreadingError> {
    let Recipients { to, cc } = compute_recipients(snapshot, mode, explicit_to)?;
    let ThreadingMetadata {
        in_reply_to,
        references,
    } = compute_threading_metadata(snapshot);

    Ok(ReplyPlan {
        mode,
        subject: normalize_subject(&snapshot.subject, mode),
        to,
        cc,
        in_reply_to,
        references,
    })
}
