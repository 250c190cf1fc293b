//! RFC 5322 envelopes for APIs that take raw messages.

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use crate::threading::ReplyPlan;

/// A plain-text message ready to be serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Sender address; omitted lets the backend fill in the account.
    pub from: Option<String>,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Copied recipients.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// `In-Reply-To` header.
    pub in_reply_to: Option<String>,
    /// `References` header, oldest first.
    pub references: Vec<String>,
    /// Original RFC 5322 message carried as a `message/rfc822` part.
    pub forwarded: Option<String>,
}

impl OutgoingMessage {
    /// Creates a new message.
    #[must_use]
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Builds the message a reply plan describes.
    #[must_use]
    pub fn from_plan(plan: &ReplyPlan, body: impl Into<String>) -> Self {
        Self {
            from: None,
            to: plan.to.clone(),
            cc: plan.cc.clone(),
            subject: plan.subject.clone(),
            body: body.into(),
            in_reply_to: plan.in_reply_to.clone(),
            references: plan.references.clone(),
            forwarded: None,
        }
    }

    /// Attaches `original` (a whole RFC 5322 message) after the body.
    #[must_use]
    pub fn forwarding(mut self, original: impl Into<String>) -> Self {
        self.forwarded = Some(original.into());
        self
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, sender: impl Into<String>) -> Self {
        self.from = Some(sender.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Builds the RFC 5322 formatted message.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        let mut message = String::new();

        if let Some(from) = &self.from {
            let _ = write!(message, "From: {from}\r\n");
        }
        if !self.to.is_empty() {
            let _ = write!(message, "To: {}\r\n", self.to.join(", "));
        }
        if !self.cc.is_empty() {
            let _ = write!(message, "Cc: {}\r\n", self.cc.join(", "));
        }
        let _ = write!(message, "Subject: {}\r\n", encode_header(&self.subject));
        if let Some(id) = &self.in_reply_to {
            let _ = write!(message, "In-Reply-To: {id}\r\n");
        }
        if !self.references.is_empty() {
            let _ = write!(message, "References: {}\r\n", self.references.join(" "));
        }
        message.push_str("MIME-Version: 1.0\r\n");

        match &self.forwarded {
            None => push_text_part(&mut message, &self.body),
            Some(original) => {
                let boundary = boundary_for(&self.body, original);
                let _ = write!(
                    message,
                    "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"
                );
                let _ = write!(message, "--{boundary}\r\n");
                push_text_part(&mut message, &self.body);
                let _ = write!(message, "--{boundary}\r\n");
                message.push_str("Content-Type: message/rfc822\r\n");
                message.push_str("Content-Disposition: inline\r\n");
                message.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                push_lines(&mut message, original);
                let _ = write!(message, "--{boundary}--\r\n");
            }
        }

        message
    }

    /// URL-safe base64 of [`to_rfc5322`](Self::to_rfc5322), as Gmail's `raw`.
    #[must_use]
    pub fn to_raw(&self) -> String {
        URL_SAFE.encode(self.to_rfc5322())
    }
}

fn push_text_part(message: &mut String, body: &str) {
    message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    message.push_str("Content-Transfer-Encoding: 8bit\r\n");
    message.push_str("\r\n");
    push_lines(message, body);
}

/// Appends `text` with every line ending normalized to CRLF.
fn push_lines(message: &mut String, text: &str) {
    for line in text.lines() {
        message.push_str(line);
        message.push_str("\r\n");
    }
}

/// A multipart boundary that occurs in neither part.
fn boundary_for(body: &str, original: &str) -> String {
    let mut n = 0u32;
    loop {
        let candidate = format!("courier-forward-{n}");
        if !body.contains(&candidate) && !original.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// RFC 2047 encodes `text` when it is not plain ASCII.
fn encode_header(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) && !text.contains("=?") {
        return text.to_string();
    }
    format!("=?utf-8?B?{}?=", STANDARD.encode(text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::threading::ReplyMode;

    #[test]
    fn reply_headers_are_written() {
        let plan = ReplyPlan {
            mode: ReplyMode::Reply,
            subject: "Re: Lunch".into(),
            to: vec!["ann@x.com".into()],
            cc: vec!["bo@x.com".into()],
            in_reply_to: Some("<m2@x>".into()),
            references: vec!["<m1@x>".into(), "<m2@x>".into()],
        };
        let text = OutgoingMessage::from_plan(&plan, "sounds good\nsee you").to_rfc5322();

        assert!(text.contains("To: ann@x.com\r\n"));
        assert!(text.contains("Cc: bo@x.com\r\n"));
        assert!(text.contains("Subject: Re: Lunch\r\n"));
        assert!(text.contains("In-Reply-To: <m2@x>\r\n"));
        assert!(text.contains("References: <m1@x> <m2@x>\r\n"));
        assert!(text.ends_with("\r\n\r\nsounds good\r\nsee you\r\n"));
        assert!(!text.contains("From:"));
    }

    #[test]
    fn forward_carries_original_as_rfc822_part() {
        let original = "From: ann@x.com\r\nSubject: Launch\r\n\r\nWe ship Monday.\r\n";
        let text = OutgoingMessage::new("Fwd: Launch", "FYI")
            .to("dee@x.com")
            .forwarding(original)
            .to_rfc5322();

        assert!(text.contains("Content-Type: multipart/mixed; boundary=\"courier-forward-0\"\r\n"));
        assert!(text.contains("--courier-forward-0\r\nContent-Type: text/plain"));
        assert!(text.contains("\r\n\r\nFYI\r\n--courier-forward-0\r\n"));
        assert!(text.contains("Content-Type: message/rfc822\r\n"));
        assert!(text.contains("Subject: Launch\r\n\r\nWe ship Monday.\r\n"));
        assert!(text.ends_with("--courier-forward-0--\r\n"));
    }

    #[test]
    fn boundary_avoids_content() {
        assert_eq!(boundary_for("see courier-forward-0", ""), "courier-forward-1");
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let text = OutgoingMessage::new("Grüße", "").to_rfc5322();
        assert!(text.contains("Subject: =?utf-8?B?R3LDvMOfZQ==?=\r\n"));
    }

    #[test]
    fn raw_is_url_safe_base64() {
        let msg = OutgoingMessage::new("hi", "???>>>").to("a@x.com");
        let raw = msg.to_raw();
        assert!(!raw.contains('+') && !raw.contains('/'));
        let decoded = URL_SAFE.decode(raw).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), msg.to_rfc5322());
    }
}
