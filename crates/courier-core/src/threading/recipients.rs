//! Recipient computation.

use super::address::{dedupe_addresses, mailbox, same_mailbox};
use super::{ReplyMode, ThreadSnapshot, ThreadingError};

/// Computed `To` and `Cc` lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    /// Primary recipients.
    pub to: Vec<String>,
    /// Copied recipients.
    pub cc: Vec<String>,
}

/// Computes recipients for `mode`.
///
/// - `Reply` addresses the thread's reply-to address. When that is the
///   replying account itself (a reply to one's own message), the latest
///   message's other `To` recipients are addressed instead.
/// - `ReplyAll` addresses the reply-to address and every `To` recipient,
///   copies every `Cc` recipient, never includes the replying account and
///   never lists a mailbox twice. If only `Cc` recipients remain, they move
///   to `To`.
/// - `Forward` addresses `explicit_to`.
///
/// # Errors
///
/// [`ThreadingError::NoSender`] when a reply has nobody to address;
/// [`ThreadingError::NoForwardRecipients`] when a forward has no targets.
pub fn compute_recipients(
    snapshot: &ThreadSnapshot,
    mode: ReplyMode,
    explicit_to: Option<&[String]>,
) -> Result<Recipients, ThreadingError> {
    let self_box = snapshot
        .self_address
        .as_deref()
        .map(mailbox)
        .filter(|m| !m.is_empty());
    let is_self = |address: &str| self_box.as_deref().is_some_and(|me| mailbox(address) == me);
    let sender = snapshot
        .reply_to_address
        .as_deref()
        .filter(|a| !mailbox(a).is_empty());
    let no_sender = || ThreadingError::NoSender(snapshot.thread_id.clone());

    match mode {
        ReplyMode::Reply => {
            let sender = sender.ok_or_else(no_sender)?;
            let to = if is_self(sender) {
                without(dedupe_addresses(&snapshot.all_to), &is_self)
            } else {
                vec![sender.trim().to_string()]
            };
            if to.is_empty() {
                return Err(no_sender());
            }
            Ok(Recipients { to, cc: Vec::new() })
        }
        ReplyMode::ReplyAll => {
            let to = without(
                dedupe_addresses(sender.into_iter().chain(snapshot.all_to.iter().map(String::as_str))),
                &is_self,
            );
            let cc: Vec<String> = without(dedupe_addresses(&snapshot.all_cc), &is_self)
                .into_iter()
                .filter(|c| !to.iter().any(|t| same_mailbox(t, c)))
                .collect();

            match (to.is_empty(), cc.is_empty()) {
                (true, true) => Err(no_sender()),
                (true, false) => Ok(Recipients { to: cc, cc: Vec::new() }),
                _ => Ok(Recipients { to, cc }),
            }
        }
        ReplyMode::Forward => {
            let to = dedupe_addresses(explicit_to.unwrap_or_default());
            if to.is_empty() {
                return Err(ThreadingError::NoForwardRecipients);
            }
            Ok(Recipients { to, cc: Vec::new() })
        }
    }
}

fn without(addresses: Vec<String>, exclude: &impl Fn(&str) -> bool) -> Vec<String> {
    addresses.into_iter().filter(|a| !exclude(a)).collect()
}
