//! Subject prefix normalization.

use super::ReplyMode;

/// Prefix tokens recognized at the start of a subject.
const PREFIXES: [&str; 3] = ["fwd", "re", "fw"];

/// Strips one leading `Re:` / `Fwd:` / `Fw:` token (with an optional
/// `[n]` counter, as in `Re[2]:`). Returns `None` if there is none.
fn strip_prefix_token(subject: &str) -> Option<&str> {
    let bytes = subject.as_bytes();
    let prefix_len = PREFIXES.iter().find_map(|p| {
        subject
            .get(..p.len())
            .filter(|head| head.eq_ignore_ascii_case(p))
            .map(|_| p.len())
    })?;

    let mut i = prefix_len;
    if bytes.get(i) == Some(&b'[') {
        let close = subject[i..].find(']')? + i;
        if close == i + 1 || !subject[i + 1..close].bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        i = close + 1;
    }
    while bytes.get(i) == Some(&b' ') {
        i += 1;
    }
    if bytes.get(i) != Some(&b':') {
        return None;
    }
    Some(subject[i + 1..].trim_start())
}

/// Normalizes a subject for `mode`.
///
/// Any run of leading reply/forward tokens is removed and exactly one
/// `Re: ` (replies) or `Fwd: ` (forwards) is prepended. Applying it twice
/// gives the same result as applying it once.
#[must_use]
pub fn normalize_subject(original: &str, mode: ReplyMode) -> String {
    let mut rest = original.trim();
    while let Some(stripped) = strip_prefix_token(rest) {
        rest = stripped;
    }

    let prefix = if mode.is_reply() { "Re:" } else { "Fwd:" };
    if rest.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix} {rest}")
    }
}
