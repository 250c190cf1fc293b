//! Address comparison helpers.
//!
//! Addresses keep their display form (`Ann <ann@example.com>`) in plans, but
//! are compared on the bare mailbox, case-insensitively.

use std::collections::HashSet;

/// Bare, lower-cased mailbox of an address.
///
/// `"Ann <Ann@Example.com>"` and `"mailto:ann@example.com"` both yield
/// `"ann@example.com"`.
#[must_use]
pub fn mailbox(address: &str) -> String {
    let trimmed = address.trim();
    let inner = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(open), Some(close)) if open < close => &trimmed[open + 1..close],
        _ => trimmed,
    };
    let inner = inner.trim();
    let inner = inner
        .get(..7)
        .filter(|p| p.eq_ignore_ascii_case("mailto:"))
        .map_or(inner, |_| &inner[7..]);
    inner.trim().to_lowercase()
}

/// True when both addresses name the same mailbox.
#[must_use]
pub fn same_mailbox(a: &str, b: &str) -> bool {
    let a = mailbox(a);
    !a.is_empty() && a == mailbox(b)
}

/// Splits a header value like `To:` into individual addresses.
///
/// Commas inside quoted display names or angle brackets do not split.
#[must_use]
pub fn split_address_list(header: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for ch in header.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                escaped = true;
                current.push(ch);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' | ';' if !in_quotes && !in_angle => {
                push_trimmed(&mut out, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !mailbox(trimmed).is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Removes repeated mailboxes, keeping the first occurrence and its form.
///
/// Blank entries are dropped.
pub fn dedupe_addresses<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter_map(|a| {
            let a = a.as_ref().trim();
            let key = mailbox(a);
            (!key.is_empty() && seen.insert(key)).then(|| a.to_string())
        })
        .collect()
}
