//! `In-Reply-To` / `References` computation.

use super::ThreadSnapshot;

/// Threading headers for a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadingMetadata {
    /// Message being replied to.
    pub in_reply_to: Option<String>,
    /// Full chain, oldest first, ending with `in_reply_to`.
    pub references: Vec<String>,
}

/// Computes threading headers from the latest message in the thread.
///
/// `references` is the snapshot's chain, in order and never shorter, with
/// the latest message id appended unless the chain already holds it.
#[must_use]
pub fn compute_threading_metadata(snapshot: &ThreadSnapshot) -> ThreadingMetadata {
    let in_reply_to = snapshot
        .last_message_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string);

    let mut references: Vec<String> = snapshot
        .references
        .iter()
        .map(|r| r.trim().to_string())
        .collect();

    if let Some(id) = &in_reply_to {
        if !references.contains(id) {
            references.push(id.clone());
        }
    }

    ThreadingMetadata {
        in_reply_to,
        references,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(last: Option<&str>, refs: &[&str]) -> ThreadSnapshot {
        ThreadSnapshot {
            last_message_id: last.map(ToString::to_string),
            references: refs.iter().map(ToString::to_string).collect(),
            ..ThreadSnapshot::default()
        }
    }

    #[test]
    fn appends_last_message_id() {
        let meta = compute_threading_metadata(&snapshot(Some("<m3>"), &["<m1>", "<m2>"]));
        assert_eq!(meta.in_reply_to.as_deref(), Some("<m3>"));
        assert_eq!(meta.references, vec!["<m1>", "<m2>", "<m3>"]);
    }

    #[test]
    fn does_not_duplicate_trailing_id() {
        let meta = compute_threading_metadata(&snapshot(Some("<m2>"), &["<m1>", "<m2>"]));
        assert_eq!(meta.references, vec!["<m1>", "<m2>"]);
    }

    #[test]
    fn without_last_id_references_pass_through() {
        let meta = compute_threading_metadata(&snapshot(Some("  "), &["<m1>", " <m2> "]));
        assert!(meta.in_reply_to.is_none());
        assert_eq!(meta.references, vec!["<m1>", "<m2>"]);
    }

    #[test]
    fn id_earlier_in_chain_is_not_repeated() {
        let meta = compute_threading_metadata(&snapshot(Some("<m1>"), &["<m1>", "<m2>"]));
        assert_eq!(meta.references, vec!["<m1>", "<m2>"]);
    }

    proptest! {
        #[test]
        fn references_never_shrink_below_distinct_input(
            refs in prop::collection::vec("<m[0-9]{1,2}>", 0..8),
            last in proptest::option::of("<m[0-9]{1,2}>"),
        ) {
            let snap = ThreadSnapshot {
                last_message_id: last.clone(),
                references: refs.clone(),
                ..ThreadSnapshot::default()
            };
            let meta = compute_threading_metadata(&snap);

            prop_assert!(meta.references.len() >= refs.len());
            prop_assert_eq!(&meta.references[..refs.len()], &refs[..]);
            if let Some(last) = last {
                let before = refs.iter().filter(|r| **r == last).count();
                let after = meta.references.iter().filter(|r| **r == last).count();
                prop_assert_eq!(after, before.max(1));
                if refs.last() == Some(&last) {
                    prop_assert_eq!(meta.references.len(), refs.len());
                }
            }
        }
    }
}
