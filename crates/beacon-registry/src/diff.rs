//! Leaf-set diffing.
//!
//! Discovery events are derived from structural diffs rather than explicit
//! change logs: the previous and new subtrees are flattened to their leaf
//! `ServiceRef` lists and compared under the identity rule (jvm_id when both
//! sides are resolved, connect URI otherwise).
//!
//! The three result sets are disjoint by construction: every new ref either
//! matches exactly one previous ref (and lands in `updated` iff any field
//! differs) or matches none (`added`); previous refs left unmatched land in
//! `removed`.

use beacon_model::ServiceRef;

/// Result of diffing two leaf sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDiff {
    /// Targets present in the new set with no identity match in the old.
    pub added: Vec<ServiceRef>,

    /// Targets present in the old set with no identity match in the new.
    pub removed: Vec<ServiceRef>,

    /// Identity-matched targets whose fields differ. Carries the new side.
    pub updated: Vec<ServiceRef>,
}

impl ServiceDiff {
    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Computes added/removed/updated between two leaf sets.
///
/// Each old ref is matched at most once, so a transient connect-URI
/// duplicate in the new set produces one match plus one `added` entry rather
/// than double-counting.
pub fn diff_leaves(old: &[ServiceRef], new: &[ServiceRef]) -> ServiceDiff {
    let mut matched = vec![false; old.len()];
    let mut diff = ServiceDiff::default();

    for candidate in new {
        let found = old
            .iter()
            .enumerate()
            .find(|(i, previous)| !matched[*i] && previous.same_target(candidate));

        match found {
            Some((i, previous)) => {
                matched[i] = true;
                if previous != candidate {
                    diff.updated.push(candidate.clone());
                }
            }
            None => diff.added.push(candidate.clone()),
        }
    }

    diff.removed = old
        .iter()
        .zip(&matched)
        .filter(|(_, was_matched)| !**was_matched)
        .map(|(previous, _)| previous.clone())
        .collect();

    diff
}
