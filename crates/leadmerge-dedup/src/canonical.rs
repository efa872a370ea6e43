//! Folding clusters into canonical prospects.

use chrono::Utc;
use leadmerge_core::{CanonicalProspect, RawProspect};
use uuid::Uuid;

use crate::cluster::Cluster;

/// Merges a cluster into one entity. Singletons keep their raw identifier;
/// multi-member merges get a fresh one that never collides with a member's.
pub fn canonicalize(cluster: &Cluster) -> CanonicalProspect {
    fold_members(cluster.members())
}

/// Canonical form of one record that matched nothing.
pub fn canonicalize_unmatched(raw: &RawProspect) -> CanonicalProspect {
    fold_members(std::slice::from_ref(raw))
}

fn fold_members(members: &[RawProspect]) -> CanonicalProspect {
    let base = &members[0];
    let prospect_id = if members.len() == 1 {
        base.prospect_id.clone()
    } else {
        fresh_prospect_id(members)
    };

    let mut canonical = CanonicalProspect::seeded_from(base, prospect_id, Utc::now());
    for member in members {
        canonical.fold(member);
    }
    canonical
}

fn fresh_prospect_id(members: &[RawProspect]) -> String {
    loop {
        let candidate = Uuid::new_v4().to_string();
        if members.iter().all(|m| m.prospect_id != candidate) {
            return candidate;
        }
    }
}
