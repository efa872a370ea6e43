//! Single greedy clustering pass over one batch.

use leadmerge_core::RawProspect;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matcher::{MatchLevel, MatchVerdict, ProspectMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterLevel {
    None,
    Medium,
    High,
}

/// Records tentatively believed to be one entity. Never empty; the first member is the seed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    members: Vec<RawProspect>,
    match_level: ClusterLevel,
    confidence: f64,
}

impl Cluster {
    pub fn seeded(seed: RawProspect) -> Self {
        Self {
            members: vec![seed],
            match_level: ClusterLevel::None,
            confidence: 0.0,
        }
    }

    pub fn seed(&self) -> &RawProspect {
        &self.members[0]
    }

    pub fn members(&self) -> &[RawProspect] {
        &self.members
    }

    pub fn into_members(self) -> Vec<RawProspect> {
        self.members
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    pub fn match_level(&self) -> ClusterLevel {
        self.match_level
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// High verdicts always join. Medium verdicts join only until the cluster reaches high.
    pub fn accepts(&self, verdict: &MatchVerdict) -> bool {
        match verdict.level {
            MatchLevel::High => true,
            MatchLevel::Medium => self.match_level != ClusterLevel::High,
            MatchLevel::Low => false,
        }
    }

    /// Adds an accepted member. Level and confidence only ever go up.
    pub fn absorb(&mut self, member: RawProspect, verdict: &MatchVerdict) {
        let level = match verdict.level {
            MatchLevel::High => ClusterLevel::High,
            MatchLevel::Medium => ClusterLevel::Medium,
            MatchLevel::Low => ClusterLevel::None,
        };
        self.members.push(member);
        self.match_level = self.match_level.max(level);
        self.confidence = self.confidence.max(verdict.confidence);
    }
}

/// Partitions `records` into clusters in input order, first seen wins.
///
/// Each unconsumed record seeds a cluster and is compared against every later
/// unconsumed record; earlier records are never revisited, so the result
/// depends on input order.
pub fn cluster_records(matcher: &ProspectMatcher, records: Vec<RawProspect>) -> Vec<Cluster> {
    let mut slots: Vec<Option<RawProspect>> = records.into_iter().map(Some).collect();
    let mut clusters = Vec::new();

    for i in 0..slots.len() {
        let Some(seed) = slots[i].take() else {
            continue;
        };
        let mut cluster = Cluster::seeded(seed);

        for slot in slots.iter_mut().skip(i + 1) {
            let Some(candidate) = slot.as_ref() else {
                continue;
            };
            let verdict = matcher.verdict(cluster.seed(), candidate);
            if !cluster.accepts(&verdict) {
                continue;
            }
            if let Some(member) = slot.take() {
                debug!(
                    seed = %cluster.seed().prospect_id,
                    member = %member.prospect_id,
                    signal = ?verdict.signal,
                    confidence = verdict.confidence,
                    "record joined cluster"
                );
                cluster.absorb(member, &verdict);
            }
        }

        clusters.push(cluster);
    }

    clusters
}
