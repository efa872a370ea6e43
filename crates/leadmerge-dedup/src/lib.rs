//! Entity resolution over one closed batch of raw prospects.
//!
//! A run clusters the batch with [`cluster_records`], then routes every
//! cluster: high-confidence clusters are merged automatically, medium ones
//! become review flags, and lone records pass through as unmatched entities.

pub mod canonical;
pub mod cluster;
pub mod matcher;

use leadmerge_core::{CanonicalProspect, DedupReport, RawProspect, ReviewFlag, RunStatistics};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use canonical::{canonicalize, canonicalize_unmatched};
pub use cluster::{cluster_records, Cluster, ClusterLevel};
pub use matcher::{
    extract_profile_id, name_similarity, normalize_domain, normalize_name, sequence_ratio,
    MatchConfig, MatchLevel, MatchSignal, MatchVerdict, ProspectMatcher,
};

pub const CRATE_NAME: &str = "leadmerge-dedup";

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("malformed record {prospect_id}: {reason}")]
    MalformedRecord { prospect_id: String, reason: String },
}

/// Where a cluster goes after clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unmatched,
    AutoMerge,
    ReviewFlag,
    /// Multi-member cluster without a usable level; members pass through individually.
    Split,
}

pub fn classify(cluster: &Cluster) -> Outcome {
    if cluster.is_singleton() {
        return Outcome::Unmatched;
    }
    match cluster.match_level() {
        ClusterLevel::High => Outcome::AutoMerge,
        ClusterLevel::Medium => Outcome::ReviewFlag,
        ClusterLevel::None => Outcome::Split,
    }
}

/// Run accumulators live on the engine; `process` takes `&mut self`, so runs never overlap.
#[derive(Debug, Default)]
pub struct DedupEngine {
    matcher: ProspectMatcher,
    auto_merged: Vec<CanonicalProspect>,
    review_flagged: Vec<ReviewFlag>,
    unmatched: Vec<CanonicalProspect>,
    stats: RunStatistics,
}

impl DedupEngine {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            matcher: ProspectMatcher::new(config),
            ..Default::default()
        }
    }

    pub fn unmatched(&self) -> &[CanonicalProspect] {
        &self.unmatched
    }

    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn reset(&mut self) {
        self.auto_merged.clear();
        self.review_flagged.clear();
        self.unmatched.clear();
        self.stats = RunStatistics::default();
    }

    /// Resolves one batch. Accumulators from any previous run are discarded first.
    pub fn process(&mut self, records: Vec<RawProspect>) -> Result<DedupReport, DedupError> {
        self.reset();
        info!(records = records.len(), "starting deduplication");
        validate_batch(&records)?;

        let total_processed = records.len();
        let clusters = cluster_records(&self.matcher, records);
        debug!(clusters = clusters.len(), "built prospect clusters");

        for cluster in clusters {
            match classify(&cluster) {
                Outcome::Unmatched => {
                    self.unmatched.push(canonicalize(&cluster));
                }
                Outcome::AutoMerge => {
                    let merged = canonicalize(&cluster);
                    debug!(
                        prospect_id = %merged.prospect_id,
                        members = cluster.members().len(),
                        "auto-merged cluster"
                    );
                    self.auto_merged.push(merged);
                }
                Outcome::ReviewFlag => {
                    let confidence = cluster.confidence();
                    let flag = ReviewFlag::for_members(confidence, cluster.into_members());
                    debug!(flag_id = %flag.flag_id, members = flag.prospects.len(), "flagged cluster for review");
                    self.review_flagged.push(flag);
                }
                Outcome::Split => {
                    warn!(
                        members = cluster.members().len(),
                        "multi-member cluster without match level; emitting members individually"
                    );
                    self.unmatched
                        .extend(cluster.members().iter().map(canonicalize_unmatched));
                }
            }
        }

        self.stats = RunStatistics::from_counts(
            total_processed,
            self.auto_merged.len(),
            self.review_flagged.len(),
            self.unmatched.len(),
        );

        info!(
            auto_merged = self.stats.auto_merged_count,
            review_flagged = self.stats.review_flagged_count,
            unmatched = self.stats.unmatched_count,
            merge_rate_percent = self.stats.merge_rate_percent,
            "deduplication complete"
        );

        Ok(self.report())
    }

    /// Snapshot of the current accumulators in the shape persistence collaborators consume.
    pub fn report(&self) -> DedupReport {
        let mut prospects_for_enrichment = self.auto_merged.clone();
        prospects_for_enrichment.extend(self.unmatched.iter().cloned());
        DedupReport {
            summary: self.stats.clone(),
            prospects_for_enrichment,
            review_flagged: self.review_flagged.clone(),
            auto_merged_details: self.auto_merged.clone(),
            unmatched_details: self.unmatched.clone(),
        }
    }
}

fn validate_batch(records: &[RawProspect]) -> Result<(), DedupError> {
    for record in records {
        if record.name.trim().is_empty() {
            return Err(DedupError::MalformedRecord {
                prospect_id: record.prospect_id.clone(),
                reason: "name is blank".to_string(),
            });
        }
        let confidence = record.discovery_confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(DedupError::MalformedRecord {
                prospect_id: record.prospect_id.clone(),
                reason: format!("discovery_confidence {confidence} is outside [0, 1]"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use leadmerge_core::{ContactInfo, SourcePlatform, REVIEW_REASON, REVIEW_RECOMMENDED_ACTION};

    fn prospect(id: &str, name: &str, location: &str) -> RawProspect {
        RawProspect {
            prospect_id: id.to_string(),
            source_platform: SourcePlatform::Maps,
            name: name.to_string(),
            about: None,
            contact: ContactInfo::default(),
            location: location.to_string(),
            business_context: None,
            source_url: String::new(),
            discovery_confidence: 0.5,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap(),
        }
    }

    fn with_source_url(mut p: RawProspect, url: &str) -> RawProspect {
        p.source_url = url.to_string();
        p
    }

    #[test]
    fn empty_batch_produces_zeroed_report() {
        let mut engine = DedupEngine::default();
        let report = engine.process(Vec::new()).expect("empty batch is valid");
        assert_eq!(report.summary, RunStatistics::default());
        assert!(report.prospects_for_enrichment.is_empty());
        assert!(report.review_flagged.is_empty());
    }

    #[test]
    fn unrelated_records_stay_unmatched() {
        let mut engine = DedupEngine::default();
        let report = engine
            .process(vec![
                prospect("p1", "Acme Forex", "Limassol, Cyprus"),
                prospect("p2", "Olive Tree Bakery", "Paphos, Cyprus"),
                prospect("p3", "Blue Harbor Capital", "Nicosia, Cyprus"),
                prospect("p4", "Jane Doe Consulting", "Larnaca, Cyprus"),
                prospect("p5", "Kestrel Logistics", "Athens, Greece"),
            ])
            .expect("valid batch");
        assert_eq!(report.summary.total_processed, 5);
        assert_eq!(report.summary.unmatched_count, 5);
        assert_eq!(report.summary.merge_rate_percent, 0.0);
        let ids: Vec<_> = report
            .unmatched_details
            .iter()
            .map(|p| p.prospect_id.as_str())
            .collect();
        assert_eq!(ids, vec!["p1", "p2", "p3", "p4", "p5"]);
    }

    #[test]
    fn shared_profile_merges_into_one_entity() {
        let mut engine = DedupEngine::default();
        let report = engine
            .process(vec![
                with_source_url(prospect("p1", "Jane Doe", "Larnaca"), "https://linkedin.com/in/jdoe"),
                with_source_url(
                    prospect("p2", "Doe Advisory Services", "Cyprus"),
                    "https://www.linkedin.com/in/jdoe/",
                ),
            ])
            .expect("valid batch");
        assert_eq!(report.summary.auto_merged_count, 1);
        assert_eq!(report.summary.merge_rate_percent, 50.0);
        let merged = &report.auto_merged_details[0];
        assert_eq!(merged.sources.len(), 2);
        assert_eq!(merged.name, "Jane Doe");
        assert_eq!(report.prospects_for_enrichment.len(), 1);
    }

    #[test]
    fn medium_match_is_flagged_not_merged() {
        let mut engine = DedupEngine::default();
        let report = engine
            .process(vec![
                prospect("p1", "Acme Forex LLC", "Limassol, Cyprus"),
                prospect("p2", "acme forex", "Limassol, Cyprus"),
            ])
            .expect("valid batch");
        assert_eq!(report.summary.review_flagged_count, 1);
        assert_eq!(report.summary.auto_merged_count, 0);
        assert_eq!(report.summary.flagged_rate_percent, 50.0);
        assert!(report.prospects_for_enrichment.is_empty());

        let flag = &report.review_flagged[0];
        assert_eq!(flag.match_confidence, 0.80);
        assert_eq!(flag.prospects.len(), 2);
        assert_eq!(flag.reason, REVIEW_REASON);
        assert_eq!(flag.recommended_action, REVIEW_RECOMMENDED_ACTION);
    }

    #[test]
    fn enrichment_list_puts_merged_before_unmatched() {
        let mut engine = DedupEngine::default();
        let report = engine
            .process(vec![
                prospect("solo", "Olive Tree Bakery", "Paphos"),
                with_source_url(prospect("p1", "Jane Doe", ""), "https://linkedin.com/in/jdoe"),
                with_source_url(prospect("p2", "J Doe", ""), "https://linkedin.com/in/jdoe"),
            ])
            .expect("valid batch");
        assert_eq!(report.prospects_for_enrichment.len(), 2);
        assert_eq!(report.prospects_for_enrichment[0].sources.len(), 2);
        assert_eq!(report.prospects_for_enrichment[1].prospect_id, "solo");
        assert_eq!(report.summary.canonical_prospects_created, 2);
    }

    #[test]
    fn malformed_record_fails_the_run() {
        let mut engine = DedupEngine::default();
        let mut bad = prospect("bad", "Acme", "");
        bad.discovery_confidence = f64::NAN;
        let err = engine
            .process(vec![prospect("ok", "Olive", ""), bad])
            .unwrap_err();
        assert!(matches!(err, DedupError::MalformedRecord { ref prospect_id, .. } if prospect_id == "bad"));
        assert!(engine.unmatched().is_empty());
    }

    #[test]
    fn blank_name_fails_the_run() {
        let mut engine = DedupEngine::default();
        let err = engine
            .process(vec![prospect("ok", "Olive", ""), prospect("blank", "   ", "")])
            .unwrap_err();
        match err {
            DedupError::MalformedRecord { prospect_id, reason } => {
                assert_eq!(prospect_id, "blank");
                assert!(reason.contains("name"));
            }
        }
        assert!(engine.unmatched().is_empty());
        assert_eq!(engine.stats(), &RunStatistics::default());
    }

    #[test]
    fn out_of_range_confidence_fails_the_run() {
        let mut engine = DedupEngine::default();
        let mut bad = prospect("bad", "Acme", "");
        bad.discovery_confidence = 1.5;
        let err = engine
            .process(vec![prospect("ok", "Olive", ""), bad])
            .unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
        assert!(engine.unmatched().is_empty());
        assert!(engine.report().prospects_for_enrichment.is_empty());
    }

    #[test]
    fn reused_engine_starts_from_clean_accumulators() {
        let mut engine = DedupEngine::default();
        engine
            .process(vec![prospect("p1", "Acme", ""), prospect("p2", "Olive", "")])
            .expect("first run");
        let report = engine
            .process(vec![prospect("p3", "Kestrel", "")])
            .expect("second run");
        assert_eq!(report.summary.total_processed, 1);
        assert_eq!(engine.unmatched().len(), 1);

        engine.reset();
        assert!(engine.unmatched().is_empty());
        assert_eq!(engine.stats(), &RunStatistics::default());
    }

    #[test]
    fn classify_routes_by_size_and_level() {
        let single = Cluster::seeded(prospect("a", "Acme", ""));
        assert_eq!(classify(&single), Outcome::Unmatched);

        let mut split = Cluster::seeded(prospect("a", "Acme", ""));
        split.absorb(
            prospect("b", "Olive", ""),
            &MatchVerdict {
                level: MatchLevel::Low,
                confidence: 0.1,
                signal: MatchSignal::None,
            },
        );
        assert_eq!(classify(&split), Outcome::Split);
    }
}
