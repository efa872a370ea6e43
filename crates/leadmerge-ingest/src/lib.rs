//! Ingestion boundary: loosely-typed scraper output into validated raw prospects.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use leadmerge_core::{About, ContactInfo, RawProspect, SourcePlatform};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "leadmerge-ingest";

/// Record shape as upstream scrapers and search agents emit it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default)]
    pub prospect_id: Option<String>,
    #[serde(default)]
    pub source_platform: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub about: Option<About>,
    #[serde(default, alias = "contact_info")]
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub business_context: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default, alias = "discovery_confidence_score")]
    pub discovery_confidence: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Replace upstream confidence with [`discovery_confidence_from_attributes`].
    pub rescore_discovery_confidence: bool,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed record at index {index}: field `{field}` {reason}")]
    MalformedRecord {
        index: usize,
        field: &'static str,
        reason: String,
    },
    #[error("batch is not a JSON array of records: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    fn malformed(index: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            index,
            field,
            reason: reason.into(),
        }
    }
}

/// Attribute-completeness score used by upstream scrapers, in [0, 1].
pub fn discovery_confidence_from_attributes(
    contact: &ContactInfo,
    location: Option<&str>,
    business_context: Option<&str>,
) -> f64 {
    let mut score = 0.0;
    if contact.email().is_some() {
        score += 0.3;
    }
    if contact.phone().is_some() {
        score += 0.2;
    }
    if contact.website().is_some() {
        score += 0.2;
    }
    if location.is_some_and(|l| !l.is_empty()) {
        score += 0.15;
    }
    if business_context.is_some_and(|c| !c.is_empty()) {
        score += 0.15;
    }
    (f64::min(score, 1.0) * 100.0).round() / 100.0
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive ISO-8601 stamps are written in UTC upstream.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn validate_record(
    index: usize,
    record: SourceRecord,
    options: &IngestOptions,
) -> Result<RawProspect, IngestError> {
    let name = record
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| IngestError::malformed(index, "name", "is missing or blank"))?;

    let contact = record
        .contact
        .ok_or_else(|| IngestError::malformed(index, "contact", "is missing"))?;

    let location = record
        .location
        .ok_or_else(|| IngestError::malformed(index, "location", "is missing"))?;

    let platform_label = record
        .source_platform
        .ok_or_else(|| IngestError::malformed(index, "source_platform", "is missing"))?;
    let source_platform = SourcePlatform::from_label(&platform_label).ok_or_else(|| {
        IngestError::malformed(
            index,
            "source_platform",
            format!("has unknown value {platform_label:?}"),
        )
    })?;

    let timestamp_raw = record
        .timestamp
        .ok_or_else(|| IngestError::malformed(index, "timestamp", "is missing"))?;
    let timestamp = parse_timestamp(&timestamp_raw).ok_or_else(|| {
        IngestError::malformed(
            index,
            "timestamp",
            format!("is not an ISO-8601 datetime: {timestamp_raw:?}"),
        )
    })?;

    let discovery_confidence = if options.rescore_discovery_confidence {
        discovery_confidence_from_attributes(
            &contact,
            Some(location.as_str()),
            record.business_context.as_deref(),
        )
    } else {
        let value = record.discovery_confidence.ok_or_else(|| {
            IngestError::malformed(index, "discovery_confidence", "is missing")
        })?;
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(IngestError::malformed(
                index,
                "discovery_confidence",
                format!("must be within [0, 1], got {value}"),
            ));
        }
        value
    };

    let prospect_id = record
        .prospect_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("temp_{}", Uuid::new_v4()));

    Ok(RawProspect {
        prospect_id,
        source_platform,
        name,
        about: record.about,
        contact,
        location,
        business_context: record.business_context,
        source_url: record.source_url.unwrap_or_default(),
        discovery_confidence,
        timestamp,
    })
}

/// Parses a JSON array of source records. The first malformed record fails the batch.
pub fn parse_batch(json: &str, options: &IngestOptions) -> Result<Vec<RawProspect>, IngestError> {
    let records: Vec<SourceRecord> = serde_json::from_str(json)?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| validate_record(index, record, options))
        .collect()
}

pub fn load_batch(path: impl AsRef<Path>, options: &IngestOptions) -> Result<Vec<RawProspect>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let batch = parse_batch(&data, options).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), records = batch.len(), "loaded raw prospect batch");
    debug!(
        maps = batch.iter().filter(|p| p.source_platform == SourcePlatform::Maps).count(),
        search = batch.iter().filter(|p| p.source_platform == SourcePlatform::Search).count(),
        "batch platform mix"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn fixture_batch_path(name: &str) -> PathBuf {
        workspace_root().join("fixtures").join("batches").join(name)
    }

    fn minimal_record() -> SourceRecord {
        SourceRecord {
            prospect_id: Some("temp_1".into()),
            source_platform: Some("google_maps".into()),
            name: Some("Acme Forex LLC".into()),
            about: None,
            contact: Some(ContactInfo::default()),
            location: Some("Limassol, Cyprus".into()),
            business_context: None,
            source_url: Some("https://maps.example/acme".into()),
            discovery_confidence: Some(0.5),
            timestamp: Some("2026-02-24T12:00:00Z".into()),
        }
    }

    #[test]
    fn fixture_batch_loads_with_upstream_aliases() {
        let batch = load_batch(fixture_batch_path("mixed_sources.json"), &IngestOptions::default())
            .expect("load fixture batch");
        assert_eq!(batch.len(), 6);
        assert!(batch.iter().any(|p| p.source_platform == SourcePlatform::Search));
        assert!(batch.iter().all(|p| (0.0..=1.0).contains(&p.discovery_confidence)));
    }

    #[test]
    fn load_batch_reads_from_disk_and_names_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        let json = serde_json::to_string(&vec![minimal_record()]).expect("serialize record");
        fs::write(&path, json).expect("write batch");

        let batch = load_batch(&path, &IngestOptions::default()).expect("load batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].source_platform, SourcePlatform::Maps);

        let missing = dir.path().join("missing.json");
        let err = load_batch(&missing, &IngestOptions::default()).unwrap_err();
        assert!(err.to_string().contains(&format!("reading {}", missing.display())));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut record = minimal_record();
        record.location = None;
        let err = validate_record(3, record, &IngestOptions::default()).unwrap_err();
        match err {
            IngestError::MalformedRecord { index, field, .. } => {
                assert_eq!(index, 3);
                assert_eq!(field, "location");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn out_of_range_confidence_is_malformed() {
        let mut record = minimal_record();
        record.discovery_confidence = Some(1.5);
        assert!(matches!(
            validate_record(0, record, &IngestOptions::default()),
            Err(IngestError::MalformedRecord { field: "discovery_confidence", .. })
        ));
    }

    #[test]
    fn one_malformed_record_fails_whole_batch() {
        let json = r#"[
            {"prospect_id": "a", "source_platform": "maps", "name": "A", "contact": {},
             "location": "", "source_url": "", "discovery_confidence": 0.2,
             "timestamp": "2026-02-24T12:00:00Z"},
            {"prospect_id": "b", "source_platform": "maps", "contact": {},
             "location": "", "source_url": "", "discovery_confidence": 0.2,
             "timestamp": "2026-02-24T12:00:00Z"}
        ]"#;
        let err = parse_batch(json, &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedRecord { index: 1, field: "name", .. }));
    }

    #[test]
    fn empty_batch_is_valid() {
        let batch = parse_batch("[]", &IngestOptions::default()).expect("empty batch");
        assert!(batch.is_empty());
    }

    #[test]
    fn missing_prospect_id_gets_temporary_id() {
        let mut record = minimal_record();
        record.prospect_id = None;
        let raw = validate_record(0, record, &IngestOptions::default()).expect("valid");
        assert!(raw.prospect_id.starts_with("temp_"));
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let ts = parse_timestamp("2026-02-24T12:00:00.123456").expect("naive ts");
        assert_eq!(ts.to_rfc3339(), "2026-02-24T12:00:00.123456+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn rescoring_replaces_upstream_confidence() {
        let mut record = minimal_record();
        record.discovery_confidence = None;
        record.contact = Some(ContactInfo {
            email: Some("info@acme.test".into()),
            phone: Some("+357 1234".into()),
            website: None,
        });
        let options = IngestOptions {
            rescore_discovery_confidence: true,
        };
        let raw = validate_record(0, record, &options).expect("valid");
        assert_eq!(raw.discovery_confidence, 0.65);
    }

    #[test]
    fn full_attribute_score_is_clamped() {
        let contact = ContactInfo {
            email: Some("a@b.test".into()),
            phone: Some("1".into()),
            website: Some("b.test".into()),
        };
        assert_eq!(
            discovery_confidence_from_attributes(&contact, Some("Nicosia"), Some("broker")),
            1.0
        );
        assert_eq!(
            discovery_confidence_from_attributes(&ContactInfo::default(), None, None),
            0.0
        );
    }
}
