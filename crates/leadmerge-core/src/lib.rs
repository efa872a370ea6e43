//! Core domain model and provenance types for leadmerge.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "leadmerge-core";

pub const REVIEW_REASON: &str = "Medium confidence match - requires manual review";
pub const REVIEW_RECOMMENDED_ACTION: &str = "Verify if these represent the same entity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePlatform {
    Maps,
    Search,
}

impl SourcePlatform {
    /// Resolves the platform labels upstream scrapers emit.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "maps" | "google_maps" | "googlemaps" => Some(Self::Maps),
            "search" | "linkedin" | "web" | "google_search" => Some(Self::Search),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maps => "maps",
            Self::Search => "search",
        }
    }
}

/// Free-text description as scraped: one blob, or snippets already split upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum About {
    Text(String),
    Snippets(Vec<String>),
}

impl About {
    pub fn snippets(&self) -> impl Iterator<Item = &str> {
        let items: Vec<&str> = match self {
            Self::Text(text) => vec![text.as_str()],
            Self::Snippets(items) => items.iter().map(String::as_str).collect(),
        };
        items.into_iter().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

impl ContactInfo {
    pub fn email(&self) -> Option<&str> {
        non_empty(&self.email)
    }

    pub fn phone(&self) -> Option<&str> {
        non_empty(&self.phone)
    }

    pub fn website(&self) -> Option<&str> {
        non_empty(&self.website)
    }
}

/// One scraped observation from a single source, validated at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProspect {
    pub prospect_id: String,
    pub source_platform: SourcePlatform,
    pub name: String,
    #[serde(default)]
    pub about: Option<About>,
    pub contact: ContactInfo,
    pub location: String,
    #[serde(default)]
    pub business_context: Option<String>,
    pub source_url: String,
    pub discovery_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawProspect {
    pub fn business_context(&self) -> Option<&str> {
        non_empty(&self.business_context)
    }

    pub fn about_snippets(&self) -> impl Iterator<Item = &str> {
        self.about.iter().flat_map(|about| about.snippets())
    }
}

/// Union of contact points across folded sources; exact-value dedup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergedContactInfo {
    pub emails: BTreeSet<String>,
    pub phones: BTreeSet<String>,
    pub websites: BTreeSet<String>,
}

impl MergedContactInfo {
    pub fn insert_from(&mut self, contact: &ContactInfo) {
        if let Some(email) = contact.email() {
            self.emails.insert(email.to_string());
        }
        if let Some(phone) = contact.phone() {
            self.phones.insert(phone.to_string());
        }
        if let Some(website) = contact.website() {
            self.websites.insert(website.to_string());
        }
    }
}

/// Provenance pointer back to one folded raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub raw_prospect_id: String,
    pub source_platform: SourcePlatform,
    pub source_url: String,
    pub discovery_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&RawProspect> for SourceReference {
    fn from(raw: &RawProspect) -> Self {
        Self {
            raw_prospect_id: raw.prospect_id.clone(),
            source_platform: raw.source_platform,
            source_url: raw.source_url.clone(),
            discovery_confidence: raw.discovery_confidence,
            timestamp: raw.timestamp,
        }
    }
}

/// Deduplicated entity handed to downstream enrichment and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProspect {
    pub prospect_id: String,
    pub name: String,
    pub about: Vec<String>,
    pub contact_info: MergedContactInfo,
    pub location: String,
    pub business_context: Option<String>,
    pub confidence_score: f64,
    pub sources: Vec<SourceReference>,
    #[serde(default)]
    pub source_count: usize,
    pub created_at: DateTime<Utc>,
}

impl CanonicalProspect {
    /// Empty entity seeded with the base record's identity fields. Nothing is folded yet.
    pub fn seeded_from(base: &RawProspect, prospect_id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            prospect_id,
            name: base.name.clone(),
            about: Vec::new(),
            contact_info: MergedContactInfo::default(),
            location: base.location.clone(),
            business_context: None,
            confidence_score: 0.0,
            sources: Vec::new(),
            source_count: 0,
            created_at,
        }
    }

    /// Folds one raw record into this entity. `name` and `location` are never touched.
    pub fn fold(&mut self, raw: &RawProspect) {
        self.contact_info.insert_from(&raw.contact);

        for snippet in raw.about_snippets() {
            if !self.about.iter().any(|existing| existing == snippet) {
                self.about.push(snippet.to_string());
            }
        }

        self.confidence_score = self.confidence_score.max(raw.discovery_confidence);
        self.sources.push(SourceReference::from(raw));
        self.source_count = self.sources.len();

        if self.business_context.is_none() {
            self.business_context = raw.business_context().map(str::to_string);
        }
    }
}

/// Medium-confidence cluster deferred to a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub flag_id: String,
    pub match_confidence: f64,
    pub prospects: Vec<RawProspect>,
    pub reason: String,
    pub recommended_action: String,
}

impl ReviewFlag {
    pub fn for_members(match_confidence: f64, prospects: Vec<RawProspect>) -> Self {
        Self {
            flag_id: Uuid::new_v4().to_string(),
            match_confidence,
            prospects,
            reason: REVIEW_REASON.to_string(),
            recommended_action: REVIEW_RECOMMENDED_ACTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_processed: usize,
    pub canonical_prospects_created: usize,
    pub auto_merged_count: usize,
    pub review_flagged_count: usize,
    pub unmatched_count: usize,
    pub merge_rate_percent: f64,
    pub flagged_rate_percent: f64,
}

impl RunStatistics {
    pub fn from_counts(
        total_processed: usize,
        auto_merged_count: usize,
        review_flagged_count: usize,
        unmatched_count: usize,
    ) -> Self {
        Self {
            total_processed,
            canonical_prospects_created: auto_merged_count + unmatched_count,
            auto_merged_count,
            review_flagged_count,
            unmatched_count,
            merge_rate_percent: percent_of(auto_merged_count, total_processed),
            flagged_rate_percent: percent_of(review_flagged_count, total_processed),
        }
    }
}

/// Result object of one run, accepted verbatim by persistence collaborators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DedupReport {
    pub summary: RunStatistics,
    pub prospects_for_enrichment: Vec<CanonicalProspect>,
    pub review_flagged: Vec<ReviewFlag>,
    pub auto_merged_details: Vec<CanonicalProspect>,
    pub unmatched_details: Vec<CanonicalProspect>,
}

fn percent_of(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 100.0).round_ties_even() / 100.0
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
