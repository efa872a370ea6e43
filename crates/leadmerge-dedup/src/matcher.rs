//! Pairwise match verdicts between raw prospects.
//!
//! Rules are checked in fixed priority and the first one that fires wins:
//! profile identity, website domain, shared email with similar names, similar
//! names in the same location, very similar names alone. Every rule compares
//! the two records symmetrically, so `verdict(a, b) == verdict(b, a)`.

use leadmerge_core::RawProspect;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static PROFILE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)linkedin\.com/(?:in|company)/([^/?#]+)").expect("profile id pattern compiles")
});

static LEGAL_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:LLC|Ltd|Inc|Corp|Limited|Corporation|Co)\b\.?")
        .expect("legal suffix pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    Low,
    Medium,
    High,
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSignal {
    ProfileIdentity,
    Domain,
    EmailAndName,
    NameAndLocation,
    NameOnly,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchVerdict {
    pub level: MatchLevel,
    pub confidence: f64,
    pub signal: MatchSignal,
}

impl MatchVerdict {
    fn new(level: MatchLevel, confidence: f64, signal: MatchSignal) -> Self {
        Self {
            level,
            confidence,
            signal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Name similarity needed for name-only and name+location evidence.
    pub high_name_similarity: f64,
    /// Name similarity needed alongside a shared email.
    pub medium_name_similarity: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            high_name_similarity: 0.90,
            medium_name_similarity: 0.75,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProspectMatcher {
    config: MatchConfig,
}

impl ProspectMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn verdict(&self, a: &RawProspect, b: &RawProspect) -> MatchVerdict {
        if let (Some(id_a), Some(id_b)) = (extract_profile_id(&a.source_url), extract_profile_id(&b.source_url)) {
            if id_a == id_b {
                return MatchVerdict::new(MatchLevel::High, 1.0, MatchSignal::ProfileIdentity);
            }
        }

        let domain_a = a.contact.website().and_then(normalize_domain);
        let domain_b = b.contact.website().and_then(normalize_domain);
        if let (Some(domain_a), Some(domain_b)) = (domain_a, domain_b) {
            if domain_a == domain_b {
                return MatchVerdict::new(MatchLevel::High, 0.95, MatchSignal::Domain);
            }
        }

        let name_sim = name_similarity(&a.name, &b.name);

        if let (Some(email_a), Some(email_b)) = (a.contact.email(), b.contact.email()) {
            if email_a.to_lowercase() == email_b.to_lowercase()
                && name_sim >= self.config.medium_name_similarity
            {
                return MatchVerdict::new(MatchLevel::High, 0.90, MatchSignal::EmailAndName);
            }
        }

        if name_sim >= self.config.high_name_similarity {
            let location_a = a.location.trim().to_lowercase();
            let location_b = b.location.trim().to_lowercase();
            if !location_a.is_empty() && location_a == location_b {
                return MatchVerdict::new(MatchLevel::Medium, 0.80, MatchSignal::NameAndLocation);
            }
            return MatchVerdict::new(MatchLevel::Medium, 0.75, MatchSignal::NameOnly);
        }

        MatchVerdict::new(MatchLevel::Low, name_sim, MatchSignal::None)
    }
}

/// Handle segment of a LinkedIn `/in/` or `/company/` URL.
pub fn extract_profile_id(source_url: &str) -> Option<&str> {
    PROFILE_ID
        .captures(source_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Bare lowercase host of a website, without scheme, `www.`, port, path, query or fragment.
/// Ports are ignored: `acme.test:8443` and `acme.test` normalize to the same domain.
pub fn normalize_domain(website: &str) -> Option<String> {
    let website = website.trim();
    if website.is_empty() {
        return None;
    }
    let candidate = if website.contains("://") {
        website.to_string()
    } else {
        format!("https://{website}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

pub fn normalize_name(name: &str) -> String {
    let stripped = LEGAL_SUFFIX.replace_all(name, "");
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two names after normalization, in [0, 1].
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    // The block search breaks ties by position, so fix the argument order.
    if a <= b {
        sequence_ratio(&a, &b)
    } else {
        sequence_ratio(&b, &a)
    }
}

/// Ratcliff/Obershelp ratio: `2 * matched / (len(a) + len(b))` over recursively
/// found longest common blocks. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common block inside `a[alo..ahi]` and `b[blo..bhi]`; earliest in `a`, then in `b`.
fn longest_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let size = prev[col - 1] + 1;
                curr[col] = size;
                if size > best_size {
                    best_i = i + 1 - size;
                    best_j = j + 1 - size;
                    best_size = size;
                }
            } else {
                curr[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (best_i, best_j, best_size)
}
