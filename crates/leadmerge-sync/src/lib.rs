//! Run orchestration: load a batch, resolve it, write run reports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use leadmerge_core::{DedupReport, RawProspect, RunStatistics};
use leadmerge_dedup::{DedupEngine, MatchConfig};
use leadmerge_ingest::{load_batch, IngestOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "leadmerge-sync";

pub const RESULTS_FILE: &str = "deduplication_results.json";
pub const BRIEF_FILE: &str = "dedup_brief.md";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub input_path: PathBuf,
    pub workspace_root: PathBuf,
    pub match_config: MatchConfig,
    pub ingest: IngestOptions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("./artifacts/raw_prospects.json"),
            workspace_root: PathBuf::from("."),
            match_config: MatchConfig::default(),
            ingest: IngestOptions::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_match = defaults.match_config;
        Self {
            input_path: std::env::var("LEADMERGE_INPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.input_path),
            workspace_root: std::env::var("LEADMERGE_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            match_config: MatchConfig {
                high_name_similarity: env_ratio("LEADMERGE_HIGH_NAME_SIMILARITY")
                    .unwrap_or(default_match.high_name_similarity),
                medium_name_similarity: env_ratio("LEADMERGE_MEDIUM_NAME_SIMILARITY")
                    .unwrap_or(default_match.medium_name_similarity),
            },
            ingest: IngestOptions {
                rescore_discovery_confidence: std::env::var("LEADMERGE_RESCORE_CONFIDENCE")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(false),
            },
        }
    }

    pub fn reports_root(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True")
}

fn parse_ratio(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| (0.0..=1.0).contains(v))
}

fn env_ratio(key: &str) -> Option<f64> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse_ratio(&raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring similarity threshold outside [0, 1]");
    }
    parsed
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_path: String,
    pub statistics: RunStatistics,
    pub reports_dir: String,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub files: Vec<RunManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub struct SyncPipeline {
    config: SyncConfig,
    engine: DedupEngine,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let engine = DedupEngine::new(config.match_config);
        Self { config, engine }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&mut self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("dedup_run", %run_id);
        self.run_instrumented(run_id, started_at).instrument(span).await
    }

    async fn run_instrumented(&mut self, run_id: Uuid, started_at: DateTime<Utc>) -> Result<SyncRunSummary> {
        let records = load_batch(&self.config.input_path, &self.config.ingest)?;
        let platform_counts = platform_counts(&records);

        let report = self
            .engine
            .process(records)
            .context("resolving raw prospect batch")?;

        let finished_at = Utc::now();
        let reports_dir = self
            .write_reports(run_id, started_at, finished_at, &platform_counts, &report)
            .await?;
        let manifest_path = write_manifest(&reports_dir, run_id).await?;

        info!(
            reports_dir = %reports_dir.display(),
            canonical = report.summary.canonical_prospects_created,
            "run reports written"
        );

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            input_path: self.config.input_path.display().to_string(),
            statistics: report.summary,
            reports_dir: reports_dir.display().to_string(),
            manifest: manifest_path.display().to_string(),
        })
    }

    async fn write_reports(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        platform_counts: &BTreeMap<String, usize>,
        report: &DedupReport,
    ) -> Result<PathBuf> {
        let reports_dir = self.config.reports_root().join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let results = serde_json::to_vec_pretty(report).context("serializing deduplication results")?;
        fs::write(reports_dir.join(RESULTS_FILE), results)
            .await
            .with_context(|| format!("writing {RESULTS_FILE}"))?;

        let summary = &report.summary;
        let brief = format!(
            "# Deduplication Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Input: `{}`\n- Raw prospects: {}\n- Canonical prospects: {}\n- Auto-merged: {} ({:.2}%)\n- Flagged for review: {} ({:.2}%)\n- Unmatched: {}\n\n## Source Platforms\n{}\n",
            run_id,
            started_at,
            finished_at,
            self.config.input_path.display(),
            summary.total_processed,
            summary.canonical_prospects_created,
            summary.auto_merged_count,
            summary.merge_rate_percent,
            summary.review_flagged_count,
            summary.flagged_rate_percent,
            summary.unmatched_count,
            platform_counts
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n")
        );
        fs::write(reports_dir.join(BRIEF_FILE), brief)
            .await
            .with_context(|| format!("writing {BRIEF_FILE}"))?;

        Ok(reports_dir)
    }
}

pub async fn run_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let mut pipeline = SyncPipeline::new(config);
    pipeline.run_once().await
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn platform_counts(records: &[RawProspect]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts
            .entry(record.source_platform.as_str().to_string())
            .or_default() += 1;
    }
    counts
}

async fn write_manifest(reports_dir: &Path, run_id: Uuid) -> Result<PathBuf> {
    let manifest = RunManifest {
        schema_version: 1,
        run_id,
        files: vec![
            manifest_entry("deduplication_results", reports_dir, &reports_dir.join(RESULTS_FILE)).await?,
            manifest_entry("dedup_brief", reports_dir, &reports_dir.join(BRIEF_FILE)).await?,
        ],
    };
    let manifest_path = reports_dir.join(MANIFEST_FILE);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing run manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

async fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<RunManifestFile> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(RunManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: sha256_hex(&bytes),
        bytes: bytes.len() as u64,
    })
}

/// Markdown listing of the most recent runs under `<workspace_root>/reports`.
pub fn report_recent_runs_markdown(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join(RESULTS_FILE).exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# Deduplication Runs".to_string(), String::new()];
    for dir in dirs {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let results_path = dir.path().join(RESULTS_FILE);
        let brief_path = dir.path().join(BRIEF_FILE);
        let manifest_path = dir.path().join(MANIFEST_FILE);

        let report: DedupReport = serde_json::from_str(
            &std::fs::read_to_string(&results_path)
                .with_context(|| format!("reading {}", results_path.display()))?,
        )
        .with_context(|| format!("parsing {}", results_path.display()))?;
        let summary = report.summary;

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- raw prospects: {}", summary.total_processed));
        lines.push(format!(
            "- auto-merged: {} ({:.2}%)",
            summary.auto_merged_count, summary.merge_rate_percent
        ));
        lines.push(format!(
            "- flagged for review: {} ({:.2}%)",
            summary.review_flagged_count, summary.flagged_rate_percent
        ));
        lines.push(format!("- unmatched: {}", summary.unmatched_count));
        lines.push(format!("- results: `{}`", results_path.display()));
        if brief_path.exists() {
            lines.push(format!("- brief: `{}`", brief_path.display()));
        }
        if manifest_path.exists() {
            lines.push(format!("- manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}
