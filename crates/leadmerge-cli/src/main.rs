use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use leadmerge_core::RawProspect;
use leadmerge_dedup::ProspectMatcher;
use leadmerge_ingest::load_batch;
use leadmerge_sync::{report_recent_runs_markdown, SyncConfig, SyncPipeline};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "leadmerge-cli")]
#[command(about = "Prospect entity resolution command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a raw prospect batch and write run reports.
    Dedup {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
    /// Print the pairwise verdict for two records of a batch.
    Match {
        #[arg(long)]
        input: PathBuf,
        id_a: String,
        id_b: String,
    },
    /// Summarize the most recent runs as markdown.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn find<'a>(batch: &'a [RawProspect], id: &str) -> Result<&'a RawProspect> {
    batch
        .iter()
        .find(|p| p.prospect_id == id)
        .ok_or_else(|| anyhow!("no record with prospect_id {id:?} in batch"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Dedup {
        input: None,
        workspace_root: None,
    }) {
        Commands::Dedup {
            input,
            workspace_root,
        } => {
            let mut config = SyncConfig::from_env();
            if let Some(input) = input {
                config.input_path = input;
            }
            if let Some(root) = workspace_root {
                config.workspace_root = root;
            }
            let summary = SyncPipeline::new(config).run_once().await?;
            let stats = &summary.statistics;
            println!(
                "dedup complete: run_id={} processed={} canonical={} merged={} flagged={} unmatched={} reports={}",
                summary.run_id,
                stats.total_processed,
                stats.canonical_prospects_created,
                stats.auto_merged_count,
                stats.review_flagged_count,
                stats.unmatched_count,
                summary.reports_dir
            );
        }
        Commands::Match { input, id_a, id_b } => {
            let config = SyncConfig::from_env();
            let batch = load_batch(&input, &config.ingest)?;
            let a = find(&batch, &id_a)?;
            let b = find(&batch, &id_b)?;
            let verdict = ProspectMatcher::new(config.match_config).verdict(a, b);
            println!(
                "{} <-> {}: level={:?} confidence={:.2} signal={:?}",
                a.prospect_id, b.prospect_id, verdict.level, verdict.confidence, verdict.signal
            );
        }
        Commands::Report {
            runs,
            workspace_root,
        } => {
            let root = workspace_root.or_else(|| std::env::var("LEADMERGE_WORKSPACE_ROOT").ok().map(PathBuf::from));
            println!("{}", report_recent_runs_markdown(runs, root)?);
        }
    }

    Ok(())
}
