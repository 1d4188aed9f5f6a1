use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use arborstats::planner::{RunMode, RunPolicy};
use arborstats::runner::Runner;
use arborstats::segids::{self, SegidSource};
use arborstats::stats::CableStats;

#[derive(Parser, Debug)]
#[command(name = "arborstats")]
#[command(about = "Run flatone + compute arbor statistics per segment")]
#[command(version)]
#[command(group(ArgGroup::new("source").required(true).args(["segids", "google_sheet_id", "csv"])))]
#[command(group(ArgGroup::new("overwrite_policy").args(["overwrite_all", "new_only"])))]
#[command(group(ArgGroup::new("mode").args(["flatone_arbor_stats_both", "arbor_stats_only", "flatone_only"])))]
struct Args {
    /// One or more segment IDs
    #[arg(long, num_args = 1.., value_name = "SEG_ID")]
    segids: Vec<u64>,

    /// Google Sheet ID to read segment IDs from
    #[arg(long)]
    google_sheet_id: Option<String>,

    /// CSV path containing segment IDs
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Column name in --csv with segment IDs
    #[arg(long)]
    csv_col: Option<String>,

    /// Values in the 'Status' column to include when reading a sheet
    #[arg(long, num_args = 0.., default_values_t = ["Complete".to_string(), "Complete (cut off)".to_string()])]
    status_filter: Vec<String>,

    /// Values in the 'Cell Requires Review' column to include when reading a sheet
    #[arg(long, num_args = 0.., default_values_t = ["FALSE".to_string()])]
    cell_review_filter: Vec<String>,

    /// Root output directory (flatone writes SEG_ID/ here)
    #[arg(long)]
    output_dir: PathBuf,

    /// Parallel workers
    #[arg(short = 'j', long, default_value_t = 1)]
    jobs: usize,

    /// Run flatone and compute arbor stats even if output exists
    #[arg(long)]
    overwrite_all: bool,

    /// Run flatone and compute arbor stats only for new segment IDs
    #[arg(long)]
    new_only: bool,

    /// Run flatone and compute arbor stats (default)
    #[arg(long)]
    flatone_arbor_stats_both: bool,

    /// Skip flatone; compute arbor stats only (uses existing SWC if present)
    #[arg(long)]
    arbor_stats_only: bool,

    /// Run flatone only; skip arbor stats
    #[arg(long)]
    flatone_only: bool,

    /// Path of the flatone executable
    #[arg(long, default_value = "flatone")]
    flatone_bin: PathBuf,
}

impl Args {
    fn segid_source(&self) -> SegidSource {
        if !self.segids.is_empty() {
            SegidSource::Explicit(self.segids.clone())
        } else if let Some(sheet_id) = &self.google_sheet_id {
            SegidSource::Sheet {
                sheet_id: sheet_id.clone(),
                status_filter: self.status_filter.clone(),
                review_filter: self.cell_review_filter.clone(),
            }
        } else {
            SegidSource::CsvFile {
                path: self.csv.clone().unwrap_or_default(),
                column: self.csv_col.clone(),
            }
        }
    }

    fn run_mode(&self) -> RunMode {
        if self.arbor_stats_only {
            RunMode::StatsOnly
        } else if self.flatone_only {
            RunMode::ExtractionOnly
        } else {
            RunMode::Both
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();
    info!(?args, "Parsed CLI arguments");

    let seg_ids = segids::resolve(args.segid_source()).await?;
    if seg_ids.is_empty() {
        eprintln!("No segment IDs found.");
        std::process::exit(2);
    }
    info!(count = seg_ids.len(), "Resolved segment IDs");

    let policy = RunPolicy {
        mode: args.run_mode(),
        overwrite: args.overwrite_all,
        new_only: args.new_only,
        jobs: args.jobs.max(1),
    };

    let mut runner = Runner::new(args.output_dir, policy, Arc::new(CableStats));
    runner.flatone = args.flatone_bin;

    let summary = runner.process_many(&seg_ids).await?;

    println!("Batch run complete:");
    println!("  Succeeded: {} segments", summary.ok);
    if summary.no_meshes > 0 {
        println!("  No meshes found: {} segments", summary.no_meshes);
    }
    if summary.errors > 0 {
        println!("  Errored: {} segments", summary.errors);
    }

    Ok(())
}
