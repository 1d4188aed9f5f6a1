// Top-level orchestration: dispatch one pipeline per segment with bounded
// concurrency, funnel outcomes to a single aggregator, and fail fast on
// systemic failures. The aggregator is the only writer of the aggregate
// bookkeeping files, so no file locking is needed between workers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::artifacts;
use crate::extraction;
use crate::outcome::{Outcome, OutcomeKind, StageError};
use crate::planner::{self, RunPolicy};
use crate::stats::StatsEngine;

/// End-of-run counts per outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ok: usize,
    pub no_meshes: usize,
    pub errors: usize,
}

/// One configured batch run. Cheap to clone; workers each hold a clone.
#[derive(Clone)]
pub struct Runner {
    pub root: PathBuf,
    pub policy: RunPolicy,
    /// Path of the extraction tool; injectable so tests can script it.
    pub flatone: PathBuf,
    pub engine: Arc<dyn StatsEngine>,
}

impl Runner {
    pub fn new(root: PathBuf, policy: RunPolicy, engine: Arc<dyn StatsEngine>) -> Self {
        Runner {
            root,
            policy,
            flatone: PathBuf::from("flatone"),
            engine,
        }
    }

    /// Run the full pipeline over `seg_ids`.
    ///
    /// At `jobs <= 1` segments run strictly sequentially and outcomes are
    /// recorded in input order. Otherwise a pool of `jobs` workers processes
    /// segments and outcomes arrive in completion order. Returns an error on
    /// the first systemic (auth) failure after halting further dispatch.
    pub async fn process_many(&self, seg_ids: &[u64]) -> Result<RunSummary> {
        info!(
            segments = seg_ids.len(),
            jobs = self.policy.jobs,
            root = %self.root.display(),
            "starting batch run"
        );
        let mut aggregator = Aggregator::start(&self.root).await?;

        if self.policy.jobs <= 1 {
            for &seg_id in seg_ids {
                let outcome = self.process_one(seg_id).await;
                if !aggregator.record(outcome).await? {
                    return Err(fatal_auth_error());
                }
            }
            return Ok(aggregator.summary);
        }

        // Pooled path. Workers send exactly one outcome each; the stop flag
        // halts dispatch of not-yet-started segments but never kills in-flight
        // subprocess work.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let permits = Arc::new(Semaphore::new(self.policy.jobs));

        let dispatcher = {
            let runner = self.clone();
            let seg_ids = seg_ids.to_vec();
            let stop = Arc::clone(&stop);
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                for seg_id in seg_ids {
                    if stop.load(Ordering::SeqCst) {
                        info!("stop flag set, halting dispatch");
                        break;
                    }
                    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                        break;
                    };
                    // Recheck after possibly waiting on a permit.
                    if stop.load(Ordering::SeqCst) {
                        info!("stop flag set, halting dispatch");
                        break;
                    }
                    let runner = runner.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let outcome = runner.process_one(seg_id).await;
                        drop(permit);
                        // Send fails only after a circuit break; the outcome
                        // is intentionally dropped then.
                        let _ = tx.send(outcome);
                    });
                }
            })
        };

        let mut fatal = false;
        while let Some(outcome) = rx.recv().await {
            if !aggregator.record(outcome).await? {
                fatal = true;
                stop.store(true, Ordering::SeqCst);
                rx.close();
                break;
            }
        }

        // Let the dispatcher observe the stop flag and quiesce; in-flight
        // workers finish on their own.
        dispatcher.await.context("dispatcher task panicked")?;

        if fatal {
            return Err(fatal_auth_error());
        }
        Ok(aggregator.summary)
    }

    /// Full pipeline for one segment: plan, extraction, then statistics.
    /// A stage failure short-circuits the rest for this segment only.
    async fn process_one(&self, seg_id: u64) -> Outcome {
        let seg_dir = artifacts::segment_dir(&self.root, seg_id);
        let plan = planner::plan(self.policy, &seg_dir);
        if !plan.run_extraction && !plan.run_stats {
            info!(seg_id, "nothing to do");
            return Outcome {
                seg_id,
                kind: OutcomeKind::Ok,
            };
        }

        let result = self.run_stages(seg_id, &seg_dir, plan).await;
        Outcome::from_stage_result(seg_id, result)
    }

    async fn run_stages(
        &self,
        seg_id: u64,
        seg_dir: &Path,
        plan: planner::TaskPlan,
    ) -> Result<(), StageError> {
        // Extraction first so a freshly produced skeleton is available for the
        // statistics stage within the same run.
        if plan.run_extraction {
            extraction::run_flatone(&self.flatone, seg_id, &self.root, self.policy.overwrite)
                .await?;
        }
        if plan.run_stats {
            crate::stats::compute_and_save_stats(
                seg_id,
                seg_dir,
                self.policy.overwrite,
                self.engine.as_ref(),
            )
            .await?;
        }
        Ok(())
    }
}

fn fatal_auth_error() -> anyhow::Error {
    anyhow::anyhow!("no valid access credential found; aborting run")
}

/// Single writer for all aggregate bookkeeping. Truncates the well-known
/// lists at construction; per-segment marker files stay untouched until their
/// segment is actually reprocessed.
struct Aggregator {
    root: PathBuf,
    summary: RunSummary,
}

impl Aggregator {
    async fn start(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("failed to create output dir {}", root.display()))?;
        for name in [artifacts::NOT_PROCESSED_LIST, artifacts::STATS_ERROR_LIST] {
            let path = root.join(name);
            tokio::fs::write(&path, b"")
                .await
                .with_context(|| format!("failed to truncate {}", path.display()))?;
        }
        Ok(Aggregator {
            root: root.to_path_buf(),
            summary: RunSummary::default(),
        })
    }

    /// Record one outcome. Returns false when the run must stop (systemic
    /// failure observed).
    async fn record(&mut self, outcome: Outcome) -> Result<bool> {
        match outcome.kind {
            OutcomeKind::Ok => {
                self.summary.ok += 1;
            }
            OutcomeKind::NoMeshes => {
                // The per-segment marker was already written by the invoker.
                warn!(seg_id = outcome.seg_id, "no meshes found");
                self.append_list(artifacts::NOT_PROCESSED_LIST, outcome.seg_id)
                    .await?;
                self.summary.no_meshes += 1;
            }
            OutcomeKind::Error(ref message) => {
                warn!(seg_id = outcome.seg_id, %message, "segment errored");
                let seg_dir = artifacts::segment_dir(&self.root, outcome.seg_id);
                tokio::fs::create_dir_all(&seg_dir)
                    .await
                    .with_context(|| format!("failed to create {}", seg_dir.display()))?;
                let marker = artifacts::stats_error_path(&seg_dir);
                tokio::fs::write(&marker, message)
                    .await
                    .with_context(|| format!("failed to write {}", marker.display()))?;
                self.append_list(artifacts::STATS_ERROR_LIST, outcome.seg_id)
                    .await?;
                self.summary.errors += 1;
            }
            OutcomeKind::AuthMissing => {
                warn!(seg_id = outcome.seg_id, "missing access credential, aborting run");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn append_list(&self, name: &str, seg_id: u64) -> Result<()> {
        let path = self.root.join(name);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(format!("{seg_id}\n").as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", path.display()))?;
        Ok(())
    }
}
