// Per-segment task planning: which of {extraction, statistics} must run,
// given the requested policy and the artifacts already on disk.

use std::path::Path;

use crate::artifacts;

/// Which stages a run is asked to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run flatone, then compute arbor statistics (default).
    #[default]
    Both,
    /// Run flatone only.
    ExtractionOnly,
    /// Compute arbor statistics only, from an existing skeleton.
    StatsOnly,
}

impl RunMode {
    pub fn wants_extraction(self) -> bool {
        matches!(self, RunMode::Both | RunMode::ExtractionOnly)
    }

    pub fn wants_stats(self) -> bool {
        matches!(self, RunMode::Both | RunMode::StatsOnly)
    }
}

/// Immutable run policy, constructed once at the CLI boundary and passed by
/// value everywhere. `overwrite` and `new_only` are mutually exclusive at the
/// boundary; the planner behaves sensibly even if both arrive set (overwrite
/// takes precedence).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunPolicy {
    pub mode: RunMode,
    pub overwrite: bool,
    pub new_only: bool,
    /// Worker pool size; 1 degenerates to strictly sequential execution.
    pub jobs: usize,
}

/// Stages to execute for one segment, decided fresh per segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPlan {
    pub run_extraction: bool,
    pub run_stats: bool,
}

/// Decide which stages must run for `seg_dir` under `policy`.
///
/// Overwrite ignores existing artifacts entirely. New-only suppresses a stage
/// whose output already exists. The default (neither flag) attempts every
/// wanted stage and relies on the invokers' own short-circuits, so a
/// pre-existing stats record is returned rather than recomputed.
pub fn plan(policy: RunPolicy, seg_dir: &Path) -> TaskPlan {
    let want_extraction = policy.mode.wants_extraction();
    let want_stats = policy.mode.wants_stats();

    if policy.overwrite {
        return TaskPlan {
            run_extraction: want_extraction,
            run_stats: want_stats,
        };
    }

    if policy.new_only {
        return TaskPlan {
            run_extraction: want_extraction && !artifacts::extraction_complete(seg_dir),
            run_stats: want_stats && !artifacts::stats_complete(seg_dir),
        };
    }

    TaskPlan {
        run_extraction: want_extraction,
        run_stats: want_stats,
    }
}
