// Classified results for one segment's pipeline run.
// Invokers return structured errors instead of raising ad hoc ones so the
// runner can decide, per kind, whether to record, continue, or abort.

use thiserror::Error;

/// Classified failure from one pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// flatone reported no meshes for this segment. Expected, not retried.
    #[error("No meshes found.")]
    NoMeshes,

    /// flatone found no usable access credential. Systemic, aborts the run.
    #[error("No valid access credential found.")]
    AuthMissing,

    /// Anything else: missing skeleton, I/O failure, statistics engine error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-segment result kind, produced exactly once per segment per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Ok,
    NoMeshes,
    AuthMissing,
    Error(String),
}

/// Classified result of processing one segment.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub seg_id: u64,
    pub kind: OutcomeKind,
}

impl Outcome {
    pub fn from_stage_result<T>(seg_id: u64, result: Result<T, StageError>) -> Self {
        let kind = match result {
            Ok(_) => OutcomeKind::Ok,
            Err(StageError::NoMeshes) => OutcomeKind::NoMeshes,
            Err(StageError::AuthMissing) => OutcomeKind::AuthMissing,
            Err(StageError::Other(e)) => OutcomeKind::Error(format!("{e:#}")),
        };
        Outcome { seg_id, kind }
    }
}
