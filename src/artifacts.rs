// Segment directory layout and artifact probing.
// Existence of specific files is the only signal the orchestrator uses for
// idempotency decisions; file contents stay opaque except for the stats record.

use std::path::{Path, PathBuf};

/// Mesh artifact written by flatone.
pub const MESH_FILE: &str = "mesh.obj";
/// Plain skeleton artifact.
pub const SKELETON_FILE: &str = "skeleton.swc";
/// Warped skeleton artifact; the only variant the statistics stage loads.
pub const SKELETON_WARPED_FILE: &str = "skeleton_warped.swc";
/// Extraction error marker (sentinel phrase verbatim).
pub const EXTRACTION_ERROR_FILE: &str = "error_msg.txt";
/// Statistics error marker (error message verbatim).
pub const STATS_ERROR_FILE: &str = "arbor_stats_error.txt";
/// Persisted statistics record.
pub const STATS_RECORD_FILE: &str = "arbor_stats.json";

/// Aggregate list of seg IDs flatone found no meshes for.
pub const NOT_PROCESSED_LIST: &str = "not_processed_seg_ids.txt";
/// Aggregate list of seg IDs whose statistics stage errored.
pub const STATS_ERROR_LIST: &str = "arbor_stats_error_seg_ids.txt";

/// Output directory for one segment under the run's root.
pub fn segment_dir(root: &Path, seg_id: u64) -> PathBuf {
    root.join(seg_id.to_string())
}

pub fn mesh_path(seg_dir: &Path) -> PathBuf {
    seg_dir.join(MESH_FILE)
}

pub fn skeleton_path(seg_dir: &Path) -> PathBuf {
    seg_dir.join(SKELETON_FILE)
}

pub fn skeleton_warped_path(seg_dir: &Path) -> PathBuf {
    seg_dir.join(SKELETON_WARPED_FILE)
}

pub fn extraction_error_path(seg_dir: &Path) -> PathBuf {
    seg_dir.join(EXTRACTION_ERROR_FILE)
}

pub fn stats_error_path(seg_dir: &Path) -> PathBuf {
    seg_dir.join(STATS_ERROR_FILE)
}

pub fn stats_record_path(seg_dir: &Path) -> PathBuf {
    seg_dir.join(STATS_RECORD_FILE)
}

/// Whether extraction has already produced its artifacts for this segment.
/// Requires the mesh plus at least one skeleton variant. A missing directory
/// simply answers false; probing never errors and never creates anything.
pub fn extraction_complete(seg_dir: &Path) -> bool {
    mesh_path(seg_dir).exists()
        && (skeleton_warped_path(seg_dir).exists() || skeleton_path(seg_dir).exists())
}

/// Whether a statistics record already exists for this segment.
pub fn stats_complete(seg_dir: &Path) -> bool {
    stats_record_path(seg_dir).exists()
}
