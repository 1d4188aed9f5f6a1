// Statistics stage: load the warped skeleton for a segment, hand it to the
// statistics engine, and persist the resulting record. A pre-existing record
// is returned untouched unless overwrite was requested.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::artifacts;
use crate::outcome::StageError;

/// Tree-structured skeleton: node coordinates, per-node radii, and edges as
/// index pairs into `coords`.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub coords: Vec<[f64; 3]>,
    pub radii: Vec<f64>,
    pub edges: Vec<[usize; 2]>,
}

/// Boundary to the morphology-metrics computation. Implementations return a
/// metric->value mapping and a parallel metric->unit mapping.
pub trait StatsEngine: Send + Sync {
    fn compute(&self, skeleton: &Skeleton) -> Result<(BTreeMap<String, f64>, BTreeMap<String, String>)>;
}

/// Built-in engine computing basic cable statistics.
#[derive(Debug, Default)]
pub struct CableStats;

impl StatsEngine for CableStats {
    fn compute(&self, skeleton: &Skeleton) -> Result<(BTreeMap<String, f64>, BTreeMap<String, String>)> {
        if skeleton.coords.is_empty() {
            bail!("skeleton has no nodes");
        }

        let total_length: f64 = skeleton
            .edges
            .iter()
            .map(|&[a, b]| {
                let (pa, pb) = (skeleton.coords[a], skeleton.coords[b]);
                ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2) + (pa[2] - pb[2]).powi(2)).sqrt()
            })
            .sum();

        let mut child_counts = vec![0usize; skeleton.coords.len()];
        for &[_, parent] in &skeleton.edges {
            child_counts[parent] += 1;
        }
        let n_branch_points = child_counts.iter().filter(|&&c| c >= 2).count();

        let mut stats = BTreeMap::new();
        stats.insert("total_length".to_string(), total_length);
        stats.insert("n_nodes".to_string(), skeleton.coords.len() as f64);
        stats.insert("n_branch_points".to_string(), n_branch_points as f64);

        let mut units = BTreeMap::new();
        units.insert("total_length".to_string(), "µm".to_string());
        units.insert("n_nodes".to_string(), "count".to_string());
        units.insert("n_branch_points".to_string(), "count".to_string());

        Ok((stats, units))
    }
}

/// Persisted per-segment statistics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub segment_id: u64,
    pub stats: BTreeMap<String, f64>,
    pub units: BTreeMap<String, String>,
}

/// Parse SWC text: whitespace-delimited `id type x y z radius parent` rows,
/// `#` comment lines skipped, parent `-1` marks a root. Edges point child to
/// parent. Node IDs may be sparse; they are remapped to dense indices.
pub fn parse_swc(text: &str) -> Result<Skeleton> {
    let mut ids = BTreeMap::new();
    let mut coords = Vec::new();
    let mut radii = Vec::new();
    let mut parents = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            bail!("SWC line {}: expected 7 fields, got {}", lineno + 1, fields.len());
        }
        let id: i64 = fields[0]
            .parse()
            .with_context(|| format!("SWC line {}: bad node id {:?}", lineno + 1, fields[0]))?;
        let coord = [
            fields[2].parse::<f64>().with_context(|| format!("SWC line {}: bad x", lineno + 1))?,
            fields[3].parse::<f64>().with_context(|| format!("SWC line {}: bad y", lineno + 1))?,
            fields[4].parse::<f64>().with_context(|| format!("SWC line {}: bad z", lineno + 1))?,
        ];
        let radius: f64 = fields[5]
            .parse()
            .with_context(|| format!("SWC line {}: bad radius", lineno + 1))?;
        let parent: i64 = fields[6]
            .parse()
            .with_context(|| format!("SWC line {}: bad parent id", lineno + 1))?;

        ids.insert(id, coords.len());
        coords.push(coord);
        radii.push(radius);
        parents.push(parent);
    }

    let mut edges = Vec::new();
    for (child, &parent) in parents.iter().enumerate() {
        if parent < 0 {
            continue;
        }
        let &parent_idx = ids
            .get(&parent)
            .with_context(|| format!("SWC node {} references unknown parent {}", child, parent))?;
        edges.push([child, parent_idx]);
    }

    Ok(Skeleton { coords, radii, edges })
}

/// Load the warped skeleton for one segment. The plain `skeleton.swc` is
/// deliberately not used as a fallback.
async fn load_skeleton(seg_id: u64, seg_dir: &Path) -> Result<Skeleton> {
    let swc_path = artifacts::skeleton_warped_path(seg_dir);
    if !swc_path.exists() {
        bail!(
            "no {} for segment {} in {}; run extraction first",
            artifacts::SKELETON_WARPED_FILE,
            seg_id,
            seg_dir.display()
        );
    }
    let text = tokio::fs::read_to_string(&swc_path)
        .await
        .with_context(|| format!("failed to read {}", swc_path.display()))?;
    parse_swc(&text).with_context(|| format!("failed to parse {}", swc_path.display()))
}

/// Compute and persist the statistics record for one segment, returning the
/// record path. If a record already exists and `overwrite` is false it is
/// returned as-is and the engine is never invoked.
pub async fn compute_and_save_stats(
    seg_id: u64,
    seg_dir: &Path,
    overwrite: bool,
    engine: &dyn StatsEngine,
) -> Result<PathBuf, StageError> {
    tokio::fs::create_dir_all(seg_dir)
        .await
        .with_context(|| format!("failed to create output dir {}", seg_dir.display()))?;

    let marker = artifacts::stats_error_path(seg_dir);
    if marker.exists() {
        debug!(seg_id, "clearing stale stats error marker");
        tokio::fs::remove_file(&marker)
            .await
            .with_context(|| format!("failed to remove {}", marker.display()))?;
    }

    let record_path = artifacts::stats_record_path(seg_dir);
    if record_path.exists() && !overwrite {
        debug!(seg_id, "stats record already present, skipping recomputation");
        return Ok(record_path);
    }

    let skeleton = load_skeleton(seg_id, seg_dir).await?;
    let (stats, units) = engine
        .compute(&skeleton)
        .with_context(|| format!("statistics computation failed for segment {seg_id}"))?;

    let record = StatsRecord {
        segment_id: seg_id,
        stats,
        units,
    };
    write_record(&record_path, &record).await?;
    info!(seg_id, path = %record_path.display(), "wrote stats record");
    Ok(record_path)
}

/// Durable write: serialize to a sibling temp file, then rename into place.
async fn write_record(record_path: &Path, record: &StatsRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("failed to serialize stats record")?;
    let tmp_path = record_path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, record_path)
        .await
        .with_context(|| format!("failed to rename into {}", record_path.display()))?;
    Ok(())
}

/// Read a previously persisted statistics record.
pub async fn read_record(record_path: &Path) -> Result<StatsRecord> {
    let text = tokio::fs::read_to_string(record_path)
        .await
        .with_context(|| format!("failed to read {}", record_path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", record_path.display()))
}
