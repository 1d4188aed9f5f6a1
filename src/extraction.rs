// Extraction stage: run the external flatone tool for one segment and
// classify its outcome. flatone's exit code is not authoritative; the
// combined stdout/stderr transcript is the source of truth, matched against a
// small table of sentinel phrases.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::artifacts;
use crate::outcome::StageError;

/// Sentinel phrases flatone prints for failure modes that matter to the
/// orchestrator. Matching is substring-based over the whole transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// The segment has no extractable meshes. Per-segment, expected.
    NoMeshes,
    /// No usable access credential in the environment. Systemic.
    AuthMissing,
}

impl Sentinel {
    pub const fn phrase(self) -> &'static str {
        match self {
            Sentinel::NoMeshes => "No meshes found.",
            Sentinel::AuthMissing => "No valid access credential found.",
        }
    }

    fn into_error(self) -> StageError {
        match self {
            Sentinel::NoMeshes => StageError::NoMeshes,
            Sentinel::AuthMissing => StageError::AuthMissing,
        }
    }
}

/// The full sentinel table, checked in order; first match wins.
pub const SENTINELS: [Sentinel; 2] = [Sentinel::NoMeshes, Sentinel::AuthMissing];

/// Scan a combined transcript for a known sentinel phrase.
pub fn classify_transcript(transcript: &str) -> Option<Sentinel> {
    SENTINELS
        .iter()
        .copied()
        .find(|s| transcript.contains(s.phrase()))
}

/// Echo one subprocess stream live while buffering it for classification.
async fn tee_lines<R: AsyncRead + Unpin>(reader: R, to_stderr: bool) -> std::io::Result<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut transcript = String::new();
    while let Some(line) = lines.next_line().await? {
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
        transcript.push_str(&line);
        transcript.push('\n');
    }
    Ok(transcript)
}

/// Run `<program> <seg_id> --output-dir <root> [--overwrite]` and return the
/// segment's output directory on success.
///
/// Ensures the segment directory exists and clears any stale extraction error
/// marker before launching. On a sentinel match the phrase is written to the
/// marker file and the classified error returned; otherwise the invocation is
/// treated as successful regardless of the numeric exit status.
pub async fn run_flatone(
    program: &Path,
    seg_id: u64,
    root: &Path,
    overwrite: bool,
) -> Result<PathBuf, StageError> {
    let seg_dir = artifacts::segment_dir(root, seg_id);
    tokio::fs::create_dir_all(&seg_dir)
        .await
        .with_context(|| format!("failed to create output dir {}", seg_dir.display()))?;

    let marker = artifacts::extraction_error_path(&seg_dir);
    if marker.exists() {
        debug!(seg_id, "clearing stale extraction error marker");
        tokio::fs::remove_file(&marker)
            .await
            .with_context(|| format!("failed to remove {}", marker.display()))?;
    }

    let mut cmd = Command::new(program);
    cmd.arg(seg_id.to_string())
        .arg("--output-dir")
        .arg(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if overwrite {
        cmd.arg("--overwrite");
    }

    info!(seg_id, program = %program.display(), "launching flatone");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to launch {}", program.display()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("flatone stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("flatone stderr was not captured"))?;

    let (out, err) = tokio::join!(tee_lines(stdout, false), tee_lines(stderr, true));
    let transcript = format!(
        "{}{}",
        out.context("failed reading flatone stdout")?,
        err.context("failed reading flatone stderr")?
    );

    let status = child
        .wait()
        .await
        .context("failed waiting for flatone to exit")?;
    debug!(seg_id, code = status.code(), "flatone exited");

    if let Some(sentinel) = classify_transcript(&transcript) {
        warn!(seg_id, phrase = sentinel.phrase(), "flatone reported a known failure");
        tokio::fs::write(&marker, format!("{}\n", sentinel.phrase()))
            .await
            .with_context(|| format!("failed to write {}", marker.display()))?;
        return Err(sentinel.into_error());
    }

    if !status.success() {
        // Transcript is authoritative; a nonzero exit without a sentinel is
        // still treated as success.
        warn!(seg_id, code = status.code(), "flatone exit status nonzero, no sentinel matched");
    }

    Ok(seg_dir)
}
