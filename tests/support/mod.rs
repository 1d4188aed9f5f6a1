// Not every test crate uses every helper here.
#![allow(dead_code)]

// Shared fixtures for runner integration tests: a temp output root plus a
// scripted fake flatone whose behavior each test chooses. The script logs
// every invocation to ROOT/invocations.txt so tests can assert dispatch
// counts and ordering.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use arborstats::planner::RunPolicy;
use arborstats::runner::Runner;
use arborstats::stats::CableStats;

/// Script body producing the artifacts a real flatone run would leave behind.
pub const SUCCESS_BODY: &str = r#"printf 'obj\n' > "$root/$seg_id/mesh.obj"
printf '1 0 0.0 0.0 0.0 1.0 -1\n2 0 0.0 0.0 10.0 1.0 1\n3 0 3.0 0.0 14.0 0.5 2\n4 0 -3.0 0.0 14.0 0.5 2\n' > "$root/$seg_id/skeleton_warped.swc"
echo "flatone finished segment $seg_id"
"#;

/// Script body for the expected per-segment failure.
pub const NO_MESHES_BODY: &str = r#"echo "No meshes found." >&2
"#;

/// Script body for the systemic failure.
pub const AUTH_MISSING_BODY: &str = r#"echo "No valid access credential found." >&2
"#;

pub struct Fixture {
    pub temp: TempDir,
    pub root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("output");
        Fixture { temp, root }
    }

    /// Write an executable fake flatone with the given body appended to the
    /// common argument-parsing preamble.
    pub fn fake_flatone(&self, body: &str) -> PathBuf {
        let script = format!(
            r#"#!/bin/sh
seg_id="$1"
shift
root=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) root="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$root/$seg_id"
echo "$seg_id" >> "$root/invocations.txt"
{body}"#
        );
        let path = self.temp.path().join("flatone");
        std::fs::write(&path, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
        path
    }

    pub fn runner(&self, policy: RunPolicy, flatone: PathBuf) -> Runner {
        let mut runner = Runner::new(self.root.clone(), policy, Arc::new(CableStats));
        runner.flatone = flatone;
        runner
    }

    /// Seg IDs the fake flatone was invoked with, in invocation order,
    /// accumulated across runs.
    pub fn invocations(&self) -> Vec<u64> {
        read_id_lines(&self.root.join("invocations.txt"))
    }

    pub fn bookkeeping(&self, name: &str) -> Vec<u64> {
        read_id_lines(&self.root.join(name))
    }
}

fn read_id_lines(path: &Path) -> Vec<u64> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect()
}
