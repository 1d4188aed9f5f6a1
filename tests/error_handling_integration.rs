#![cfg(unix)]

use arborstats::artifacts;
use arborstats::planner::{RunMode, RunPolicy};

#[path = "support/mod.rs"]
mod support;
use support::Fixture;

fn policy(mode: RunMode, jobs: usize) -> RunPolicy {
    RunPolicy {
        mode,
        overwrite: false,
        new_only: false,
        jobs,
    }
}

/// A "No meshes found." transcript leaves a per-segment marker, lands the
/// segment on the not-processed list, and produces no stats record; the run
/// itself keeps going.
#[tokio::test]
async fn no_meshes_is_recorded_and_run_continues() {
    let fixture = Fixture::new();
    let flatone = fixture.fake_flatone(support::NO_MESHES_BODY);
    let runner = fixture.runner(policy(RunMode::Both, 1), flatone);

    let summary = runner.process_many(&[7, 8]).await.unwrap();

    assert_eq!(summary.no_meshes, 2);
    assert_eq!(summary.ok, 0);
    assert_eq!(fixture.bookkeeping(artifacts::NOT_PROCESSED_LIST), vec![7, 8]);

    for seg_id in [7, 8] {
        let seg_dir = artifacts::segment_dir(&fixture.root, seg_id);
        let marker = std::fs::read_to_string(artifacts::extraction_error_path(&seg_dir)).unwrap();
        assert_eq!(marker, "No meshes found.\n");
        assert!(!artifacts::stats_record_path(&seg_dir).exists());
    }
}

/// A statistics failure is recorded with its full message and the run
/// continues to later segments.
#[tokio::test]
async fn missing_skeleton_records_error_and_continues() {
    let fixture = Fixture::new();
    let flatone = fixture.fake_flatone(support::SUCCESS_BODY);
    // stats-only with no prior extraction: the skeleton is missing.
    let runner = fixture.runner(policy(RunMode::StatsOnly, 1), flatone);

    let summary = runner.process_many(&[5, 6]).await.unwrap();

    assert_eq!(summary.errors, 2);
    assert_eq!(fixture.bookkeeping(artifacts::STATS_ERROR_LIST), vec![5, 6]);

    let seg_dir = artifacts::segment_dir(&fixture.root, 5);
    let marker = std::fs::read_to_string(artifacts::stats_error_path(&seg_dir)).unwrap();
    assert!(marker.contains("run extraction first"), "{marker}");
}

/// The first missing-credential outcome aborts a sequential run before any
/// further segment is dispatched.
#[tokio::test]
async fn auth_failure_stops_sequential_run_immediately() {
    let fixture = Fixture::new();
    let flatone = fixture.fake_flatone(support::AUTH_MISSING_BODY);
    let runner = fixture.runner(policy(RunMode::Both, 1), flatone);

    let err = runner.process_many(&[1, 2, 3]).await.unwrap_err();

    assert!(err.to_string().contains("credential"), "{err}");
    assert_eq!(fixture.invocations(), vec![1], "no further segments dispatched");
    // Systemic failure is surfaced distinctly, not as per-segment bookkeeping.
    assert!(fixture.bookkeeping(artifacts::NOT_PROCESSED_LIST).is_empty());
    assert!(fixture.bookkeeping(artifacts::STATS_ERROR_LIST).is_empty());
    let seg_dir = artifacts::segment_dir(&fixture.root, 1);
    let marker = std::fs::read_to_string(artifacts::extraction_error_path(&seg_dir)).unwrap();
    assert_eq!(marker, "No valid access credential found.\n");
}

/// In a pooled run the circuit breaker halts dispatch of not-yet-started
/// segments; in-flight workers may still finish, so the invocation count can
/// exceed the pool size but must stay well short of the full batch.
#[tokio::test]
async fn auth_failure_halts_pooled_dispatch() {
    let fixture = Fixture::new();
    // Slow the failure down so dispatch and aggregation genuinely overlap.
    let body = format!("sleep 0.2\n{}", support::AUTH_MISSING_BODY);
    let flatone = fixture.fake_flatone(&body);
    let runner = fixture.runner(policy(RunMode::Both, 2), flatone);

    let seg_ids: Vec<u64> = (1..=20).collect();
    let err = runner.process_many(&seg_ids).await.unwrap_err();

    assert!(err.to_string().contains("credential"), "{err}");
    let invoked = fixture.invocations().len();
    assert!(invoked >= 1);
    assert!(invoked < seg_ids.len(), "dispatch was not halted: {invoked} invocations");
}

/// One segment's failure must not disturb its neighbours' processing.
#[tokio::test]
async fn failures_are_isolated_per_segment() {
    let fixture = Fixture::new();
    // Fail segment 13 only; succeed for everything else.
    let body = format!(
        r#"if [ "$seg_id" = "13" ]; then
  echo "No meshes found." >&2
  exit 0
fi
{}"#,
        support::SUCCESS_BODY
    );
    let flatone = fixture.fake_flatone(&body);
    let runner = fixture.runner(policy(RunMode::Both, 3), flatone);

    let summary = runner.process_many(&[11, 12, 13, 14]).await.unwrap();

    assert_eq!(summary.ok, 3);
    assert_eq!(summary.no_meshes, 1);
    assert_eq!(fixture.bookkeeping(artifacts::NOT_PROCESSED_LIST), vec![13]);
    for seg_id in [11, 12, 14] {
        let seg_dir = artifacts::segment_dir(&fixture.root, seg_id);
        assert!(artifacts::stats_record_path(&seg_dir).exists(), "record for {seg_id}");
    }
}
