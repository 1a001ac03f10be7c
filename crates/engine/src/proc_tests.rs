// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use spot_core::ProcessMode;
use std::collections::HashMap;

fn spec(id: &str, command: &str, args: &[&str]) -> ProcessSpec {
    ProcessSpec {
        id: id.to_string(),
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        cwd: None,
        env: HashMap::new(),
        mode: ProcessMode::Background,
        raw: true,
        project_path: None,
    }
}

fn manager() -> ProcessManager {
    ProcessManager::new(ProcConfig {
        graceful_timeout: Duration::from_millis(500),
        ring_capacity: 64 * 1024,
    })
}

#[tokio::test]
async fn run_to_completion_captures_output() {
    let mgr = manager();
    mgr.start(spec("p1", "printf", &["a\\nB\\nc\\n"])).await.unwrap();
    let status = mgr.wait_exit("p1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert_eq!(status.exit_code, Some(0));

    let out = mgr
        .output(
            "p1",
            &OutputFilter {
                stream: StreamSelect::Stdout,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(out.text, "a\nB\nc\n");
    assert!(!out.truncated);
    assert_eq!(out.dropped, 0);
}

#[tokio::test]
async fn grep_invert_filters_output() {
    let mgr = manager();
    mgr.start(spec("p1", "printf", &["a\\nB\\nc\\n"])).await.unwrap();
    mgr.wait_exit("p1", Duration::from_secs(5)).await.unwrap();

    let out = mgr
        .output(
            "p1",
            &OutputFilter {
                stream: StreamSelect::Stdout,
                grep: Some("B".to_string()),
                invert: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(out.text, "a\nc\n");
}

#[tokio::test]
async fn combined_interleaves_streams() {
    let mgr = manager();
    // stdout then stderr then stdout, serialized by the shell.
    mgr.start(spec(
        "p1",
        "sh",
        &["-c", "echo out1; echo err1 >&2; sleep 0.05; echo out2"],
    ))
    .await
    .unwrap();
    mgr.wait_exit("p1", Duration::from_secs(5)).await.unwrap();

    let combined = mgr
        .output("p1", &OutputFilter::default())
        .unwrap()
        .text;
    let out1 = combined.find("out1").unwrap();
    let err1 = combined.find("err1").unwrap();
    let out2 = combined.find("out2").unwrap();
    // The sleep separates the writes enough that arrival order holds.
    assert!(out1 < out2);
    assert!(err1 < out2, "stderr chunk should interleave: {combined:?}");
}

#[tokio::test]
async fn nonzero_exit_is_failed() {
    let mgr = manager();
    mgr.start(spec("p1", "sh", &["-c", "exit 3"])).await.unwrap();
    let status = mgr.wait_exit("p1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.state, ProcessState::Failed);
    assert_eq!(status.exit_code, Some(3));
}

#[tokio::test]
async fn spawn_failure_is_failed_with_error() {
    let mgr = manager();
    let err = mgr
        .start(spec("p1", "/no/such/binary-here", &[]))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SpawnFailed);
    let status = mgr.get("p1").unwrap().status();
    assert_eq!(status.state, ProcessState::Failed);
}

#[tokio::test]
async fn duplicate_id_rejected() {
    let mgr = manager();
    mgr.start(spec("p1", "sleep", &["5"])).await.unwrap();
    let err = mgr.start(spec("p1", "sleep", &["5"])).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyExists);
    mgr.stop("p1", true).await.unwrap();
}

#[tokio::test]
async fn graceful_stop_of_cooperative_child() {
    let mgr = manager();
    mgr.start(spec("p1", "sleep", &["30"])).await.unwrap();
    let status = mgr.stop("p1", false).await.unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert!(status.exit_code.is_some());
}

#[tokio::test]
async fn stop_escalates_to_kill_for_term_ignorer() {
    let mgr = manager();
    // The trap makes the shell ignore TERM and respawn its sleeps;
    // only KILL ends it.
    mgr.start(spec("p1", "sh", &["-c", "trap '' TERM; while :; do sleep 1; done"]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let status = mgr.stop("p1", false).await.unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    // Must have waited out the 500ms graceful window, then killed.
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn stop_non_running_is_invalid_state() {
    let mgr = manager();
    mgr.start(spec("p1", "true", &[])).await.unwrap();
    mgr.wait_exit("p1", Duration::from_secs(5)).await.unwrap();
    let err = mgr.stop("p1", false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidState);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let mgr = manager();
    let err = mgr.output("nope", &OutputFilter::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn list_filters_by_state() {
    let mgr = manager();
    mgr.start(spec("running", "sleep", &["30"])).await.unwrap();
    mgr.start(spec("done", "true", &[])).await.unwrap();
    mgr.wait_exit("done", Duration::from_secs(5)).await.unwrap();

    let running = mgr.list(Some(ProcessState::Running));
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, "running");
    assert_eq!(mgr.list(None).len(), 2);

    mgr.stop("running", true).await.unwrap();
}

#[tokio::test]
async fn stop_all_aggressive() {
    let mgr = manager();
    mgr.start(spec("a", "sleep", &["30"])).await.unwrap();
    mgr.start(spec("b", "sleep", &["30"])).await.unwrap();
    mgr.stop_all(true).await;
    assert_eq!(mgr.count_active(), 0);
}

#[tokio::test]
async fn pid_cleared_after_exit() {
    let mgr = manager();
    mgr.start(spec("p1", "true", &[])).await.unwrap();
    let status = mgr.wait_exit("p1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.pid, None);
    assert!(status.ended_at.is_some());
}
