// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn runs_command_within_timeout() {
    let mut cmd = Command::new("echo");
    cmd.arg("hi");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hi\n");
}

#[tokio::test]
async fn timeout_produces_descriptive_error() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleep test")
        .await
        .unwrap_err();
    assert!(err.contains("sleep test"), "unexpected error: {err}");
    assert!(err.contains("timed out"));
}

#[tokio::test]
async fn missing_binary_is_an_error() {
    let cmd = Command::new("/no/such/binary");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing")
        .await
        .unwrap_err();
    assert!(err.contains("failed"));
}

#[tokio::test]
async fn signal_to_dead_pid_reports_failure() {
    // PID 4194304 is above the default pid_max.
    assert!(!send_signal("-TERM", "4194304").await);
}
