// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RUN and PROC.OUTPUT behavior through the real binaries.

use super::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn fg_raw_run_returns_output_and_exit_code() {
    let sandbox = Sandbox::new();

    let out = sandbox.spot_ok(&[
        "run", "--id", "pf", "--raw", "--wait", "--", "printf", "a\\nB\\nc\\n",
    ]);
    assert_eq!(out, "a\nB\nc\n");
}

#[test]
#[serial]
fn output_filter_grep_invert() {
    let sandbox = Sandbox::new();

    sandbox.spot_ok(&[
        "run", "--id", "pf", "--raw", "--wait", "--", "printf", "a\\nB\\nc\\n",
    ]);

    let out = sandbox.spot_ok(&[
        "proc", "output", "pf", "--stream", "stdout", "--grep", "B", "-v",
    ]);
    assert_eq!(out, "a\nc\n");
}

#[test]
#[serial]
fn failing_run_propagates_exit_code() {
    let sandbox = Sandbox::new();

    let out = sandbox.spot(&["run", "--raw", "--wait", "--", "sh", "-c", "exit 7"]);
    assert_eq!(out.status.code(), Some(7));
}

#[test]
#[serial]
fn background_run_is_listed_and_stoppable() {
    let sandbox = Sandbox::new();

    sandbox.spot_ok(&["run", "--id", "srv", "--raw", "--", "sleep", "30"]);

    let out = sandbox.spot_ok(&["proc", "list", "--state", "running"]);
    assert!(out.contains("srv"), "listing: {out}");

    let out = sandbox.spot_ok(&["proc", "stop", "srv", "--force"]);
    assert!(out.contains("stopped") || out.contains("failed"), "{out}");

    let out = sandbox.spot_ok(&["proc", "status", "srv"]);
    assert!(!out.contains("running"));
}

#[test]
#[serial]
fn unknown_process_errors_with_not_found() {
    let sandbox = Sandbox::new();
    sandbox.spot_ok(&["ping"]);

    let out = sandbox.spot(&["proc", "status", "ghost"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not-found"), "stderr: {stderr}");
}
