// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use spot_core::{ProcessMode, ProcessState};

fn status(state: ProcessState, pid: Option<u32>, exit: Option<i32>) -> ProcessStatus {
    ProcessStatus {
        id: "dev-server".to_string(),
        command: "npm".to_string(),
        args: vec!["run".to_string(), "dev".to_string()],
        state,
        pid,
        exit_code: exit,
        mode: ProcessMode::Background,
        started_at: None,
        ended_at: None,
        output_dropped: 0,
    }
}

#[test]
fn running_row_shows_pid_and_command() {
    let row = proc_row(&status(ProcessState::Running, Some(4242), None));
    assert!(row.contains("dev-server"));
    assert!(row.contains("running"));
    assert!(row.contains("4242"));
    assert!(row.contains("npm run dev"));
}

#[test]
fn terminal_row_shows_exit_code() {
    let row = proc_row(&status(ProcessState::Failed, None, Some(3)));
    assert!(row.contains("failed"));
    assert!(row.contains("exit=3"));
    assert!(row.contains(" - "));
}

#[test]
fn json_line_unquotes_strings() {
    assert_eq!(json_line(&serde_json::json!("hi")), "hi");
    assert_eq!(json_line(&serde_json::json!(42)), "42");
    assert_eq!(json_line(&serde_json::json!({"a": 1})), "{\"a\":1}");
}
