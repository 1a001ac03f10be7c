// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_pid_lines() {
    assert_eq!(parse_pid_lines("1234\n5678\n"), vec![1234, 5678]);
}

#[test]
fn dedupes_and_sorts() {
    assert_eq!(parse_pid_lines("99\n7\n99\n"), vec![7, 99]);
}

#[test]
fn ignores_garbage_lines() {
    assert_eq!(parse_pid_lines("1234\nCOMMAND\n\n 42 \n"), vec![42, 1234]);
}

#[test]
fn empty_output_is_empty() {
    assert!(parse_pid_lines("").is_empty());
}

#[tokio::test]
async fn cleanup_of_free_port_reports_nothing() {
    // Port 1 is privileged and never has a dev server listening.
    let killed = cleanup_port(1).await.unwrap();
    assert!(killed.is_empty());
}
