// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    stdout = { "stdout", StreamSelect::Stdout },
    stderr = { "stderr", StreamSelect::Stderr },
    combined = { "combined", StreamSelect::Combined },
)]
fn streams_parse(input: &str, expected: StreamSelect) {
    assert_eq!(parse_stream(input).unwrap(), expected);
}

#[test]
fn unknown_stream_is_rejected() {
    assert!(parse_stream("both").is_err());
}

#[parameterized(
    running = { "running", ProcessState::Running },
    failed = { "failed", ProcessState::Failed },
    stopped = { "stopped", ProcessState::Stopped },
)]
fn states_parse(input: &str, expected: ProcessState) {
    assert_eq!(parse_state(input).unwrap(), expected);
}

#[test]
fn unknown_state_is_rejected() {
    assert!(parse_state("zombie").is_err());
}
