// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    pending_starting = { ProcessState::Pending, ProcessState::Starting },
    starting_running = { ProcessState::Starting, ProcessState::Running },
    starting_failed = { ProcessState::Starting, ProcessState::Failed },
    running_stopping = { ProcessState::Running, ProcessState::Stopping },
    running_stopped = { ProcessState::Running, ProcessState::Stopped },
    running_failed = { ProcessState::Running, ProcessState::Failed },
    stopping_stopped = { ProcessState::Stopping, ProcessState::Stopped },
    stopping_failed = { ProcessState::Stopping, ProcessState::Failed },
)]
fn legal_transitions(from: ProcessState, to: ProcessState) {
    let cell = StateCell::new(from);
    cell.transition(from, to).unwrap();
    assert_eq!(cell.load(), to);
}

#[parameterized(
    pending_running = { ProcessState::Pending, ProcessState::Running },
    stopped_running = { ProcessState::Stopped, ProcessState::Running },
    failed_stopping = { ProcessState::Failed, ProcessState::Stopping },
    running_starting = { ProcessState::Running, ProcessState::Starting },
)]
fn illegal_transitions_fail(from: ProcessState, to: ProcessState) {
    let cell = StateCell::new(from);
    let err = cell.transition(from, to).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidState);
    assert_eq!(cell.load(), from);
}

#[test]
fn cas_detects_stale_expectation() {
    let cell = StateCell::new(ProcessState::Running);
    // Another actor already stopped it.
    cell.transition(ProcessState::Running, ProcessState::Stopping)
        .unwrap();
    let err = cell
        .transition(ProcessState::Running, ProcessState::Stopping)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidState);
}

#[test]
fn transition_any_picks_current_state() {
    let cell = StateCell::new(ProcessState::Stopping);
    let prior = cell.transition_any(
        &[ProcessState::Running, ProcessState::Stopping],
        ProcessState::Stopped,
    );
    assert_eq!(prior, Some(ProcessState::Stopping));
    assert_eq!(cell.load(), ProcessState::Stopped);
}

#[test]
fn transition_any_fails_on_terminal() {
    let cell = StateCell::new(ProcessState::Stopped);
    let prior = cell.transition_any(
        &[ProcessState::Running, ProcessState::Stopping],
        ProcessState::Failed,
    );
    assert_eq!(prior, None);
    assert_eq!(cell.load(), ProcessState::Stopped);
}

#[test]
fn terminal_states() {
    assert!(ProcessState::Stopped.is_terminal());
    assert!(ProcessState::Failed.is_terminal());
    assert!(!ProcessState::Running.is_terminal());
    assert!(!ProcessState::Pending.is_terminal());
}

#[test]
fn state_serde_uses_snake_case() {
    let json = serde_json::to_string(&ProcessState::Running).unwrap();
    assert_eq!(json, "\"running\"");
}
