// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: autostart, ping, zombie cleanup, shutdown.

use super::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn ping_autostarts_and_reuses_the_daemon() {
    let sandbox = Sandbox::new();

    // No daemon is running: the first ping spawns one.
    let out = sandbox.spot_ok(&["ping"]);
    assert_eq!(out.trim(), "ok");
    assert!(sandbox.socket_path().exists());
    let first_pid = sandbox.daemon_pid().expect("daemon pid recorded");

    // A second ping must reuse the same daemon.
    sandbox.spot_ok(&["ping"]);
    assert_eq!(sandbox.daemon_pid(), Some(first_pid));
}

#[test]
#[serial]
fn daemon_status_reports_both_states() {
    let sandbox = Sandbox::new();

    let out = sandbox.spot(&["daemon", "status"]);
    assert_eq!(out.status.code(), Some(2), "not-running exit code");

    sandbox.spot_ok(&["ping"]);
    let out = sandbox.spot_ok(&["daemon", "status"]);
    assert!(out.starts_with("running"));
}

#[test]
#[serial]
fn stop_removes_the_socket_within_deadline() {
    let sandbox = Sandbox::new();
    sandbox.spot_ok(&["ping"]);
    assert!(sandbox.socket_path().exists());

    let started = std::time::Instant::now();
    sandbox.spot_ok(&["daemon", "stop"]);
    sandbox.wait_for_daemon_exit();
    assert!(started.elapsed() < std::time::Duration::from_secs(6));
    assert!(!sandbox.socket_path().exists());
}

#[test]
#[serial]
fn stale_socket_is_cleaned_up_on_next_connect() {
    let sandbox = Sandbox::new();

    // Fabricate a zombie: socket + pid file with no daemon behind them.
    std::fs::write(sandbox.socket_path(), b"").unwrap();
    std::fs::write(sandbox.state_dir.join("daemon.pid"), b"4194304").unwrap();

    let out = sandbox.spot_ok(&["ping"]);
    assert_eq!(out.trim(), "ok");
    let pid = sandbox.daemon_pid().expect("fresh daemon pid");
    assert_ne!(pid, 4_194_304);
}

#[test]
#[serial]
fn second_daemon_start_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox.spot_ok(&["daemon", "start"]);

    let out = sandbox.spot(&["daemon", "start"]);
    assert_eq!(out.status.code(), Some(3), "already-running exit code");
}

#[test]
#[serial]
fn info_shows_version_and_counts() {
    let sandbox = Sandbox::new();
    sandbox.spot_ok(&["ping"]);

    let out = sandbox.spot_ok(&["daemon", "info"]);
    assert!(out.contains("version:"));
    assert!(out.contains("processes:     0"));
    assert!(out.contains("proxies:       0"));
}
