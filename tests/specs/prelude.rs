// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL for running the `spot` CLI against a daemon
//! confined to a per-test state directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};

// Aggressive timeouts for fast tests.
const SPOT_TIMEOUT_CONNECT_MS: &str = "3000";
const SPOT_TIMEOUT_EXIT_MS: &str = "500";
const SPOT_TIMEOUT_IPC_MS: &str = "2000";
const SPOT_CONNECT_POLL_MS: &str = "5";

/// Returns the path to a binary next to the test binary's target dir.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // Fallback: resolve relative to the test binary itself. The test
    // binary lives at target/debug/deps/specs-<hash>, so its
    // grandparent is target/debug/ where spot and spotd are built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

pub fn spot_binary() -> PathBuf {
    binary_path("spot")
}

pub fn spotd_binary() -> PathBuf {
    binary_path("spotd")
}

/// A sandboxed spot environment: its own state dir, its own daemon.
pub struct Sandbox {
    _dir: tempfile::TempDir,
    pub state_dir: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create sandbox dir");
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&state_dir).expect("create state dir");
        Self {
            _dir: dir,
            state_dir,
        }
    }

    /// Run `spot` with the sandbox environment and wait for it.
    pub fn spot(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(spot_binary());
        cmd.args(args)
            .env("SPOT_STATE_DIR", &self.state_dir)
            .env("SPOT_DAEMON_BINARY", spotd_binary())
            .env("SPOT_TIMEOUT_CONNECT_MS", SPOT_TIMEOUT_CONNECT_MS)
            .env("SPOT_TIMEOUT_EXIT_MS", SPOT_TIMEOUT_EXIT_MS)
            .env("SPOT_TIMEOUT_IPC_MS", SPOT_TIMEOUT_IPC_MS)
            .env("SPOT_CONNECT_POLL_MS", SPOT_CONNECT_POLL_MS)
            .env_remove("SPOT_SOCKET")
            .env_remove("XDG_RUNTIME_DIR");
        cmd.output().expect("run spot")
    }

    /// Run `spot` and require exit code 0, returning stdout.
    pub fn spot_ok(&self, args: &[&str]) -> String {
        let output = self.spot(args);
        assert!(
            output.status.success(),
            "spot {:?} failed\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("daemon.sock")
    }

    pub fn daemon_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.state_dir.join("daemon.pid"))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Wait until the daemon process for this sandbox is gone.
    pub fn wait_for_daemon_exit(&self) {
        let Some(pid) = self.daemon_pid() else { return };
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let alive = Command::new("kill")
                .args(["-0", &pid.to_string()])
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !alive {
                return;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        // Best-effort daemon teardown so test dirs can be removed.
        let _ = self.spot(&["daemon", "stop"]);
        if let Some(pid) = self.daemon_pid() {
            let _ = Command::new("kill").args(["-9", &pid.to_string()]).status();
        }
    }
}
