// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process management utilities.
//!
//! Functions for starting, stopping, and probing the spotd process,
//! including zombie-socket cleanup: a socket file whose daemon no
//! longer exists is removed so a fresh daemon can bind.

use crate::client::ClientError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// Start the daemon in the background, returning the child process handle
pub fn start_daemon_background() -> Result<std::process::Child, ClientError> {
    let spotd_path = find_spotd_binary()?;

    Command::new(&spotd_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Stop the daemon synchronously using SIGTERM + polling.
pub fn stop_daemon_sync() -> bool {
    let Ok(Some(pid)) = read_daemon_pid() else {
        return false;
    };

    kill_signal("-15", pid);
    let timeout = crate::client::timeout_exit();
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    if process_exists(pid) {
        kill_signal("-9", pid);
        let start = Instant::now();
        while start.elapsed() < timeout {
            if !process_exists(pid) {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    if let Some(dir) = daemon_dir() {
        cleanup_stale_pid(&dir);
    }
    true
}

/// Find the spotd binary: explicit override, then a sibling of the
/// current executable, then PATH.
fn find_spotd_binary() -> Result<PathBuf, ClientError> {
    if let Some(path) = crate::env::daemon_binary() {
        return Ok(PathBuf::from(path));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("spotd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    Ok(PathBuf::from("spotd"))
}

/// Get the socket path for the user-level daemon.
///
/// Must mirror the daemon's own resolution so both sides meet at the
/// same path: SPOT_SOCKET > $XDG_RUNTIME_DIR/spot.sock > state dir.
pub fn daemon_socket() -> Result<PathBuf, ClientError> {
    if let Some(path) = crate::env::socket_override() {
        return Ok(path);
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime).join("spot.sock"));
    }
    let dir = daemon_dir().ok_or(ClientError::NoStateDir)?;
    Ok(dir.join("daemon.sock"))
}

/// Get the state directory for spot (user-level daemon).
pub fn daemon_dir() -> Option<PathBuf> {
    crate::env::state_dir()
}

/// Clean up orphaned PID file during shutdown.
pub fn cleanup_stale_pid(dir: &Path) {
    let pid_path = dir.join("daemon.pid");
    if pid_path.exists() {
        let _ = std::fs::remove_file(&pid_path);
    }
}

/// Get the PID from the daemon PID file, if it exists
pub fn read_daemon_pid() -> Result<Option<u32>, ClientError> {
    let dir = daemon_dir().ok_or(ClientError::NoStateDir)?;
    let pid_path = dir.join("daemon.pid");

    if !pid_path.exists() {
        return Ok(None);
    }

    match std::fs::read_to_string(&pid_path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(_) => Ok(None),
    }
}

/// Execute kill command with the given signal and PID
fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a process with the given PID exists
pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

/// Startup marker prefix that spotd writes to its log before anything else.
const STARTUP_MARKER_PREFIX: &str = "--- spotd: starting (pid: ";

/// Read daemon log from startup marker, looking for errors.
pub fn read_startup_error() -> Option<String> {
    let dir = daemon_dir()?;
    let log_path = dir.join("daemon.log");

    let content = std::fs::read_to_string(&log_path).ok()?;
    parse_startup_error(&content)
}

/// Parse startup errors from log content (pure logic, no I/O).
fn parse_startup_error(content: &str) -> Option<String> {
    let start_pos = content.rfind(STARTUP_MARKER_PREFIX)?;
    let startup_log = &content[start_pos..];

    let errors: Vec<&str> = startup_log
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .collect();

    if errors.is_empty() {
        return None;
    }

    let error_messages: Vec<String> = errors
        .iter()
        .filter_map(|line| line.split_once(": ").map(|(_, msg)| msg.to_string()))
        .collect();

    if error_messages.is_empty() {
        Some(errors.join("\n"))
    } else {
        Some(error_messages.join("\n"))
    }
}

/// Wrap an error with startup log info if available.
pub fn wrap_with_startup_error(err: ClientError) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }

    if let Some(startup_error) = read_startup_error() {
        ClientError::DaemonStartFailed(startup_error)
    } else {
        err
    }
}

/// Probe whether a Unix socket is accepting connections.
pub fn probe_socket(socket_path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Remove stale socket and PID files when the daemon is not running.
///
/// Called when the socket file exists but we can't connect to it — the
/// "zombie daemon" case. Files are removed only when the PID file
/// points at a dead process (or is missing/garbled).
pub fn cleanup_stale_socket(socket_path: &Path) -> Result<(), ClientError> {
    let Some(dir) = daemon_dir() else {
        return Ok(());
    };
    let pid_path = dir.join("daemon.pid");

    if pid_path.exists() {
        if let Ok(Some(pid)) = read_daemon_pid() {
            if !process_exists(pid) {
                let _ = std::fs::remove_file(socket_path);
                let _ = std::fs::remove_file(&pid_path);
            }
        } else {
            // PID file exists but holds no valid PID - remove stale files
            let _ = std::fs::remove_file(socket_path);
            let _ = std::fs::remove_file(&pid_path);
        }
    } else {
        // No PID file but socket exists - remove stale socket
        let _ = std::fs::remove_file(socket_path);
    }

    Ok(())
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
