// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for kill(1) invocations.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for port-scan commands (lsof).
pub const PORT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child
/// process is killed automatically if the timeout elapses (via the
/// tokio `Child` drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Send a signal to a process or (with a leading `-`) process group.
///
/// Shells out to kill(1) so no unsafe libc calls are needed; returns
/// whether the signal was accepted.
pub async fn send_signal(signal: &str, target: &str) -> bool {
    let mut cmd = Command::new("kill");
    cmd.arg(signal).arg("--").arg(target);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());
    match run_with_timeout(cmd, KILL_TIMEOUT, "kill").await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Signal an entire process group by its leader pid.
pub async fn signal_group(signal: &str, pgid: u32) -> bool {
    send_signal(signal, &format!("-{pgid}")).await
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
