// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port reclamation: find and kill whatever is listening on a port.
//!
//! A user-facing primitive for recovering ports left bound by crashed
//! dev servers. Enumeration shells out to lsof(1); the daemon never
//! parses /proc directly.

use spot_core::{ErrorCode, WireError};
use tokio::process::Command;
use tracing::info;

use crate::subprocess::{run_with_timeout, send_signal, PORT_SCAN_TIMEOUT};

/// Kill every process holding a listening socket on `port`.
///
/// Returns the PIDs that were signalled. An empty list means the port
/// was already free.
pub async fn cleanup_port(port: u16) -> Result<Vec<u32>, WireError> {
    let pids = listeners_on(port).await?;
    for &pid in &pids {
        send_signal("-KILL", &pid.to_string()).await;
        info!(port, pid, "killed port listener");
    }
    Ok(pids)
}

/// PIDs with a listening TCP socket on the port.
async fn listeners_on(port: u16) -> Result<Vec<u32>, WireError> {
    let mut cmd = Command::new("lsof");
    cmd.args(["-t", "-i", &format!("tcp:{port}"), "-s", "TCP:LISTEN"]);
    cmd.stdin(std::process::Stdio::null());

    let output = run_with_timeout(cmd, PORT_SCAN_TIMEOUT, "lsof")
        .await
        .map_err(|e| WireError::new(ErrorCode::Internal, e))?;

    // lsof exits 1 when nothing matches; that's a free port, not an error.
    if !output.status.success() && !output.stdout.is_empty() {
        return Err(WireError::new(
            ErrorCode::Internal,
            format!("lsof failed: {}", String::from_utf8_lossy(&output.stderr)),
        ));
    }

    Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_pid_lines(stdout: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
