// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: SPOT_STATE_DIR > XDG_STATE_HOME/spot > ~/.local/state/spot
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("SPOT_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("spot"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/spot"))
}

/// Socket path override (also honored by the CLI).
pub fn socket_override() -> Option<PathBuf> {
    std::env::var("SPOT_SOCKET").ok().map(PathBuf::from)
}

/// Default socket location: SPOT_SOCKET > $XDG_RUNTIME_DIR/spot.sock >
/// <state_dir>/daemon.sock
pub fn socket_path(state_dir: &std::path::Path) -> PathBuf {
    if let Some(path) = socket_override() {
        return path;
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("spot.sock");
    }
    state_dir.join("daemon.sock")
}

/// Page/session sweep interval override
pub fn sweep_interval() -> Duration {
    std::env::var("SPOT_SWEEP_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// Default traffic-log capacity override (entries per proxy)
pub fn traffic_cap() -> Option<usize> {
    std::env::var("SPOT_TRAFFIC_CAP")
        .ok()
        .and_then(|s| s.parse().ok())
}

/// Default body-excerpt cap override (bytes)
pub fn body_excerpt() -> Option<usize> {
    std::env::var("SPOT_BODY_EXCERPT_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
}

/// Shutdown deadline override
pub fn shutdown_deadline() -> Duration {
    std::env::var("SPOT_GRACEFUL_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}
