// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI crate.

use std::path::PathBuf;

/// Resolve state directory: SPOT_STATE_DIR > XDG_STATE_HOME/spot > ~/.local/state/spot
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SPOT_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("spot"));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local/state/spot"))
}

/// Socket path override shared with the daemon.
pub fn socket_override() -> Option<PathBuf> {
    std::env::var("SPOT_SOCKET").ok().map(PathBuf::from)
}

/// Daemon binary override (used by tests and packaging).
pub fn daemon_binary() -> Option<String> {
    std::env::var("SPOT_DAEMON_BINARY").ok()
}
