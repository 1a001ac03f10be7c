// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive agent-session records.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Expected heartbeat cadence from registered sessions.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A session missing heartbeats for this long is reaped (3 intervals).
pub const STALE_AFTER: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stale,
}

/// A live interactive session registered with the daemon.
///
/// `input_pipe` is the back-channel: bytes written there appear in the
/// session as if the user typed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_pipe: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: SessionStatus,
}
