// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed-process domain types and the lifecycle state machine.
//!
//! State lives in one atomic integer; transitions are CAS so observers
//! never see a skipped state and illegal transitions fail loudly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, WireError};

/// Lifecycle states for a managed process.
///
/// ```text
/// Pending → Starting → Running → Stopping → Stopped
///              ↘ Failed    ↘ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    fn as_u8(self) -> u8 {
        match self {
            ProcessState::Pending => 0,
            ProcessState::Starting => 1,
            ProcessState::Running => 2,
            ProcessState::Stopping => 3,
            ProcessState::Stopped => 4,
            ProcessState::Failed => 5,
        }
    }

    fn from_u8(v: u8) -> ProcessState {
        match v {
            0 => ProcessState::Pending,
            1 => ProcessState::Starting,
            2 => ProcessState::Running,
            3 => ProcessState::Stopping,
            4 => ProcessState::Stopped,
            _ => ProcessState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed)
    }

    /// Legal direct successors.
    fn can_move_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Pending => "pending",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
            ProcessState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Atomic holder for a [`ProcessState`] with validated CAS transitions.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ProcessState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> ProcessState {
        ProcessState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move `from` → `to`; fails with `InvalidState` when the cell no
    /// longer holds `from` or the edge is not in the machine.
    pub fn transition(&self, from: ProcessState, to: ProcessState) -> Result<(), WireError> {
        if !from.can_move_to(to) {
            return Err(WireError::new(
                ErrorCode::InvalidState,
                format!("illegal transition {from} -> {to}"),
            ));
        }
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|actual| {
                WireError::new(
                    ErrorCode::InvalidState,
                    format!(
                        "expected state {from}, found {}",
                        ProcessState::from_u8(actual)
                    ),
                )
            })?;
        Ok(())
    }

    /// Transition from whatever legal predecessor currently holds.
    /// Used by the monitor when a child exits during Running or Stopping.
    pub fn transition_any(&self, from: &[ProcessState], to: ProcessState) -> Option<ProcessState> {
        for &state in from {
            if self.transition(state, to).is_ok() {
                return Some(state);
            }
        }
        None
    }
}

/// How a process is attached to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    #[default]
    Background,
    Foreground,
    ForegroundRaw,
}

/// Everything needed to spawn a managed process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub mode: ProcessMode,
    /// True when the command was given verbatim rather than resolved
    /// from a project script.
    #[serde(default)]
    pub raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
}

/// Wire-facing view of a process record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub state: ProcessState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub mode: ProcessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Bytes dropped from the output rings so far.
    #[serde(default)]
    pub output_dropped: u64,
}

#[cfg(test)]
#[path = "proc_tests.rs"]
mod tests;
