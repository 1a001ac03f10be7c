// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of live interactive agent sessions.
//!
//! Sessions register a code plus an input pipe; `send` writes to that
//! pipe so the message lands in the session as if the user typed it.
//! Handles that stop heartbeating are reaped after three missed beats.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use spot_core::{Clock, ErrorCode, SessionInfo, SessionStatus, SystemClock, WireError, STALE_AFTER};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Fields accepted at registration time.
#[derive(Debug, Clone, Default)]
pub struct RegisterParams {
    pub project_path: Option<PathBuf>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub overlay_endpoint: Option<String>,
    pub input_pipe: Option<PathBuf>,
}

/// Shared session registry.
pub struct SessionRegistry<C: Clock = SystemClock> {
    sessions: RwLock<HashMap<String, SessionInfo>>,
    /// Daemon-wide overlay endpoint set via OVERLAY.SET.
    overlay: Mutex<Option<String>>,
    clock: C,
}

impl SessionRegistry<SystemClock> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_clock(SystemClock))
    }
}

impl Default for SessionRegistry<SystemClock> {
    fn default() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> SessionRegistry<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            overlay: Mutex::new(None),
            clock,
        }
    }

    /// Register (or re-register after a daemon restart) a session.
    pub fn register(&self, code: &str, params: RegisterParams) -> SessionInfo {
        let now = self.clock.now();
        let info = SessionInfo {
            code: code.to_string(),
            project_path: params.project_path,
            command: params.command,
            args: params.args,
            overlay_endpoint: params.overlay_endpoint,
            input_pipe: params.input_pipe,
            started_at: now,
            last_seen_at: now,
            status: SessionStatus::Active,
        };
        self.sessions
            .write()
            .insert(code.to_string(), info.clone());
        info!(code, "session registered");
        info
    }

    pub fn unregister(&self, code: &str) -> Result<(), WireError> {
        match self.sessions.write().remove(code) {
            Some(_) => {
                info!(code, "session unregistered");
                Ok(())
            }
            None => Err(WireError::not_found(format!("session: {code}"))),
        }
    }

    pub fn heartbeat(&self, code: &str) -> Result<(), WireError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| WireError::not_found(format!("session: {code}")))?;
        session.last_seen_at = self.clock.now();
        session.status = SessionStatus::Active;
        Ok(())
    }

    /// Deliver a message to the session's input back-channel.
    pub async fn send(&self, code: &str, message: &str) -> Result<(), WireError> {
        let pipe = {
            let sessions = self.sessions.read();
            let session = sessions
                .get(code)
                .ok_or_else(|| WireError::not_found(format!("session: {code}")))?;
            session.input_pipe.clone().ok_or_else(|| {
                WireError::new(
                    ErrorCode::InvalidState,
                    format!("session {code} has no input pipe"),
                )
            })?
        };

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&pipe)
            .await
            .map_err(|e| {
                WireError::new(
                    ErrorCode::Internal,
                    format!("cannot open input pipe {}: {e}", pipe.display()),
                )
            })?;
        let mut payload = message.as_bytes().to_vec();
        if !message.ends_with('\n') {
            payload.push(b'\n');
        }
        file.write_all(&payload).await.map_err(|e| {
            WireError::new(
                ErrorCode::Internal,
                format!("write to input pipe failed: {e}"),
            )
        })?;
        debug!(code, bytes = payload.len(), "delivered session message");
        Ok(())
    }

    pub fn get(&self, code: &str) -> Result<SessionInfo, WireError> {
        self.sessions
            .read()
            .get(code)
            .cloned()
            .ok_or_else(|| WireError::not_found(format!("session: {code}")))
    }

    /// Sessions ordered by most recent heartbeat.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut rows: Vec<SessionInfo> = self.sessions.read().values().cloned().collect();
        rows.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        rows
    }

    /// Mark overdue sessions stale and drop the long-dead ones.
    /// Returns the codes that were reaped.
    pub fn reap_stale(&self) -> Vec<String> {
        let now = self.clock.now();
        let stale_after =
            chrono::Duration::from_std(STALE_AFTER).unwrap_or(chrono::Duration::seconds(90));
        let mut reaped = Vec::new();
        let mut sessions = self.sessions.write();
        sessions.retain(|code, session| {
            let overdue = now - session.last_seen_at;
            if overdue >= stale_after {
                warn!(code, "reaping stale session (missed heartbeats)");
                reaped.push(code.clone());
                false
            } else {
                if overdue >= stale_after / 3 {
                    session.status = SessionStatus::Stale;
                }
                true
            }
        });
        reaped
    }

    pub fn set_overlay(&self, endpoint: Option<String>) {
        *self.overlay.lock() = endpoint;
    }

    pub fn overlay(&self) -> Option<String> {
        self.overlay.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
