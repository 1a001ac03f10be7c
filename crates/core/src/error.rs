// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error vocabulary propagated over the wire.
//!
//! Internal components return structured errors upward; the dispatch
//! boundary converts them into a [`WireError`] carrying one of these
//! codes so clients can branch without parsing message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes understood by every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidArgs,
    NotFound,
    AlreadyExists,
    InvalidState,
    Timeout,
    NoClients,
    PortInUse,
    SpawnFailed,
    UpstreamFailure,
    Busy,
    ShuttingDown,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgs => "invalid-args",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::InvalidState => "invalid-state",
            ErrorCode::Timeout => "timeout",
            ErrorCode::NoClients => "no-clients",
            ErrorCode::PortInUse => "port-in-use",
            ErrorCode::SpawnFailed => "spawn-failed",
            ErrorCode::UpstreamFailure => "upstream-failure",
            ErrorCode::Busy => "busy",
            ErrorCode::ShuttingDown => "shutting-down",
            ErrorCode::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// A coded error as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
}

impl WireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("unknown {what}"))
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgs, message)
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::Internal, message.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
