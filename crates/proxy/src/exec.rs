// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec correlation bus.
//!
//! Each remote-JS execution is a future keyed on its request id: the
//! waiter registers a oneshot, the broadcast goes out, and the first
//! browser reply completes it. Duplicates and late replies find no
//! waiter and are dropped. Waiters are removed on timeout and cancel,
//! so a disconnecting client cannot leak one.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// A browser's answer to an exec request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// request_id → waiter map.
#[derive(Default)]
pub struct ExecBus {
    waiters: Mutex<HashMap<String, oneshot::Sender<ExecReply>>>,
}

impl ExecBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for a request id.
    pub fn register(&self, request_id: &str) -> oneshot::Receiver<ExecReply> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(request_id.to_string(), tx);
        rx
    }

    /// Complete a request with the first reply; later replies return false.
    pub fn complete(&self, request_id: &str, reply: ExecReply) -> bool {
        match self.waiters.lock().remove(request_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter (timeout or cancellation).
    pub fn cancel(&self, request_id: &str) {
        self.waiters.lock().remove(request_id);
    }

    /// Unblock every outstanding waiter (shutdown path).
    pub fn cancel_all(&self) {
        self.waiters.lock().clear();
    }

    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
