// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser control channel.
//!
//! Each instrumented tab opens a WebSocket back to the proxy at the
//! reserved path. Inbound frames carry telemetry (errors, performance,
//! custom events, screenshots, interactions, mutations), heartbeats,
//! and exec responses. Outbound frames carry exec requests and toasts.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use spot_core::{TelemetryKind, TrafficEntry};
use tokio::sync::mpsc;
use tracing::debug;

use crate::exec::ExecReply;
use crate::registry::ProxyHandle;

/// Reserved path for the control WebSocket.
pub const CONTROL_PATH: &str = "/__spot/metrics";

/// Payload fanned out by `PROXY.TOAST`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToastPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Fan a toast out to every connected tab; returns how many got it.
pub fn send_toast(handle: &ProxyHandle, toast: &ToastPayload) -> usize {
    let message = serde_json::json!({
        "type": "toast",
        "level": toast.level,
        "title": toast.title,
        "message": toast.message,
        "duration_ms": toast.duration_ms,
    });
    handle.broadcast(&message.to_string())
}

/// Upgrade handler mounted at [`CONTROL_PATH`].
pub async fn ws_handler(
    State(handle): State<Arc<ProxyHandle>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| client_loop(handle, socket))
}

async fn client_loop(handle: Arc<ProxyHandle>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client_id = handle.add_client(tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    let mut shutdown = handle.shutdown_rx();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&handle, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(proxy = %handle.id, client = client_id, error = %e, "ws read error");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    handle.remove_client(client_id);
    writer.abort();
}

/// Dispatch one inbound control frame.
fn handle_frame(handle: &ProxyHandle, text: &str) {
    let msg: serde_json::Value = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(proxy = %handle.id, error = %e, "unparseable control frame");
            return;
        }
    };
    let tab_id = msg.get("tab_id").and_then(|v| v.as_str());
    let url = msg.get("url").and_then(|v| v.as_str());
    let now = Utc::now();

    match msg.get("type").and_then(|v| v.as_str()) {
        Some("error") => {
            handle.record(TrafficEntry::Error {
                message: str_field(&msg, "message").unwrap_or_else(|| "(no message)".into()),
                source: str_field(&msg, "source"),
                line: u32_field(&msg, "line"),
                column: u32_field(&msg, "column"),
                stack: str_field(&msg, "stack"),
                url: url.map(str::to_string),
                user_agent: str_field(&msg, "user_agent"),
                timestamp: now,
            });
            handle.page_event(TelemetryKind::Error, tab_id, url, msg.clone());
        }
        Some("performance") => {
            handle.record(TrafficEntry::Performance {
                url: url.unwrap_or_default().to_string(),
                navigation: msg.get("navigation").cloned().unwrap_or_default(),
                paint: msg.get("paint").cloned().unwrap_or_default(),
                resources: msg
                    .get("resources")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default(),
                timestamp: now,
            });
            handle.page_event(TelemetryKind::Performance, tab_id, url, msg.clone());
        }
        Some("custom") => {
            handle.record(TrafficEntry::Custom {
                level: str_field(&msg, "level").unwrap_or_else(|| "info".into()),
                message: str_field(&msg, "message").unwrap_or_default(),
                data: msg.get("data").cloned().unwrap_or_default(),
                timestamp: now,
            });
        }
        Some("screenshot") => {
            handle.record(TrafficEntry::Screenshot {
                name: str_field(&msg, "name").unwrap_or_else(|| "screenshot".into()),
                data: str_field(&msg, "data").unwrap_or_default(),
                width: u32_field(&msg, "width"),
                height: u32_field(&msg, "height"),
                timestamp: now,
            });
        }
        Some("interaction") => {
            handle.page_event(TelemetryKind::Interaction, tab_id, url, msg.clone());
        }
        Some("mutation") => {
            handle.page_event(TelemetryKind::Mutation, tab_id, url, msg.clone());
        }
        Some("heartbeat") => {}
        Some("exec_response") => {
            let Some(request_id) = str_field(&msg, "request_id") else {
                return;
            };
            let reply = ExecReply {
                result: msg.get("result").cloned(),
                error: str_field(&msg, "error"),
            };
            if !handle.exec.complete(&request_id, reply) {
                // Duplicate or post-timeout reply; first one won.
                debug!(proxy = %handle.id, request_id, "ignoring late exec response");
            }
        }
        other => {
            debug!(proxy = %handle.id, kind = ?other, "unknown control frame type");
        }
    }
}

fn str_field(msg: &serde_json::Value, key: &str) -> Option<String> {
    msg.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn u32_field(msg: &serde_json::Value, key: &str) -> Option<u32> {
    msg.get(key).and_then(|v| v.as_u64()).map(|n| n as u32)
}
