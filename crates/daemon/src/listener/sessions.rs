// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for the `SESSION.*` verbs.

use std::path::PathBuf;

use spot_core::{TaskStatus, WireError};
use spot_engine::sessions::RegisterParams;
use spot_engine::TaskFilter;

use super::ListenCtx;
use crate::protocol::Response;

/// Register-time fields carried by `SESSION.REGISTER`.
pub(super) struct RegisterFields {
    pub project_path: Option<PathBuf>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub overlay_endpoint: Option<String>,
    pub input_pipe: Option<PathBuf>,
}

pub(super) fn handle_register(ctx: &ListenCtx, code: &str, fields: RegisterFields) -> Response {
    if code.is_empty() {
        return WireError::invalid_args("session code must not be empty").into();
    }
    let session = ctx.sessions.register(
        code,
        RegisterParams {
            project_path: fields.project_path,
            command: fields.command,
            args: fields.args,
            overlay_endpoint: fields.overlay_endpoint,
            input_pipe: fields.input_pipe,
        },
    );
    Response::Session { session }
}

pub(super) fn handle_unregister(ctx: &ListenCtx, code: &str) -> Response {
    match ctx.sessions.unregister(code) {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}

pub(super) fn handle_heartbeat(ctx: &ListenCtx, code: &str) -> Response {
    match ctx.sessions.heartbeat(code) {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}

pub(super) async fn handle_send(ctx: &ListenCtx, code: &str, message: &str) -> Response {
    match ctx.sessions.send(code, message).await {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}

pub(super) fn handle_schedule(
    ctx: &ListenCtx,
    code: &str,
    duration: &str,
    message: &str,
    project_path: Option<PathBuf>,
) -> Response {
    let Some(delay) = spot_core::time::parse_duration(duration) else {
        return WireError::invalid_args(format!("bad duration: {duration}")).into();
    };
    match ctx.scheduler.schedule(code, delay, message, project_path) {
        Ok(task) => Response::TaskScheduled { task },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_tasks(
    ctx: &ListenCtx,
    status: Option<String>,
    code: Option<String>,
) -> Response {
    let status = match status.as_deref() {
        None => None,
        Some("pending") => Some(TaskStatus::Pending),
        Some("delivered") => Some(TaskStatus::Delivered),
        Some("failed") => Some(TaskStatus::Failed),
        Some("cancelled") => Some(TaskStatus::Cancelled),
        Some(other) => {
            return WireError::invalid_args(format!("unknown task status: {other}")).into()
        }
    };
    Response::Tasks {
        tasks: ctx.scheduler.tasks(&TaskFilter {
            status,
            session_code: code,
        }),
    }
}

pub(super) fn handle_cancel(ctx: &ListenCtx, task_id: &str) -> Response {
    match ctx.scheduler.cancel(task_id) {
        Ok(task) => Response::Task { task },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_get(ctx: &ListenCtx, code: &str) -> Response {
    match ctx.sessions.get(code) {
        Ok(session) => Response::Session { session },
        Err(e) => e.into(),
    }
}
