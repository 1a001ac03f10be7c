// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for `RUN` and the `PROC.*` verbs.

use std::path::Path;
use std::time::Duration;

use spot_core::{
    ErrorCode, OutputFilter, ProcessMode, ProcessSpec, ProcessState, StreamSelect, WireError,
};

use super::ListenCtx;
use crate::protocol::{Response, RunMode, RunParams};

/// Upper bound on how long a foreground-raw run may hold its
/// connection.
const FG_RAW_TIMEOUT: Duration = Duration::from_secs(600);

pub(super) async fn handle_run(ctx: &ListenCtx, params: RunParams) -> Response {
    let spec = match spec_from_params(&params) {
        Ok(spec) => spec,
        Err(e) => return e.into(),
    };
    let id = spec.id.clone();

    if let Err(e) = ctx.procs.start(spec).await {
        return e.into();
    }

    match params.mode {
        RunMode::Bg | RunMode::Fg => match ctx.procs.get(&id) {
            Ok(handle) => Response::ProcStarted {
                status: handle.status(),
            },
            Err(e) => e.into(),
        },
        RunMode::FgRaw => {
            let status = match ctx.procs.wait_exit(&id, FG_RAW_TIMEOUT).await {
                Ok(status) => status,
                Err(e) => return e.into(),
            };
            let stream_text = |stream| {
                ctx.procs
                    .output(
                        &id,
                        &OutputFilter {
                            stream,
                            ..Default::default()
                        },
                    )
                    .map(|out| out.text)
                    .unwrap_or_default()
            };
            Response::RunCompleted {
                status,
                stdout: stream_text(StreamSelect::Stdout),
                stderr: stream_text(StreamSelect::Stderr),
            }
        }
    }
}

/// Resolve RUN params into a spawnable spec: either a verbatim raw
/// command, or a package script run through the project's script
/// runner (pnpm/yarn/npm picked by lockfile).
fn spec_from_params(params: &RunParams) -> Result<ProcessSpec, WireError> {
    let id = params
        .id
        .clone()
        .unwrap_or_else(|| format!("proc-{}", &uuid::Uuid::new_v4().to_string()[..8]));

    let (command, args) = if params.raw {
        let command = params
            .command
            .clone()
            .ok_or_else(|| WireError::invalid_args("raw runs require a command"))?;
        (command, params.args.clone())
    } else {
        let script = params
            .script_name
            .clone()
            .ok_or_else(|| WireError::invalid_args("either script_name or raw command required"))?;
        let runner = params
            .path
            .as_deref()
            .map(script_runner)
            .unwrap_or("npm")
            .to_string();
        let mut args = vec!["run".to_string(), script];
        args.extend(params.args.clone());
        (runner, args)
    };

    Ok(ProcessSpec {
        id,
        command,
        args,
        cwd: params.path.clone(),
        env: params.env.clone(),
        mode: match params.mode {
            RunMode::Bg => ProcessMode::Background,
            RunMode::Fg => ProcessMode::Foreground,
            RunMode::FgRaw => ProcessMode::ForegroundRaw,
        },
        raw: params.raw,
        project_path: params.path.clone(),
    })
}

fn script_runner(project: &Path) -> &'static str {
    if project.join("pnpm-lock.yaml").exists() {
        "pnpm"
    } else if project.join("yarn.lock").exists() {
        "yarn"
    } else {
        "npm"
    }
}

pub(super) fn handle_status(ctx: &ListenCtx, id: &str) -> Response {
    match ctx.procs.get(id) {
        Ok(handle) => Response::Proc {
            status: handle.status(),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_output(ctx: &ListenCtx, id: &str, filter: &OutputFilter) -> Response {
    match ctx.procs.output(id, filter) {
        Ok(out) => Response::Output {
            text: out.text,
            dropped: out.dropped,
            truncated: out.truncated,
        },
        Err(e) => e.into(),
    }
}

pub(super) async fn handle_stop(ctx: &ListenCtx, id: &str, force: bool) -> Response {
    match ctx.procs.stop(id, force).await {
        Ok(status) => Response::Proc { status },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_list(ctx: &ListenCtx, state: Option<ProcessState>) -> Response {
    Response::Procs {
        procs: ctx.procs.list(state),
    }
}

pub(super) async fn handle_cleanup_port(port: u16) -> Response {
    if port == 0 {
        return Response::error(ErrorCode::InvalidArgs, "port must be nonzero");
    }
    match spot_engine::cleanup_port(port).await {
        Ok(killed) => Response::PortCleaned { port, killed },
        Err(e) => e.into(),
    }
}
