// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! The Listener runs in a spawned task, accepting connections and
//! handling each on its own task. A connection processes its requests
//! in order until the peer closes or goes idle; concurrent clients are
//! capped, and over-limit accepts are turned away with Busy.

mod procs;
mod proxies;
mod sessions;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use spot_core::ErrorCode;
use spot_engine::{ProcessManager, Scheduler, SessionRegistry};
use spot_proxy::ProxyManager;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::protocol::{
    self, Request, Response, ProtocolError, PROTOCOL_VERSION, WRITE_TIMEOUT,
};

/// Idle window before a quiet connection is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard cap on concurrently served clients.
const MAX_CLIENTS: usize = 100;

/// Shared daemon context for all request handlers.
pub(crate) struct ListenCtx {
    pub procs: Arc<ProcessManager>,
    pub proxies: Arc<ProxyManager>,
    pub sessions: Arc<SessionRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub start_time: Instant,
    pub socket_path: PathBuf,
    pub shutting_down: Arc<AtomicBool>,
    pub shutdown: Arc<Notify>,
}

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
    slots: Arc<Semaphore>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self {
            socket,
            ctx,
            slots: Arc::new(Semaphore::new(MAX_CLIENTS)),
        }
    }

    /// Run the accept loop until the task is aborted at shutdown.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
                        tokio::spawn(reject_busy(stream));
                        continue;
                    };
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let _slot = slot;
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                ProtocolError::Timeout => debug!("idle connection dropped"),
                                _ => error!("connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Turn away an over-limit client with a Busy error.
async fn reject_busy(stream: UnixStream) {
    let (_, mut writer) = stream.into_split();
    let response = Response::error(ErrorCode::Busy, "too many concurrent clients");
    if let Err(e) = protocol::write_response(&mut writer, &response, WRITE_TIMEOUT).await {
        debug!("failed to send busy rejection: {}", e);
    }
}

/// Serve one client: requests complete in order until EOF or idle.
async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let request = match protocol::read_request(&mut reader, IDLE_TIMEOUT).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        if matches!(request, Request::Ping | Request::Info) {
            debug!(request = ?request, "received query");
        } else {
            info!(request = ?request, "received request");
        }

        let response = handle_request(request, ctx).await;
        debug!("sending response: {:?}", response);
        protocol::write_response(&mut writer, &response, WRITE_TIMEOUT).await?;
    }
}

/// Handle a single request and return a response.
async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    if ctx.shutting_down.load(Ordering::SeqCst)
        && !matches!(request, Request::Ping | Request::Info | Request::Shutdown)
    {
        return Response::error(ErrorCode::ShuttingDown, "daemon is shutting down");
    }

    match request {
        Request::Ping => Response::Pong { ok: true },

        Request::Info => Response::Info {
            version: PROTOCOL_VERSION.to_string(),
            uptime_secs: ctx.start_time.elapsed().as_secs(),
            socket_path: ctx.socket_path.clone(),
            processes: ctx.procs.count_active(),
            proxies: ctx.proxies.count(),
            sessions: ctx.sessions.count(),
            tasks_pending: ctx.scheduler.count_pending(),
        },

        Request::Shutdown => {
            // Idempotent: repeated SHUTDOWNs just re-notify.
            warn!("shutdown requested via command");
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }

        Request::Run(params) => procs::handle_run(ctx, params).await,
        Request::ProcStatus { id } => procs::handle_status(ctx, &id),
        Request::ProcOutput { id, filter } => procs::handle_output(ctx, &id, &filter),
        Request::ProcStop { id, force } => procs::handle_stop(ctx, &id, force).await,
        Request::ProcList { state } => procs::handle_list(ctx, state),
        Request::ProcCleanupPort { port } => procs::handle_cleanup_port(port).await,

        Request::ProxyStart {
            id,
            target_url,
            config,
        } => proxies::handle_start(ctx, &id, &target_url, config).await,
        Request::ProxyStop { id } => proxies::handle_stop(ctx, &id),
        Request::ProxyStatus { id } => proxies::handle_status(ctx, &id),
        Request::ProxyList => Response::Proxies {
            proxies: ctx.proxies.list(),
        },
        Request::ProxyExec {
            id,
            code,
            timeout_ms,
        } => proxies::handle_exec(ctx, &id, &code, timeout_ms).await,
        Request::ProxyToast { id, toast } => proxies::handle_toast(ctx, &id, &toast),

        Request::ChaosAdd { proxy_id, rule } => proxies::handle_chaos_add(ctx, &proxy_id, rule),
        Request::ChaosList { proxy_id } => proxies::handle_chaos_list(ctx, &proxy_id),
        Request::ChaosClear { proxy_id } => proxies::handle_chaos_clear(ctx, &proxy_id),
        Request::ChaosApply { proxy_id, preset } => {
            proxies::handle_chaos_apply(ctx, &proxy_id, &preset)
        }

        Request::ProxylogQuery { proxy_id, query } => {
            proxies::handle_log_query(ctx, &proxy_id, &query)
        }
        Request::ProxylogStats { proxy_id } => proxies::handle_log_stats(ctx, &proxy_id),
        Request::ProxylogClear { proxy_id } => proxies::handle_log_clear(ctx, &proxy_id),

        Request::PageList { proxy_id } => proxies::handle_page_list(ctx, &proxy_id),
        Request::PageGet {
            proxy_id,
            session_id,
        } => proxies::handle_page_get(ctx, &proxy_id, &session_id),
        Request::PageClear { proxy_id } => proxies::handle_page_clear(ctx, &proxy_id),

        Request::SessionRegister {
            code,
            project_path,
            command,
            args,
            overlay_endpoint,
            input_pipe,
        } => sessions::handle_register(
            ctx,
            &code,
            sessions::RegisterFields {
                project_path,
                command,
                args,
                overlay_endpoint,
                input_pipe,
            },
        ),
        Request::SessionUnregister { code } => sessions::handle_unregister(ctx, &code),
        Request::SessionHeartbeat { code } => sessions::handle_heartbeat(ctx, &code),
        Request::SessionSend { code, message } => sessions::handle_send(ctx, &code, &message).await,
        Request::SessionSchedule {
            code,
            duration,
            message,
            project_path,
        } => sessions::handle_schedule(ctx, &code, &duration, &message, project_path),
        Request::SessionTasks { status, code } => sessions::handle_tasks(ctx, status, code),
        Request::SessionCancel { task_id } => sessions::handle_cancel(ctx, &task_id),
        Request::SessionList => Response::Sessions {
            sessions: ctx.sessions.list(),
        },
        Request::SessionGet { code } => sessions::handle_get(ctx, &code),

        Request::OverlaySet { endpoint } => {
            ctx.sessions.set_overlay(endpoint);
            Response::Ok
        }
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
