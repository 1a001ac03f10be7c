// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands.
//!
//! Typed wrappers over the verb surface, transparent retry with
//! bounded exponential backoff, and an on-reconnect hook so callers
//! (the overlay, long-lived sessions) can re-register after a daemon
//! restart. The auto-start paths probe the socket and clean up zombie
//! daemons before spawning a fresh one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spot_core::{
    ChaosRule, OutputFilter, PageSession, PageSummary, ProcessState, ProcessStatus, ScheduledTask,
    SessionInfo, TrafficEntry, TrafficStats, WireError,
};
use spot_daemon::protocol::{self, ProtocolError, Request, Response, RunParams, TrafficQuery};
use thiserror::Error;
use tokio::net::UnixStream;

use crate::daemon_process::{
    cleanup_stale_socket, daemon_socket, probe_socket, read_startup_error,
    start_daemon_background, wrap_with_startup_error,
};

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for IPC requests
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("SPOT_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for daemon to start
pub fn timeout_connect() -> Duration {
    parse_duration_ms("SPOT_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for a process to exit
pub fn timeout_exit() -> Duration {
    parse_duration_ms("SPOT_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

/// Polling interval for connection retries
pub fn poll_interval() -> Duration {
    parse_duration_ms("SPOT_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}

/// Retry budget for transient connection failures.
const RETRY_ATTEMPTS: u32 = 4;
const RETRY_BASE: Duration = Duration::from_millis(100);
const RETRY_CAP: Duration = Duration::from_secs(2);

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("Connection timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Daemon(WireError),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine state directory")]
    NoStateDir,
}

/// Info payload returned by `INFO`.
#[derive(Debug)]
pub struct DaemonInfo {
    pub version: String,
    pub uptime_secs: u64,
    pub socket_path: PathBuf,
    pub processes: usize,
    pub proxies: usize,
    pub sessions: usize,
    pub tasks_pending: usize,
}

/// Filtered output returned by `PROC.OUTPUT`.
pub struct ProcOutput {
    pub text: String,
    pub dropped: u64,
    pub truncated: bool,
}

/// Daemon client
pub struct DaemonClient {
    socket_path: PathBuf,
    on_reconnect: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient")
            .field("socket_path", &self.socket_path)
            .finish()
    }
}

impl DaemonClient {
    /// For action commands - auto-start the daemon when absent.
    pub fn for_action() -> Result<Self, ClientError> {
        Self::connect_or_start()
    }

    /// For query commands - connect only, never start a daemon.
    pub fn for_query() -> Result<Self, ClientError> {
        Self::connect()
    }

    /// Install a hook that fires after the client has to reconnect,
    /// so callers can re-register sessions/overlays after a daemon
    /// restart.
    pub fn with_on_reconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Arc::new(hook));
        self
    }

    /// Connect to an existing daemon (no auto-start)
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = daemon_socket()?;

        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }

        Ok(Self {
            socket_path,
            on_reconnect: None,
        })
    }

    /// Connect to the daemon, auto-starting one when none answers.
    pub fn connect_or_start() -> Result<Self, ClientError> {
        match Self::connect() {
            Ok(client) => {
                // The socket file may outlive a crashed daemon; verify
                // it actually accepts connections before trusting it.
                if probe_socket(&client.socket_path) {
                    Ok(client)
                } else {
                    cleanup_stale_socket(&client.socket_path)?;
                    let child = start_daemon_background()?;
                    Self::connect_with_retry(timeout_connect(), child)
                }
            }
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background()?;
                Self::connect_with_retry(timeout_connect(), child)
            }
            Err(e) => Err(wrap_with_startup_error(e)),
        }
    }

    fn connect_with_retry(
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            // Check if daemon process exited early (startup failure)
            match child.try_wait() {
                Ok(Some(status)) => {
                    // Poll for the startup error in the log (the
                    // filesystem may need a moment to sync)
                    let poll_start = Instant::now();
                    while poll_start.elapsed() < timeout_exit() {
                        if let Some(err) = read_startup_error() {
                            return Err(ClientError::DaemonStartFailed(err));
                        }
                        std::thread::sleep(poll_interval());
                    }
                    return Err(ClientError::DaemonStartFailed(format!(
                        "exited with {status}"
                    )));
                }
                Ok(None) => {}
                Err(_) => {}
            }

            match Self::connect() {
                Ok(client) => {
                    if probe_socket(&client.socket_path) {
                        return Ok(client);
                    }
                    std::thread::sleep(poll_interval());
                }
                Err(ClientError::DaemonNotRunning) => {
                    std::thread::sleep(poll_interval());
                }
                Err(e) => return Err(wrap_with_startup_error(e)),
            }
        }

        Err(wrap_with_startup_error(ClientError::DaemonStartTimeout))
    }

    /// One request/response round trip over a fresh connection.
    async fn round_trip(&self, request: &Request, read_timeout: Duration) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(request)?;
        tokio::time::timeout(timeout_ipc(), protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes = tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        Ok(protocol::decode(&response_bytes)?)
    }

    /// Send a request, retrying transient connection failures with
    /// bounded exponential backoff.
    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        self.send_with_read_timeout(request, timeout_ipc()).await
    }

    async fn send_with_read_timeout(
        &self,
        request: &Request,
        read_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let mut delay = RETRY_BASE;
        let mut failed_once = false;

        for attempt in 0.. {
            match self.round_trip(request, read_timeout).await {
                Ok(response) => {
                    if failed_once {
                        if let Some(hook) = &self.on_reconnect {
                            hook();
                        }
                    }
                    return Ok(response);
                }
                Err(e @ (ClientError::Io(_) | ClientError::Protocol(ProtocolError::Io(_)))) => {
                    if attempt + 1 >= RETRY_ATTEMPTS {
                        return Err(e);
                    }
                    failed_once = true;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_CAP);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop always returns")
    }

    fn reject<T>(response: Response) -> Result<T, ClientError> {
        match response {
            Response::Error { error } => Err(ClientError::Daemon(error)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    async fn send_ok(&self, request: &Request) -> Result<(), ClientError> {
        match self.send(request).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    // ─── daemon ─────────────────────────────────────────────────────

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(&Request::Ping).await? {
            Response::Pong { ok: true } => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn info(&self) -> Result<DaemonInfo, ClientError> {
        match self.send(&Request::Info).await? {
            Response::Info {
                version,
                uptime_secs,
                socket_path,
                processes,
                proxies,
                sessions,
                tasks_pending,
            } => Ok(DaemonInfo {
                version,
                uptime_secs,
                socket_path,
                processes,
                proxies,
                sessions,
                tasks_pending,
            }),
            other => Self::reject(other),
        }
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(&Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            other => Self::reject(other),
        }
    }

    // ─── processes ──────────────────────────────────────────────────

    /// RUN; foreground-raw runs hold the connection until exit.
    pub async fn run(&self, params: RunParams) -> Result<Response, ClientError> {
        let read_timeout = match params.mode {
            spot_daemon::RunMode::FgRaw => Duration::from_secs(610),
            _ => timeout_ipc(),
        };
        let response = self
            .send_with_read_timeout(&Request::Run(params), read_timeout)
            .await?;
        match response {
            Response::ProcStarted { .. } | Response::RunCompleted { .. } => Ok(response),
            other => Self::reject(other),
        }
    }

    pub async fn proc_status(&self, id: &str) -> Result<ProcessStatus, ClientError> {
        match self
            .send(&Request::ProcStatus { id: id.to_string() })
            .await?
        {
            Response::Proc { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    pub async fn proc_output(
        &self,
        id: &str,
        filter: OutputFilter,
    ) -> Result<ProcOutput, ClientError> {
        match self
            .send(&Request::ProcOutput {
                id: id.to_string(),
                filter,
            })
            .await?
        {
            Response::Output {
                text,
                dropped,
                truncated,
            } => Ok(ProcOutput {
                text,
                dropped,
                truncated,
            }),
            other => Self::reject(other),
        }
    }

    pub async fn proc_stop(&self, id: &str, force: bool) -> Result<ProcessStatus, ClientError> {
        match self
            .send(&Request::ProcStop {
                id: id.to_string(),
                force,
            })
            .await?
        {
            Response::Proc { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    pub async fn proc_list(
        &self,
        state: Option<ProcessState>,
    ) -> Result<Vec<ProcessStatus>, ClientError> {
        match self.send(&Request::ProcList { state }).await? {
            Response::Procs { procs } => Ok(procs),
            other => Self::reject(other),
        }
    }

    pub async fn cleanup_port(&self, port: u16) -> Result<Vec<u32>, ClientError> {
        match self.send(&Request::ProcCleanupPort { port }).await? {
            Response::PortCleaned { killed, .. } => Ok(killed),
            other => Self::reject(other),
        }
    }

    // ─── proxies ────────────────────────────────────────────────────

    pub async fn proxy_start(
        &self,
        id: &str,
        target_url: &str,
        config: spot_daemon::protocol::ProxyConfig,
    ) -> Result<spot_daemon::protocol::ProxyStatus, ClientError> {
        match self
            .send(&Request::ProxyStart {
                id: id.to_string(),
                target_url: target_url.to_string(),
                config,
            })
            .await?
        {
            Response::Proxy { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    pub async fn proxy_stop(&self, id: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::ProxyStop { id: id.to_string() }).await
    }

    pub async fn proxy_status(
        &self,
        id: &str,
    ) -> Result<spot_daemon::protocol::ProxyStatus, ClientError> {
        match self
            .send(&Request::ProxyStatus { id: id.to_string() })
            .await?
        {
            Response::Proxy { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    pub async fn proxy_list(
        &self,
    ) -> Result<Vec<spot_daemon::protocol::ProxyStatus>, ClientError> {
        match self.send(&Request::ProxyList).await? {
            Response::Proxies { proxies } => Ok(proxies),
            other => Self::reject(other),
        }
    }

    pub async fn proxy_exec(
        &self,
        id: &str,
        code: &str,
        timeout_ms: Option<u64>,
    ) -> Result<(Option<serde_json::Value>, Option<String>), ClientError> {
        // Exec can legitimately take the full 30s browser window.
        let response = self
            .send_with_read_timeout(
                &Request::ProxyExec {
                    id: id.to_string(),
                    code: code.to_string(),
                    timeout_ms,
                },
                Duration::from_secs(35),
            )
            .await?;
        match response {
            Response::ExecResult { result, error } => Ok((result, error)),
            other => Self::reject(other),
        }
    }

    pub async fn proxy_toast(
        &self,
        id: &str,
        toast: spot_daemon::protocol::ToastPayload,
    ) -> Result<usize, ClientError> {
        match self
            .send(&Request::ProxyToast {
                id: id.to_string(),
                toast,
            })
            .await?
        {
            Response::ToastSent { delivered } => Ok(delivered),
            other => Self::reject(other),
        }
    }

    // ─── chaos ──────────────────────────────────────────────────────

    pub async fn chaos_add(
        &self,
        proxy_id: &str,
        rule: ChaosRule,
    ) -> Result<Vec<ChaosRule>, ClientError> {
        match self
            .send(&Request::ChaosAdd {
                proxy_id: proxy_id.to_string(),
                rule,
            })
            .await?
        {
            Response::ChaosRules { rules } => Ok(rules),
            other => Self::reject(other),
        }
    }

    pub async fn chaos_list(&self, proxy_id: &str) -> Result<Vec<ChaosRule>, ClientError> {
        match self
            .send(&Request::ChaosList {
                proxy_id: proxy_id.to_string(),
            })
            .await?
        {
            Response::ChaosRules { rules } => Ok(rules),
            other => Self::reject(other),
        }
    }

    pub async fn chaos_clear(&self, proxy_id: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::ChaosClear {
            proxy_id: proxy_id.to_string(),
        })
        .await
    }

    pub async fn chaos_apply(
        &self,
        proxy_id: &str,
        preset: &str,
    ) -> Result<Vec<String>, ClientError> {
        match self
            .send(&Request::ChaosApply {
                proxy_id: proxy_id.to_string(),
                preset: preset.to_string(),
            })
            .await?
        {
            Response::ChaosDigest { rules } => Ok(rules),
            other => Self::reject(other),
        }
    }

    // ─── traffic / pages ────────────────────────────────────────────

    pub async fn log_query(
        &self,
        proxy_id: &str,
        query: TrafficQuery,
    ) -> Result<(Vec<TrafficEntry>, TrafficStats), ClientError> {
        match self
            .send(&Request::ProxylogQuery {
                proxy_id: proxy_id.to_string(),
                query,
            })
            .await?
        {
            Response::Traffic { entries, stats } => Ok((entries, stats)),
            other => Self::reject(other),
        }
    }

    pub async fn log_stats(&self, proxy_id: &str) -> Result<TrafficStats, ClientError> {
        match self
            .send(&Request::ProxylogStats {
                proxy_id: proxy_id.to_string(),
            })
            .await?
        {
            Response::TrafficCounts { stats } => Ok(stats),
            other => Self::reject(other),
        }
    }

    pub async fn log_clear(&self, proxy_id: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::ProxylogClear {
            proxy_id: proxy_id.to_string(),
        })
        .await
    }

    pub async fn page_list(&self, proxy_id: &str) -> Result<Vec<PageSummary>, ClientError> {
        match self
            .send(&Request::PageList {
                proxy_id: proxy_id.to_string(),
            })
            .await?
        {
            Response::Pages { pages } => Ok(pages),
            other => Self::reject(other),
        }
    }

    pub async fn page_get(
        &self,
        proxy_id: &str,
        session_id: &str,
    ) -> Result<Option<PageSession>, ClientError> {
        match self
            .send(&Request::PageGet {
                proxy_id: proxy_id.to_string(),
                session_id: session_id.to_string(),
            })
            .await?
        {
            Response::Page { page } => Ok(page.map(|b| *b)),
            other => Self::reject(other),
        }
    }

    pub async fn page_clear(&self, proxy_id: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::PageClear {
            proxy_id: proxy_id.to_string(),
        })
        .await
    }

    // ─── sessions / scheduler ───────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn session_register(
        &self,
        code: &str,
        project_path: Option<PathBuf>,
        command: Option<String>,
        args: Vec<String>,
        overlay_endpoint: Option<String>,
        input_pipe: Option<PathBuf>,
    ) -> Result<SessionInfo, ClientError> {
        match self
            .send(&Request::SessionRegister {
                code: code.to_string(),
                project_path,
                command,
                args,
                overlay_endpoint,
                input_pipe,
            })
            .await?
        {
            Response::Session { session } => Ok(session),
            other => Self::reject(other),
        }
    }

    pub async fn session_unregister(&self, code: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::SessionUnregister {
            code: code.to_string(),
        })
        .await
    }

    pub async fn session_heartbeat(&self, code: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::SessionHeartbeat {
            code: code.to_string(),
        })
        .await
    }

    pub async fn session_send(&self, code: &str, message: &str) -> Result<(), ClientError> {
        self.send_ok(&Request::SessionSend {
            code: code.to_string(),
            message: message.to_string(),
        })
        .await
    }

    pub async fn session_schedule(
        &self,
        code: &str,
        duration: &str,
        message: &str,
        project_path: Option<PathBuf>,
    ) -> Result<ScheduledTask, ClientError> {
        match self
            .send(&Request::SessionSchedule {
                code: code.to_string(),
                duration: duration.to_string(),
                message: message.to_string(),
                project_path,
            })
            .await?
        {
            Response::TaskScheduled { task } => Ok(task),
            other => Self::reject(other),
        }
    }

    pub async fn session_tasks(
        &self,
        status: Option<String>,
        code: Option<String>,
    ) -> Result<Vec<ScheduledTask>, ClientError> {
        match self.send(&Request::SessionTasks { status, code }).await? {
            Response::Tasks { tasks } => Ok(tasks),
            other => Self::reject(other),
        }
    }

    pub async fn session_cancel(&self, task_id: &str) -> Result<ScheduledTask, ClientError> {
        match self
            .send(&Request::SessionCancel {
                task_id: task_id.to_string(),
            })
            .await?
        {
            Response::Task { task } => Ok(task),
            other => Self::reject(other),
        }
    }

    pub async fn session_list(&self) -> Result<Vec<SessionInfo>, ClientError> {
        match self.send(&Request::SessionList).await? {
            Response::Sessions { sessions } => Ok(sessions),
            other => Self::reject(other),
        }
    }

    pub async fn session_get(&self, code: &str) -> Result<SessionInfo, ClientError> {
        match self
            .send(&Request::SessionGet {
                code: code.to_string(),
            })
            .await?
        {
            Response::Session { session } => Ok(session),
            other => Self::reject(other),
        }
    }

    pub async fn overlay_set(&self, endpoint: Option<String>) -> Result<(), ClientError> {
        self.send_ok(&Request::OverlaySet { endpoint }).await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
