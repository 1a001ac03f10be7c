// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Requests carry a verb string (sub-verbs joined with a dot) and a
//! structured data block; responses carry a typed payload or a coded
//! error. Wire format: 4-byte length prefix (big-endian) + JSON.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spot_core::{
    ChaosRule, ErrorCode, OutputFilter, PageSession, PageSummary, ProcessState, ProcessStatus,
    ScheduledTask, SessionInfo, TrafficEntry, TrafficKind, TrafficStats, WireError,
};
pub use spot_proxy::{ProxyConfig, ProxyStatus, ToastPayload};

#[path = "protocol_wire.rs"]
mod wire;
pub use wire::{
    decode, encode, read_message, read_request, write_message, write_response, ProtocolError,
    DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, WRITE_TIMEOUT,
};

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a RUN attaches to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Bg,
    Fg,
    FgRaw,
}

/// Data block for `RUN`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunParams {
    /// Client-chosen process id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Project directory the command runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub mode: RunMode,
    /// Package script to run through the project's script runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    /// Verbatim command (requires `raw: true`).
    #[serde(default)]
    pub raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// Traffic query with wire-friendly time bounds (RFC3339 or `"5m"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrafficQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<TrafficKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verb", content = "data")]
pub enum Request {
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "SHUTDOWN")]
    Shutdown,
    #[serde(rename = "RUN")]
    Run(RunParams),

    #[serde(rename = "PROC.STATUS")]
    ProcStatus { id: String },
    #[serde(rename = "PROC.OUTPUT")]
    ProcOutput {
        id: String,
        #[serde(flatten)]
        filter: OutputFilter,
    },
    #[serde(rename = "PROC.STOP")]
    ProcStop {
        id: String,
        #[serde(default)]
        force: bool,
    },
    #[serde(rename = "PROC.LIST")]
    ProcList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<ProcessState>,
    },
    #[serde(rename = "PROC.CLEANUP_PORT")]
    ProcCleanupPort { port: u16 },

    #[serde(rename = "PROXY.START")]
    ProxyStart {
        id: String,
        target_url: String,
        #[serde(flatten)]
        config: ProxyConfig,
    },
    #[serde(rename = "PROXY.STOP")]
    ProxyStop { id: String },
    #[serde(rename = "PROXY.STATUS")]
    ProxyStatus { id: String },
    #[serde(rename = "PROXY.LIST")]
    ProxyList,
    #[serde(rename = "PROXY.EXEC")]
    ProxyExec {
        id: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    #[serde(rename = "PROXY.TOAST")]
    ProxyToast {
        id: String,
        #[serde(flatten)]
        toast: ToastPayload,
    },

    #[serde(rename = "CHAOS.ADD")]
    ChaosAdd { proxy_id: String, rule: ChaosRule },
    #[serde(rename = "CHAOS.LIST")]
    ChaosList { proxy_id: String },
    #[serde(rename = "CHAOS.CLEAR")]
    ChaosClear { proxy_id: String },
    #[serde(rename = "CHAOS.APPLY")]
    ChaosApply { proxy_id: String, preset: String },

    #[serde(rename = "PROXYLOG.QUERY")]
    ProxylogQuery {
        proxy_id: String,
        #[serde(flatten)]
        query: TrafficQuery,
    },
    #[serde(rename = "PROXYLOG.STATS")]
    ProxylogStats { proxy_id: String },
    #[serde(rename = "PROXYLOG.CLEAR")]
    ProxylogClear { proxy_id: String },

    #[serde(rename = "CURRENTPAGE.LIST")]
    PageList { proxy_id: String },
    #[serde(rename = "CURRENTPAGE.GET")]
    PageGet { proxy_id: String, session_id: String },
    #[serde(rename = "CURRENTPAGE.CLEAR")]
    PageClear { proxy_id: String },

    #[serde(rename = "SESSION.REGISTER")]
    SessionRegister {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overlay_endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_pipe: Option<PathBuf>,
    },
    #[serde(rename = "SESSION.UNREGISTER")]
    SessionUnregister { code: String },
    #[serde(rename = "SESSION.HEARTBEAT")]
    SessionHeartbeat { code: String },
    #[serde(rename = "SESSION.SEND")]
    SessionSend { code: String, message: String },
    #[serde(rename = "SESSION.SCHEDULE")]
    SessionSchedule {
        code: String,
        /// Delay like `"2s"` / `"5m"`.
        duration: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_path: Option<PathBuf>,
    },
    #[serde(rename = "SESSION.TASKS")]
    SessionTasks {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    #[serde(rename = "SESSION.CANCEL")]
    SessionCancel { task_id: String },
    #[serde(rename = "SESSION.LIST")]
    SessionList,
    #[serde(rename = "SESSION.GET")]
    SessionGet { code: String },

    #[serde(rename = "OVERLAY.SET")]
    OverlaySet {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Generic success
    Ok,
    /// Health check response
    Pong { ok: bool },
    /// Daemon is shutting down
    ShuttingDown,

    /// Daemon overview
    Info {
        version: String,
        uptime_secs: u64,
        socket_path: PathBuf,
        processes: usize,
        proxies: usize,
        sessions: usize,
        tasks_pending: usize,
    },

    /// Process spawned in the background
    ProcStarted { status: ProcessStatus },
    /// Foreground-raw run finished
    RunCompleted {
        status: ProcessStatus,
        stdout: String,
        stderr: String,
    },
    /// Single process status
    Proc { status: ProcessStatus },
    /// Process listing
    Procs { procs: Vec<ProcessStatus> },
    /// Filtered output
    Output {
        text: String,
        dropped: u64,
        truncated: bool,
    },
    /// Port reclamation result
    PortCleaned { port: u16, killed: Vec<u32> },

    /// Single proxy status
    Proxy { status: ProxyStatus },
    /// Proxy listing
    Proxies { proxies: Vec<ProxyStatus> },
    /// Remote-JS execution result
    ExecResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Toast fan-out result
    ToastSent { delivered: usize },

    /// Chaos table listing
    ChaosRules { rules: Vec<ChaosRule> },
    /// Applied rule-set digest
    ChaosDigest { rules: Vec<String> },

    /// Traffic query result
    Traffic {
        entries: Vec<TrafficEntry>,
        stats: TrafficStats,
    },
    /// Traffic counts only
    TrafficCounts { stats: TrafficStats },

    /// Page session listing
    Pages { pages: Vec<PageSummary> },
    /// Full page session
    Page { page: Option<Box<PageSession>> },

    /// Single session
    Session { session: SessionInfo },
    /// Session listing
    Sessions { sessions: Vec<SessionInfo> },
    /// Task persisted
    TaskScheduled { task: ScheduledTask },
    /// Task listing
    Tasks { tasks: Vec<ScheduledTask> },
    /// Single task (cancel result)
    Task { task: ScheduledTask },

    /// Coded failure
    Error { error: WireError },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            error: WireError::new(code, message),
        }
    }
}

impl From<WireError> for Response {
    fn from(error: WireError) -> Self {
        Response::Error { error }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
