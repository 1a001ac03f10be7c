// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed-process registry: spawn, monitor, capture output, stop.
//!
//! Each record owns its OS process group, two output rings fed by
//! dedicated reader tasks, and a monitor task that reaps the child.
//! State transitions go through the CAS cell in spot-core, so clients
//! polling `PROC.STATUS` never observe a skipped state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use spot_core::{
    ErrorCode, OutputFilter, OutputRing, ProcessSpec, ProcessState, ProcessStatus, RingSnapshot,
    StateCell, StreamKind, StreamSelect, WireError, DEFAULT_RING_CAPACITY,
};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::subprocess::signal_group;

/// Reader chunk size for pipe drains.
const READ_CHUNK: usize = 8192;

/// Extra time the stopper waits for the monitor after a KILL.
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Tunables for the process manager.
#[derive(Debug, Clone)]
pub struct ProcConfig {
    /// TERM-to-KILL window for graceful stop.
    pub graceful_timeout: Duration,
    /// Per-stream output ring capacity.
    pub ring_capacity: usize,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(5),
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

/// Filtered output plus the counters callers need to trust it.
#[derive(Debug, Clone)]
pub struct OutputResult {
    pub text: String,
    pub dropped: u64,
    pub truncated: bool,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// One managed process record.
pub struct ProcessHandle {
    pub spec: ProcessSpec,
    state: StateCell,
    pid: Mutex<Option<u32>>,
    exit_code: Mutex<Option<i32>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    seq: AtomicU64,
    stdout: Mutex<OutputRing>,
    stderr: Mutex<OutputRing>,
    done: watch::Sender<bool>,
}

impl ProcessHandle {
    fn new(spec: ProcessSpec, ring_capacity: usize) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            spec,
            state: StateCell::new(ProcessState::Pending),
            pid: Mutex::new(None),
            exit_code: Mutex::new(None),
            started_at: Mutex::new(None),
            ended_at: Mutex::new(None),
            seq: AtomicU64::new(0),
            stdout: Mutex::new(OutputRing::new(ring_capacity)),
            stderr: Mutex::new(OutputRing::new(ring_capacity)),
            done,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state.load()
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    pub fn status(&self) -> ProcessStatus {
        let state = self.state.load();
        ProcessStatus {
            id: self.spec.id.clone(),
            command: self.spec.command.clone(),
            args: self.spec.args.clone(),
            state,
            // pid is meaningful only while the process can still receive
            // signals; terminal records report none.
            pid: if state.is_terminal() {
                None
            } else {
                *self.pid.lock()
            },
            exit_code: *self.exit_code.lock(),
            mode: self.spec.mode,
            started_at: *self.started_at.lock(),
            ended_at: *self.ended_at.lock(),
            output_dropped: self.stdout.lock().dropped() + self.stderr.lock().dropped(),
        }
    }

    /// Snapshot the requested stream(s), interleaved for Combined.
    pub fn snapshot(&self, select: StreamSelect) -> RingSnapshot {
        match select {
            StreamSelect::Stdout => self.stdout.lock().snapshot(),
            StreamSelect::Stderr => self.stderr.lock().snapshot(),
            StreamSelect::Combined => {
                let out = self.stdout.lock().snapshot();
                let err = self.stderr.lock().snapshot();
                out.merge(err)
            }
        }
    }

    fn write_chunk(&self, kind: StreamKind, bytes: &[u8]) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        match kind {
            StreamKind::Stdout => self.stdout.lock().write(seq, bytes),
            StreamKind::Stderr => self.stderr.lock().write(seq, bytes),
        }
    }

    /// Wait until the monitor has reaped the child, up to `timeout`.
    /// Returns false when the deadline passed first.
    pub async fn wait_done(&self, timeout: Duration) -> bool {
        let mut rx = self.done.subscribe();
        if *rx.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }

    fn mark_exited(&self, code: i32) {
        *self.exit_code.lock() = Some(code);
        *self.ended_at.lock() = Some(Utc::now());

        // A process we asked to stop counts as Stopped regardless of
        // exit code; an unsolicited exit maps code 0 to Stopped and
        // anything else to Failed.
        if self
            .state
            .transition(ProcessState::Stopping, ProcessState::Stopped)
            .is_err()
        {
            let to = if code == 0 {
                ProcessState::Stopped
            } else {
                ProcessState::Failed
            };
            if self
                .state
                .transition_any(&[ProcessState::Running], to)
                .is_none()
            {
                warn!(id = %self.spec.id, "process exited in unexpected state");
            }
        }

        self.done.send_replace(true);
    }

    fn mark_spawn_failed(&self) {
        *self.ended_at.lock() = Some(Utc::now());
        if let Err(e) = self
            .state
            .transition(ProcessState::Starting, ProcessState::Failed)
        {
            warn!(id = %self.spec.id, error = %e, "spawn-failure transition rejected");
        }
        self.done.send_replace(true);
    }
}

/// Registry of managed processes.
pub struct ProcessManager {
    procs: RwLock<HashMap<String, Arc<ProcessHandle>>>,
    config: ProcConfig,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(ProcConfig::default())
    }
}

impl ProcessManager {
    pub fn new(config: ProcConfig) -> Self {
        Self {
            procs: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Spawn a process under management. The id must be unused.
    pub async fn start(&self, spec: ProcessSpec) -> Result<Arc<ProcessHandle>, WireError> {
        if spec.command.trim().is_empty() {
            return Err(WireError::invalid_args("command must not be empty"));
        }

        let handle = Arc::new(ProcessHandle::new(spec.clone(), self.config.ring_capacity));
        {
            let mut procs = self.procs.write();
            if procs.contains_key(&spec.id) {
                return Err(WireError::new(
                    ErrorCode::AlreadyExists,
                    format!("process id already in use: {}", spec.id),
                ));
            }
            procs.insert(spec.id.clone(), Arc::clone(&handle));
        }

        handle
            .state
            .transition(ProcessState::Pending, ProcessState::Starting)?;

        let mut cmd = tokio::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            // Own process group so signals reach descendants too.
            .process_group(0);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                handle.mark_spawn_failed();
                return Err(WireError::new(
                    ErrorCode::SpawnFailed,
                    format!("failed to spawn {}: {}", spec.command, e),
                ));
            }
        };

        let pid = child.id();
        *handle.pid.lock() = pid;
        *handle.started_at.lock() = Some(Utc::now());
        handle
            .state
            .transition(ProcessState::Starting, ProcessState::Running)?;
        info!(id = %spec.id, pid, command = %spec.command, "process started");

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(Arc::clone(&handle), StreamKind::Stdout, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(Arc::clone(&handle), StreamKind::Stderr, stderr);
        }
        spawn_monitor(Arc::clone(&handle), child);

        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Result<Arc<ProcessHandle>, WireError> {
        self.procs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WireError::not_found(format!("process: {id}")))
    }

    /// Status rows for every record, newest first.
    pub fn list(&self, state: Option<ProcessState>) -> Vec<ProcessStatus> {
        let mut rows: Vec<ProcessStatus> = self
            .procs
            .read()
            .values()
            .map(|h| h.status())
            .filter(|s| state.map_or(true, |want| s.state == want))
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows
    }

    /// Stop a running process: TERM to the group, then KILL after the
    /// graceful window. `force` skips straight to KILL.
    pub async fn stop(&self, id: &str, force: bool) -> Result<ProcessStatus, WireError> {
        let handle = self.get(id)?;
        handle
            .state
            .transition(ProcessState::Running, ProcessState::Stopping)?;

        let pid = handle.pid().ok_or_else(|| {
            WireError::new(ErrorCode::Internal, format!("no pid for process {id}"))
        })?;

        if force {
            signal_group("-KILL", pid).await;
        } else {
            signal_group("-TERM", pid).await;
            if !handle.wait_done(self.config.graceful_timeout).await {
                debug!(id, pid, "graceful window elapsed, escalating to KILL");
                signal_group("-KILL", pid).await;
            }
        }

        // The monitor sets the terminal state once the child is reaped.
        handle.wait_done(REAP_GRACE).await;
        Ok(handle.status())
    }

    /// Filtered output for a process per the ring-log contract.
    pub fn output(&self, id: &str, filter: &OutputFilter) -> Result<OutputResult, WireError> {
        let handle = self.get(id)?;
        let snapshot = handle.snapshot(filter.stream);
        let text = filter
            .apply(&snapshot.text())
            .map_err(|e| WireError::invalid_args(format!("bad grep pattern: {e}")))?;
        Ok(OutputResult {
            text,
            dropped: snapshot.dropped,
            truncated: snapshot.truncated,
        })
    }

    /// Block until the process exits (used by fg_raw runs).
    pub async fn wait_exit(&self, id: &str, timeout: Duration) -> Result<ProcessStatus, WireError> {
        let handle = self.get(id)?;
        if !handle.wait_done(timeout).await {
            return Err(WireError::new(
                ErrorCode::Timeout,
                format!("process {id} still running after {}s", timeout.as_secs()),
            ));
        }
        Ok(handle.status())
    }

    /// Stop everything that is still running. Aggressive mode skips
    /// TERM entirely (used when the daemon itself is out of time).
    pub async fn stop_all(&self, aggressive: bool) {
        if aggressive {
            self.kill_all().await;
            return;
        }
        let running: Vec<String> = self
            .procs
            .read()
            .values()
            .filter(|h| h.state() == ProcessState::Running)
            .map(|h| h.spec.id.clone())
            .collect();
        for id in running {
            if let Err(e) = self.stop(&id, aggressive).await {
                warn!(id, error = %e, "failed to stop process during shutdown");
            }
        }
    }

    /// KILL every live process group immediately. Also catches records
    /// already in Stopping whose graceful window was cut short by the
    /// shutdown deadline.
    async fn kill_all(&self) {
        let live: Vec<Arc<ProcessHandle>> = self
            .procs
            .read()
            .values()
            .filter(|h| !h.state().is_terminal())
            .cloned()
            .collect();
        for handle in &live {
            let _ = handle
                .state
                .transition(ProcessState::Running, ProcessState::Stopping);
            if let Some(pid) = handle.pid() {
                signal_group("-KILL", pid).await;
            }
        }
        for handle in &live {
            handle.wait_done(REAP_GRACE).await;
        }
    }

    pub fn count_active(&self) -> usize {
        self.procs
            .read()
            .values()
            .filter(|h| !h.state().is_terminal())
            .count()
    }
}

fn spawn_reader(
    handle: Arc<ProcessHandle>,
    kind: StreamKind,
    mut stream: impl AsyncReadExt + Unpin + Send + 'static,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => handle.write_chunk(kind, &buf[..n]),
                Err(e) => {
                    // Output is best-effort after the first reader error.
                    debug!(id = %handle.spec.id, ?kind, error = %e, "output reader error");
                    break;
                }
            }
        }
    });
}

fn spawn_monitor(handle: Arc<ProcessHandle>, mut child: tokio::process::Child) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                let code = exit_code_of(status);
                info!(id = %handle.spec.id, code, "process exited");
                handle.mark_exited(code);
            }
            Err(e) => {
                error!(id = %handle.spec.id, error = %e, "failed to wait on child");
                handle.mark_exited(-1);
            }
        }
    });
}

/// Exit code, mapping signal deaths to the shell convention 128+signal.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

#[cfg(test)]
#[path = "proc_tests.rs"]
mod tests;
