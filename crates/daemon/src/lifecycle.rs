// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use spot_engine::{ProcConfig, ProcessManager, Scheduler, SessionRegistry};
use spot_proxy::ProxyManager;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Overall shutdown deadline under the default configuration.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Below this much remaining budget, process teardown skips TERM.
const AGGRESSIVE_THRESHOLD: Duration = Duration::from_secs(3);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/spot)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to version file
    pub version_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Directory holding the scheduler's task log + snapshot
    pub tasks_dir: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Fixed paths under the state directory; one daemon per user per
    /// socket path. `SPOT_SOCKET` overrides just the socket.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;
        let socket_path = crate::env::socket_path(&state_dir);

        Ok(Self {
            socket_path,
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            log_path: state_dir.join("daemon.log"),
            tasks_dir: state_dir.join("tasks"),
            state_dir,
        })
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Task storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon state during operation.
///
/// The listener is returned separately from startup to be spawned as a
/// Listener task.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub procs: Arc<ProcessManager>,
    pub proxies: Arc<ProxyManager>,
    pub sessions: Arc<SessionRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub start_time: Instant,
    pub shutting_down: Arc<AtomicBool>,
}

/// Result of daemon startup.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock —
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create state directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.state_dir)?;
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - prevents races.
    // OpenOptions avoids truncating before we hold the lock, which
    // would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file (truncate now that we hold the lock)
    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Version file for the CLI's mismatch check
    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // 4. Recover the scheduler's durable state
    let scheduler = Scheduler::open(&config.tasks_dir)
        .map_err(|e| LifecycleError::Storage(e.to_string()))?;

    // 5. Core components
    let procs = Arc::new(ProcessManager::new(ProcConfig::default()));
    let proxies = Arc::new(ProxyManager::new());
    let sessions = SessionRegistry::new();

    // 6. Remove stale socket and bind (LAST - after all validation)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!("Daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            procs,
            proxies,
            sessions,
            scheduler,
            start_time: Instant::now(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        },
        listener,
    })
}

impl DaemonState {
    /// Orderly teardown under a deadline.
    ///
    /// New work is rejected first, proxies close their listeners and
    /// WS clients, processes get TERM then KILL (or KILL immediately
    /// once less than 3 s of budget remains), the scheduler is
    /// checkpointed, and the socket path is removed. The listener task
    /// must already be stopped by the caller.
    pub async fn shutdown(&mut self, deadline: Duration) {
        let started = Instant::now();
        info!("Shutting down daemon...");

        // 1. Reject new registrations/work.
        self.shutting_down.store(true, Ordering::SeqCst);

        // 2. Stop all proxies: listeners close, exec waiters unblock,
        // WS clients drain.
        self.proxies.stop_all();

        // 3. Stop processes within the remaining budget.
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining < AGGRESSIVE_THRESHOLD {
            self.procs.stop_all(true).await;
        } else {
            let graceful = self.procs.stop_all(false);
            if tokio::time::timeout(remaining - Duration::from_secs(1), graceful)
                .await
                .is_err()
            {
                warn!("graceful process stop overran, escalating");
                self.procs.stop_all(true).await;
            }
        }

        // 4. Checkpoint the scheduler so recovery skips the log replay.
        if let Err(e) = self.scheduler.checkpoint() {
            warn!("failed to checkpoint scheduler: {}", e);
        }

        // 5. Remove socket / pid / version files.
        for path in [
            &self.config.socket_path,
            &self.config.lock_path,
            &self.config.version_path,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("failed to remove {}: {}", path.display(), e);
                }
            }
        }

        // Lock released when lock_file drops.
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Daemon shutdown complete"
        );
    }
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    for path in [
        &config.socket_path,
        &config.version_path,
        &config.lock_path,
    ] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
