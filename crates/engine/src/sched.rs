// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable delayed-message scheduler.
//!
//! Pending tasks live in the storage crate's log+snapshot store and
//! survive daemon restarts. A single worker sleeps until the earliest
//! deadline, takes due tasks under the scheduler mutex, and delivers
//! them through the session registry. Cancellation is race-free: a
//! task observed Pending under the mutex flips to Cancelled, and a
//! task already handed to the delivery path refuses cancellation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use spot_core::{
    Clock, ErrorCode, ScheduledTask, SystemClock, TaskStatus, WireError,
    task::MAX_ATTEMPTS,
};
use spot_storage::TaskStore;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::sessions::SessionRegistry;

/// Upper bound on the worker's sleep so deadline math is re-checked
/// periodically even without wakeups.
const MAX_SLEEP: Duration = Duration::from_secs(30);

/// Filter for `SESSION.TASKS`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub session_code: Option<String>,
}

struct SchedulerInner {
    store: TaskStore,
    /// Tasks currently in the delivery path; cancellation refuses these.
    delivering: HashSet<String>,
}

/// The scheduler. Shared via `Arc`; the worker runs in its own task.
pub struct Scheduler<C: Clock = SystemClock> {
    inner: Mutex<SchedulerInner>,
    wake: Notify,
    clock: C,
}

impl Scheduler<SystemClock> {
    pub fn open(dir: &Path) -> Result<Arc<Self>, WireError> {
        Self::open_with_clock(dir, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn open_with_clock(dir: &Path, clock: C) -> Result<Arc<Self>, WireError> {
        let store = TaskStore::open(dir)
            .map_err(|e| WireError::internal(format!("task store: {e}")))?;
        Ok(Arc::new(Self {
            inner: Mutex::new(SchedulerInner {
                store,
                delivering: HashSet::new(),
            }),
            wake: Notify::new(),
            clock,
        }))
    }

    /// Persist a new task due `delay` from now.
    pub fn schedule(
        &self,
        session_code: &str,
        delay: Duration,
        message: &str,
        project_path: Option<std::path::PathBuf>,
    ) -> Result<ScheduledTask, WireError> {
        if session_code.is_empty() {
            return Err(WireError::invalid_args("session code must not be empty"));
        }
        let now = self.clock.now();
        let deliver_at = now
            + chrono::Duration::from_std(delay)
                .map_err(|_| WireError::invalid_args("duration out of range"))?;
        let id = format!("task-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let mut task = ScheduledTask::new(&id, session_code, message, deliver_at, now);
        task.project_path = project_path;

        {
            let mut inner = self.inner.lock();
            inner
                .store
                .upsert(task.clone())
                .map_err(|e| WireError::internal(e))?;
        }
        self.wake.notify_one();
        info!(task = %id, session = session_code, in_secs = delay.as_secs(), "task scheduled");
        Ok(task)
    }

    /// Tasks matching the filter, soonest deadline first.
    pub fn tasks(&self, filter: &TaskFilter) -> Vec<ScheduledTask> {
        let inner = self.inner.lock();
        let mut rows: Vec<ScheduledTask> = inner
            .store
            .tasks()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                filter
                    .session_code
                    .as_deref()
                    .map_or(true, |code| t.session_code == code)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.deliver_at.cmp(&b.deliver_at));
        rows
    }

    /// Flip a Pending task to Cancelled.
    pub fn cancel(&self, id: &str) -> Result<ScheduledTask, WireError> {
        let mut inner = self.inner.lock();
        if inner.delivering.contains(id) {
            return Err(WireError::new(
                ErrorCode::InvalidState,
                format!("task {id} is being delivered"),
            ));
        }
        let mut task = inner
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| WireError::not_found(format!("task: {id}")))?;
        if task.status != TaskStatus::Pending {
            return Err(WireError::new(
                ErrorCode::InvalidState,
                format!("task {id} is {}", task.status),
            ));
        }
        task.status = TaskStatus::Cancelled;
        inner
            .store
            .upsert(task.clone())
            .map_err(|e| WireError::internal(e))?;
        info!(task = %id, "task cancelled");
        Ok(task)
    }

    /// Compact the on-disk state (called during daemon shutdown).
    pub fn checkpoint(&self) -> Result<(), WireError> {
        self.inner
            .lock()
            .store
            .checkpoint()
            .map_err(|e| WireError::internal(e))
    }

    pub fn count_pending(&self) -> usize {
        self.inner.lock().store.pending().count()
    }

    /// Run the delivery loop until the task is aborted.
    pub fn spawn_worker(self: &Arc<Self>, registry: Arc<SessionRegistry<C>>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let now = scheduler.clock.now();
                let (due, next_at) = {
                    let mut inner = scheduler.inner.lock();
                    let due: Vec<ScheduledTask> = inner
                        .store
                        .pending()
                        .filter(|t| t.deliver_at <= now)
                        .cloned()
                        .collect();
                    for task in &due {
                        inner.delivering.insert(task.id.clone());
                    }
                    let next_at = inner
                        .store
                        .pending()
                        .filter(|t| t.deliver_at > now)
                        .map(|t| t.deliver_at)
                        .min();
                    (due, next_at)
                };

                for task in due {
                    scheduler.deliver(&registry, task).await;
                }

                let sleep_for = match next_at {
                    Some(at) => (at - scheduler.clock.now())
                        .to_std()
                        .unwrap_or(Duration::ZERO)
                        .min(MAX_SLEEP),
                    None => MAX_SLEEP,
                };
                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = scheduler.wake.notified() => {}
                }
            }
        })
    }

    async fn deliver(&self, registry: &SessionRegistry<C>, mut task: ScheduledTask) {
        debug!(task = %task.id, session = %task.session_code, "delivering task");
        let result = registry.send(&task.session_code, &task.message).await;

        let mut inner = self.inner.lock();
        inner.delivering.remove(&task.id);

        // Respect a cancel that raced us before the take: the delivering
        // guard makes this unreachable for in-flight tasks, but a crash
        // recovery could leave the store ahead of us.
        if inner.store.get(&task.id).map(|t| t.status) != Some(TaskStatus::Pending) {
            return;
        }

        task.attempts += 1;
        match result {
            Ok(()) => {
                task.status = TaskStatus::Delivered;
                task.last_error = None;
                info!(task = %task.id, session = %task.session_code, "task delivered");
            }
            Err(e) if e.code == ErrorCode::NotFound && task.attempts < MAX_ATTEMPTS => {
                // Session not registered yet: back off and retry.
                let delay = retry_backoff(task.attempts);
                task.deliver_at = self.clock.now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(60));
                task.last_error = Some(e.to_string());
                warn!(
                    task = %task.id,
                    attempt = task.attempts,
                    retry_in_secs = delay.as_secs(),
                    "delivery failed, will retry"
                );
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.last_error = Some(e.to_string());
                warn!(task = %task.id, error = %e, "task delivery failed permanently");
            }
        }

        if let Err(e) = inner.store.upsert(task) {
            error!(error = %e, "failed to persist task outcome");
        }
    }
}

/// Exponential backoff for transient delivery failures: 2s, 4s, 8s…
/// capped at a minute.
fn retry_backoff(attempts: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempts.min(6));
    Duration::from_secs(secs.min(60))
}

#[cfg(test)]
#[path = "sched_tests.rs"]
mod tests;
