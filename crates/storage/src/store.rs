// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Combined snapshot + log store for scheduled tasks.
//!
//! Owns both files. Recovery order: load snapshot, replay log over it.
//! Compaction is size-triggered: when the log outgrows the threshold,
//! write a fresh snapshot of live tasks and rewrite the log to just the
//! non-terminal ones.

use std::collections::HashMap;
use std::path::Path;

use spot_core::{ScheduledTask, TaskStatus};
use thiserror::Error;
use tracing::{debug, info};

use crate::log::{TaskLog, TaskLogError};
use crate::snapshot::{load_snapshot, save_snapshot, SnapshotError};

/// Compact once the log passes this size.
pub const COMPACT_THRESHOLD_BYTES: u64 = 256 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task log error: {0}")]
    Log(#[from] TaskLogError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Durable task store.
pub struct TaskStore {
    log: TaskLog,
    snapshot_path: std::path::PathBuf,
    tasks: HashMap<String, ScheduledTask>,
    compact_threshold: u64,
}

impl TaskStore {
    /// Open the store rooted at `dir` (creates `tasks.wal` and
    /// `tasks.snapshot` inside it) and recover state.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let log_path = dir.join("tasks.wal");
        let snapshot_path = dir.join("tasks.snapshot");

        let mut tasks: HashMap<String, ScheduledTask> = HashMap::new();
        if let Some(snapshot) = load_snapshot(&snapshot_path)? {
            debug!(count = snapshot.tasks.len(), "loaded task snapshot");
            for task in snapshot.tasks {
                tasks.insert(task.id.clone(), task);
            }
        }

        let mut log = TaskLog::open(&log_path)?;
        let replayed = log.replay()?;
        if !replayed.is_empty() {
            debug!(count = replayed.len(), "replayed task log");
        }
        for task in replayed {
            tasks.insert(task.id.clone(), task);
        }

        info!(
            pending = tasks.values().filter(|t| t.status == TaskStatus::Pending).count(),
            total = tasks.len(),
            "task store recovered"
        );

        Ok(Self {
            log,
            snapshot_path,
            tasks,
            compact_threshold: COMPACT_THRESHOLD_BYTES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold = bytes;
        self
    }

    /// Persist a task (insert or update), compacting if the log has
    /// grown past the threshold.
    pub fn upsert(&mut self, task: ScheduledTask) -> Result<(), StoreError> {
        self.log.append(&task)?;
        self.tasks.insert(task.id.clone(), task);
        if self.log.len_bytes() > self.compact_threshold {
            self.compact()?;
        }
        Ok(())
    }

    /// Snapshot everything and shrink the log to live tasks only.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        let all: Vec<ScheduledTask> = self.tasks.values().cloned().collect();
        save_snapshot(&self.snapshot_path, &all)?;
        let live: Vec<ScheduledTask> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        self.log.rewrite(&live)?;
        debug!(
            live = live.len(),
            total = all.len(),
            "compacted task store"
        );
        Ok(())
    }

    /// Final checkpoint at shutdown.
    pub fn checkpoint(&mut self) -> Result<(), StoreError> {
        self.compact()
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledTask> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.values()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
