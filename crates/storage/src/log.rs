// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL append-only log of task upserts.
//!
//! Each line is one full [`ScheduledTask`]; on replay the last line for
//! an id wins. Appends are fsync'd immediately — scheduler writes are
//! rare (one per schedule/deliver/cancel), so there is no group commit.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use spot_core::ScheduledTask;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TaskLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only task log.
pub struct TaskLog {
    file: File,
    path: PathBuf,
    len: u64,
}

impl TaskLog {
    /// Open or create the log at `path`.
    pub fn open(path: &Path) -> Result<Self, TaskLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_owned(),
            len,
        })
    }

    /// Append one task record and make it durable.
    pub fn append(&mut self, task: &ScheduledTask) -> Result<(), TaskLogError> {
        let mut line = serde_json::to_vec(task)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_all()?;
        self.len += line.len() as u64;
        Ok(())
    }

    /// Replay all records, last-write-wins per task id.
    ///
    /// Unparseable lines are skipped with a warning — a torn final
    /// write must not block recovery of everything before it.
    pub fn replay(&mut self) -> Result<Vec<ScheduledTask>, TaskLogError> {
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut latest: Vec<ScheduledTask> = Vec::new();
        let mut line = String::new();
        let mut offset = 0u64;
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                offset += n as u64;
                continue;
            }
            match serde_json::from_str::<ScheduledTask>(trimmed) {
                Ok(task) => {
                    if let Some(existing) = latest.iter_mut().find(|t| t.id == task.id) {
                        *existing = task;
                    } else {
                        latest.push(task);
                    }
                }
                Err(e) => {
                    warn!(
                        offset,
                        error = %e,
                        path = %self.path.display(),
                        "skipping corrupt task-log line",
                    );
                }
            }
            offset += n as u64;
        }
        Ok(latest)
    }

    /// Rewrite the log so it contains exactly the given tasks.
    ///
    /// Writes a temp file, fsyncs, and renames over the old log.
    pub fn rewrite(&mut self, tasks: &[ScheduledTask]) -> Result<(), TaskLogError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for task in tasks {
                let mut line = serde_json::to_vec(task)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        self.len = self.file.metadata()?.len();
        Ok(())
    }

    /// Current log size in bytes.
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
