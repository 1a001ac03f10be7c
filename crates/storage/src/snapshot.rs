// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compacted task snapshot sidecar.
//!
//! Written during compaction and at shutdown checkpoint. The snapshot
//! holds every task worth remembering; recovery loads it and replays
//! the (freshly truncated) log over it. zstd-compressed JSON, written
//! atomically: temp file, fsync, rename.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_core::ScheduledTask;
use thiserror::Error;
use tracing::warn;

/// zstd level 3: fast with a reasonable ratio for JSON.
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub tasks: Vec<ScheduledTask>,
    pub created_at: DateTime<Utc>,
}

/// Save a snapshot atomically.
pub fn save_snapshot(path: &Path, tasks: &[ScheduledTask]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let snapshot = TaskSnapshot {
        tasks: tasks.to_vec(),
        created_at: Utc::now(),
    };
    let json = serde_json::to_vec(&snapshot)?;

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        zstd::stream::copy_encode(&json[..], &mut writer, COMPRESSION_LEVEL)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    // Make the rename durable across power loss.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Load the snapshot if present.
///
/// A corrupt snapshot is rotated to `.bak` and recovery proceeds from
/// the log alone.
pub fn load_snapshot(path: &Path) -> Result<Option<TaskSnapshot>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let decoded = match zstd::stream::decode_all(reader) {
        Ok(bytes) => bytes,
        Err(e) => {
            rotate_corrupt(path, &e.to_string())?;
            return Ok(None);
        }
    };
    match serde_json::from_slice(&decoded) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            rotate_corrupt(path, &e.to_string())?;
            Ok(None)
        }
    }
}

fn rotate_corrupt(path: &Path, error: &str) -> Result<(), SnapshotError> {
    let bak_path = rotate_bak_path(path);
    warn!(
        error,
        path = %path.display(),
        bak = %bak_path.display(),
        "Corrupt task snapshot, moving to .bak and recovering from log",
    );
    fs::rename(path, &bak_path)?;
    Ok(())
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
