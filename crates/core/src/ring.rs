// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded output ring for captured process streams.
//!
//! Each managed process owns two rings (stdout, stderr). Chunks carry a
//! sequence number drawn from a counter shared by both rings, so a
//! combined snapshot can interleave the streams in arrival order.
//! Writes never block and are atomic per call; on overflow the oldest
//! chunks are evicted, the dropped-byte counter grows, and the overflow
//! flag latches until the ring is discarded with its process.

use std::collections::VecDeque;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default per-stream capacity (256 KiB).
pub const DEFAULT_RING_CAPACITY: usize = 256 * 1024;

/// Which stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Stream selection for output queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSelect {
    Stdout,
    Stderr,
    #[default]
    Combined,
}

/// Line filter applied to snapshot text, in fixed order: grep, head, tail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputFilter {
    #[serde(default)]
    pub stream: StreamSelect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grep: Option<String>,
    #[serde(default)]
    pub invert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<usize>,
}

impl OutputFilter {
    /// Apply grep/invert, then head, then tail to the given text.
    ///
    /// Operates on lines; a trailing newline is preserved when any
    /// lines survive, matching what a shell pipeline would print.
    pub fn apply(&self, text: &str) -> Result<String, regex::Error> {
        let mut lines: Vec<&str> = text.lines().collect();

        if let Some(pattern) = &self.grep {
            let re = Regex::new(pattern)?;
            lines.retain(|line| re.is_match(line) != self.invert);
        }

        if let Some(n) = self.head {
            lines.truncate(n);
        }

        if let Some(n) = self.tail {
            if lines.len() > n {
                lines.drain(..lines.len() - n);
            }
        }

        if lines.is_empty() {
            Ok(String::new())
        } else {
            let mut out = lines.join("\n");
            out.push('\n');
            Ok(out)
        }
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    seq: u64,
    bytes: Vec<u8>,
}

/// Point-in-time copy of a ring's contents.
#[derive(Debug, Clone, Default)]
pub struct RingSnapshot {
    chunks: Vec<(u64, Vec<u8>)>,
    /// Bytes evicted since the ring was created.
    pub dropped: u64,
    /// True once any byte has ever been evicted.
    pub truncated: bool,
}

impl RingSnapshot {
    /// Interleave two snapshots by sequence number (arrival order).
    pub fn merge(mut self, other: RingSnapshot) -> RingSnapshot {
        self.chunks.extend(other.chunks);
        self.chunks.sort_by_key(|(seq, _)| *seq);
        RingSnapshot {
            chunks: self.chunks,
            dropped: self.dropped + other.dropped,
            truncated: self.truncated || other.truncated,
        }
    }

    /// Concatenated contents as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        let mut buf = Vec::with_capacity(self.chunks.iter().map(|(_, b)| b.len()).sum());
        for (_, bytes) in &self.chunks {
            buf.extend_from_slice(bytes);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Fixed-capacity byte ring of tagged chunks.
#[derive(Debug)]
pub struct OutputRing {
    capacity: usize,
    chunks: VecDeque<Chunk>,
    used: usize,
    dropped: u64,
    overflowed: bool,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chunks: VecDeque::new(),
            used: 0,
            dropped: 0,
            overflowed: false,
        }
    }

    /// Append one chunk, evicting exactly as many of the oldest bytes
    /// as needed. After writing N+K bytes to a capacity-N ring, the
    /// ring holds the last N bytes and `dropped` equals K.
    ///
    /// A chunk larger than the whole ring keeps only its tail.
    pub fn write(&mut self, seq: u64, bytes: &[u8]) {
        let bytes = if bytes.len() > self.capacity {
            let cut = bytes.len() - self.capacity;
            self.dropped += cut as u64;
            self.overflowed = true;
            &bytes[cut..]
        } else {
            bytes
        };

        let mut need = (self.used + bytes.len()).saturating_sub(self.capacity);
        while need > 0 {
            match self.chunks.front_mut() {
                Some(front) if front.bytes.len() <= need => {
                    let evicted = front.bytes.len();
                    self.chunks.pop_front();
                    self.used -= evicted;
                    self.dropped += evicted as u64;
                    self.overflowed = true;
                    need -= evicted;
                }
                Some(front) => {
                    front.bytes.drain(..need);
                    self.used -= need;
                    self.dropped += need as u64;
                    self.overflowed = true;
                    need = 0;
                }
                None => break,
            }
        }

        self.used += bytes.len();
        self.chunks.push_back(Chunk {
            seq,
            bytes: bytes.to_vec(),
        });
    }

    /// Copy out the current contents.
    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            chunks: self
                .chunks
                .iter()
                .map(|c| (c.seq, c.bytes.clone()))
                .collect(),
            dropped: self.dropped,
            truncated: self.overflowed,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn len_bytes(&self) -> usize {
        self.used
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
