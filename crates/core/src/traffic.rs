// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-proxy bounded traffic store.
//!
//! A circular buffer of typed entries (not bytes): queries stay O(N)
//! scans with no deserialization, and eviction is entry-granular. The
//! `dropped` counter plus `stats.total` always equals the number of
//! append calls, so callers can trust the counts.

use std::collections::VecDeque;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on stored entries per proxy.
pub const DEFAULT_TRAFFIC_CAP: usize = 1000;

/// Default cap on stored request/response body excerpts (10 KiB).
pub const DEFAULT_BODY_EXCERPT: usize = 10 * 1024;

/// Entry discriminant used in filters and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficKind {
    Http,
    Error,
    Performance,
    Custom,
    Screenshot,
    Execution,
    Response,
    Lifecycle,
}

impl std::fmt::Display for TrafficKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrafficKind::Http => "http",
            TrafficKind::Error => "error",
            TrafficKind::Performance => "performance",
            TrafficKind::Custom => "custom",
            TrafficKind::Screenshot => "screenshot",
            TrafficKind::Execution => "execution",
            TrafficKind::Response => "response",
            TrafficKind::Lifecycle => "lifecycle",
        };
        write!(f, "{s}")
    }
}

/// A body excerpt captured for the log.
///
/// Text bodies are truncated to the excerpt cap; binary bodies are
/// base64-encoded and tagged so consumers can tell them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyExcerpt {
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub base64: bool,
}

impl BodyExcerpt {
    /// Excerpt up to `cap` bytes of a body.
    pub fn capture(bytes: &[u8], cap: usize) -> Self {
        let truncated = bytes.len() > cap;
        let head = &bytes[..bytes.len().min(cap)];
        match std::str::from_utf8(head) {
            Ok(text) => Self {
                content: text.to_string(),
                truncated,
                base64: false,
            },
            // Mid-chunk truncation can split a UTF-8 sequence; retry on
            // a char boundary before declaring the body binary.
            Err(e) if e.valid_up_to() > head.len().saturating_sub(4) => Self {
                content: String::from_utf8_lossy(&head[..e.valid_up_to()]).into_owned(),
                truncated,
                base64: false,
            },
            Err(_) => Self {
                content: base64::engine::general_purpose::STANDARD.encode(head),
                truncated,
                base64: true,
            },
        }
    }
}

/// One captured event in a proxy's traffic log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrafficEntry {
    /// A completed HTTP round trip through the proxy.
    Http {
        method: String,
        url: String,
        status: u16,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        req_headers: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        resp_headers: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req_body: Option<BodyExcerpt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resp_body: Option<BodyExcerpt>,
        timestamp: DateTime<Utc>,
    },
    /// A JavaScript error reported by an instrumented page.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_agent: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Navigation/paint/resource timings for one page load.
    Performance {
        url: String,
        #[serde(default)]
        navigation: serde_json::Value,
        #[serde(default)]
        paint: serde_json::Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        resources: Vec<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    /// Free-form message from the page (console bridge, app markers).
    Custom {
        level: String,
        message: String,
        #[serde(default)]
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// A screenshot captured in the browser (data already base64).
    Screenshot {
        name: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        timestamp: DateTime<Utc>,
    },
    /// JavaScript dispatched to connected browsers.
    Execution {
        request_id: String,
        code: String,
        timestamp: DateTime<Utc>,
    },
    /// The first browser reply to an execution request.
    Response {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Proxy lifecycle markers (started, restarted, client connected).
    Lifecycle {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl TrafficEntry {
    pub fn kind(&self) -> TrafficKind {
        match self {
            TrafficEntry::Http { .. } => TrafficKind::Http,
            TrafficEntry::Error { .. } => TrafficKind::Error,
            TrafficEntry::Performance { .. } => TrafficKind::Performance,
            TrafficEntry::Custom { .. } => TrafficKind::Custom,
            TrafficEntry::Screenshot { .. } => TrafficKind::Screenshot,
            TrafficEntry::Execution { .. } => TrafficKind::Execution,
            TrafficEntry::Response { .. } => TrafficKind::Response,
            TrafficEntry::Lifecycle { .. } => TrafficKind::Lifecycle,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TrafficEntry::Http { timestamp, .. }
            | TrafficEntry::Error { timestamp, .. }
            | TrafficEntry::Performance { timestamp, .. }
            | TrafficEntry::Custom { timestamp, .. }
            | TrafficEntry::Screenshot { timestamp, .. }
            | TrafficEntry::Execution { timestamp, .. }
            | TrafficEntry::Response { timestamp, .. }
            | TrafficEntry::Lifecycle { timestamp, .. } => *timestamp,
        }
    }

    fn url(&self) -> Option<&str> {
        match self {
            TrafficEntry::Http { url, .. } | TrafficEntry::Performance { url, .. } => Some(url),
            TrafficEntry::Error { url, .. } => url.as_deref(),
            _ => None,
        }
    }
}

/// Query filter over the traffic log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<TrafficKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<Vec<u16>>,
    /// Substring match against the entry's URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl TrafficFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    fn matches(&self, entry: &TrafficEntry) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&entry.kind()) {
                return false;
            }
        }
        if let Some(methods) = &self.methods {
            match entry {
                TrafficEntry::Http { method, .. } => {
                    if !methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        if let Some(codes) = &self.status_codes {
            match entry {
                TrafficEntry::Http { status, .. } => {
                    if !codes.contains(status) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        if let Some(pattern) = &self.url_pattern {
            match entry.url() {
                Some(url) if url.contains(pattern.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp() < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp() > until {
                return false;
            }
        }
        true
    }
}

/// Counts reported alongside query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficStats {
    /// Entries currently retained.
    pub total: u64,
    /// Entries evicted by the circular buffer.
    pub dropped: u64,
    pub by_type: Vec<(TrafficKind, u64)>,
}

/// Circular store of traffic entries.
#[derive(Debug)]
pub struct TrafficLog {
    entries: VecDeque<TrafficEntry>,
    cap: usize,
    dropped: u64,
}

impl TrafficLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
            dropped: 0,
        }
    }

    pub fn append(&mut self, entry: TrafficEntry) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }

    /// Most-recent entries matching the filter, oldest first, capped at
    /// the filter's limit (default 100).
    pub fn query(&self, filter: &TrafficFilter) -> (Vec<TrafficEntry>, TrafficStats) {
        let limit = filter.limit.unwrap_or(TrafficFilter::DEFAULT_LIMIT);
        let mut matched: Vec<TrafficEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        (matched, self.stats())
    }

    pub fn stats(&self) -> TrafficStats {
        let mut by_type: std::collections::HashMap<TrafficKind, u64> =
            std::collections::HashMap::new();
        for entry in &self.entries {
            *by_type.entry(entry.kind()).or_default() += 1;
        }
        let mut by_type: Vec<(TrafficKind, u64)> = by_type.into_iter().collect();
        by_type.sort_by_key(|(kind, _)| format!("{kind}"));
        TrafficStats {
            total: self.entries.len() as u64,
            dropped: self.dropped,
            by_type,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "traffic_tests.rs"]
mod tests;
