// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Page-session tracking.
//!
//! Groups HTTP traffic and browser telemetry into logical page views.
//! Attribution is heuristic: a resource joins the session whose
//! document URL matches its Referer, falling back to the most recent
//! same-origin session within a short window. A single-page app that
//! navigates without a document load keeps its current session until a
//! new HTML document arrives.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Max interactions recorded per session; beyond this only the count grows.
pub const INTERACTION_CAP: u32 = 200;
/// Max mutations recorded per session; beyond this only the count grows.
pub const MUTATION_CAP: u32 = 100;
/// Max live sessions retained (LRU by last activity).
pub const MAX_SESSIONS: usize = 100;
/// Quiet time before Active becomes Idle.
pub const IDLE_AFTER_SECS: i64 = 5 * 60;
/// Further quiet time before Idle becomes Closed.
pub const CLOSE_AFTER_SECS: i64 = 5 * 60;
/// Window for origin+recency resource attribution.
pub const RESOURCE_WINDOW_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Active,
    Idle,
    Closed,
}

/// Telemetry event categories delivered over the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    Error,
    Performance,
    Interaction,
    Mutation,
}

/// A sub-resource fetched during a page view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub url: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

/// An error attributed to a page view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One logical page view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSession {
    pub id: String,
    pub origin: String,
    pub document_url: String,
    /// Sub-resources in arrival order.
    pub resources: Vec<ResourceRef>,
    pub errors: Vec<PageError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<serde_json::Value>,
    pub interaction_count: u32,
    pub mutation_count: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub status: PageStatus,
    /// Browser tab identity carried on the control WebSocket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
}

/// Condensed listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: String,
    pub document_url: String,
    pub status: PageStatus,
    pub resource_count: usize,
    pub error_count: usize,
    pub interaction_count: u32,
    pub mutation_count: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Tracker owned by one proxy.
#[derive(Debug, Default)]
pub struct PageTracker {
    sessions: HashMap<String, PageSession>,
}

impl PageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new HTML document starts a new session.
    pub fn record_document(&mut self, url: &str, now: DateTime<Utc>) -> String {
        self.evict_to(MAX_SESSIONS - 1);
        let id = format!("page-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        self.sessions.insert(
            id.clone(),
            PageSession {
                id: id.clone(),
                origin: origin_of(url),
                document_url: url.to_string(),
                resources: Vec::new(),
                errors: Vec::new(),
                performance: None,
                interaction_count: 0,
                mutation_count: 0,
                started_at: now,
                last_activity_at: now,
                status: PageStatus::Active,
                tab_id: None,
            },
        );
        id
    }

    /// Attribute a sub-resource fetch, returning the session it joined.
    pub fn attach_resource(
        &mut self,
        url: &str,
        status: u16,
        referer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let id = self.resolve_for_resource(url, referer, now)?;
        if let Some(session) = self.sessions.get_mut(&id) {
            session.resources.push(ResourceRef {
                url: url.to_string(),
                status,
                timestamp: now,
            });
            touch(session, now);
        }
        Some(id)
    }

    /// Attribute a telemetry event from the control channel.
    pub fn record_event(
        &mut self,
        kind: TelemetryKind,
        tab_id: Option<&str>,
        url: Option<&str>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let id = self.resolve_for_event(tab_id, url)?;
        let session = self.sessions.get_mut(&id)?;
        if session.tab_id.is_none() {
            session.tab_id = tab_id.map(str::to_string);
        }
        match kind {
            TelemetryKind::Error => {
                session.errors.push(PageError {
                    message: payload
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("(no message)")
                        .to_string(),
                    source: payload
                        .get("source")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    timestamp: now,
                });
            }
            TelemetryKind::Performance => {
                session.performance = Some(payload);
            }
            TelemetryKind::Interaction => {
                session.interaction_count = (session.interaction_count + 1).min(INTERACTION_CAP);
            }
            TelemetryKind::Mutation => {
                session.mutation_count = (session.mutation_count + 1).min(MUTATION_CAP);
            }
        }
        touch(session, now);
        Some(id)
    }

    /// Age sessions: Active → Idle after 5 quiet minutes, Idle → Closed
    /// after 5 more.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        for session in self.sessions.values_mut() {
            let quiet = now - session.last_activity_at;
            session.status = if quiet >= Duration::seconds(IDLE_AFTER_SECS + CLOSE_AFTER_SECS) {
                PageStatus::Closed
            } else if quiet >= Duration::seconds(IDLE_AFTER_SECS) {
                PageStatus::Idle
            } else {
                session.status
            };
        }
    }

    /// Summaries ordered by most recent activity.
    pub fn list(&self) -> Vec<PageSummary> {
        let mut rows: Vec<PageSummary> = self
            .sessions
            .values()
            .map(|s| PageSummary {
                id: s.id.clone(),
                document_url: s.document_url.clone(),
                status: s.status,
                resource_count: s.resources.len(),
                error_count: s.errors.len(),
                interaction_count: s.interaction_count,
                mutation_count: s.mutation_count,
                started_at: s.started_at,
                last_activity_at: s.last_activity_at,
            })
            .collect();
        rows.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        rows
    }

    pub fn get(&self, id: &str) -> Option<&PageSession> {
        self.sessions.get(id)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Referer match wins; otherwise the most recent same-origin
    /// session with activity inside the attribution window.
    fn resolve_for_resource(
        &self,
        url: &str,
        referer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if let Some(referer) = referer {
            if let Some(session) = self
                .sessions
                .values()
                .filter(|s| s.document_url == referer)
                .max_by_key(|s| s.last_activity_at)
            {
                return Some(session.id.clone());
            }
        }
        let origin = origin_of(url);
        self.sessions
            .values()
            .filter(|s| s.origin == origin)
            .filter(|s| now - s.last_activity_at <= Duration::seconds(RESOURCE_WINDOW_SECS))
            .max_by_key(|s| s.last_activity_at)
            .map(|s| s.id.clone())
    }

    /// Tab identity wins; otherwise the most recent session on the
    /// event's origin, then the most recent session overall.
    fn resolve_for_event(&self, tab_id: Option<&str>, url: Option<&str>) -> Option<String> {
        if let Some(tab_id) = tab_id {
            if let Some(session) = self
                .sessions
                .values()
                .filter(|s| s.tab_id.as_deref() == Some(tab_id))
                .max_by_key(|s| s.last_activity_at)
            {
                return Some(session.id.clone());
            }
        }
        let candidates = self.sessions.values().filter(|s| match url {
            Some(url) => s.origin == origin_of(url),
            None => true,
        });
        candidates
            .max_by_key(|s| s.last_activity_at)
            .map(|s| s.id.clone())
            .or_else(|| {
                self.sessions
                    .values()
                    .max_by_key(|s| s.last_activity_at)
                    .map(|s| s.id.clone())
            })
    }

    /// Evict least-recently-active sessions down to `keep`.
    fn evict_to(&mut self, keep: usize) {
        while self.sessions.len() > keep {
            let oldest = self
                .sessions
                .values()
                .min_by_key(|s| s.last_activity_at)
                .map(|s| s.id.clone());
            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                }
                None => break,
            }
        }
    }
}

fn touch(session: &mut PageSession, now: DateTime<Utc>) {
    session.last_activity_at = now;
    session.status = PageStatus::Active;
}

/// `scheme://host[:port]` prefix of a URL, or the whole string when it
/// has no path.
fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(path_start) => url[..scheme_end + 3 + path_start].to_string(),
                None => url.to_string(),
            }
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
#[path = "page_tests.rs"]
mod tests;
