// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chaos-rule types for request fault injection.
//!
//! Rules are data; evaluation (sampling, delays, short-circuits) lives
//! in the proxy engine where the request path runs.

use serde::{Deserialize, Serialize};

/// Fault categories a rule can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosKind {
    Latency,
    ErrorInjection,
    PacketLoss,
    Bandwidth,
    Disconnect,
    Stale,
    RateLimit,
}

impl std::fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChaosKind::Latency => "latency",
            ChaosKind::ErrorInjection => "error",
            ChaosKind::PacketLoss => "packet-loss",
            ChaosKind::Bandwidth => "bandwidth",
            ChaosKind::Disconnect => "disconnect",
            ChaosKind::Stale => "stale",
            ChaosKind::RateLimit => "rate-limit",
        };
        write!(f, "{s}")
    }
}

/// One matcher + probability + effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosRule {
    pub id: String,
    pub kind: ChaosKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Substring the request URL must contain; absent matches everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    /// Firing probability in [0, 1].
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Added delay for Latency rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Uniform jitter added on top of `latency_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u64>,
    /// Status returned by ErrorInjection and RateLimit rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Throughput ceiling for Bandwidth rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_per_sec: Option<u64>,
    /// Max-age seconds a Stale rule forces onto responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_probability() -> f64 {
    1.0
}

impl ChaosRule {
    pub fn new(id: impl Into<String>, kind: ChaosKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            url_pattern: None,
            probability: 1.0,
            latency_ms: None,
            jitter_ms: None,
            status: None,
            bytes_per_sec: None,
            stale_secs: None,
        }
    }

    /// Does this rule apply to the given URL at all?
    pub fn matches(&self, url: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.url_pattern {
            Some(pattern) => url.contains(pattern.as_str()),
            None => true,
        }
    }
}

/// Expand a named preset into its canonical rule list.
pub fn preset(name: &str) -> Option<Vec<ChaosRule>> {
    let rules = match name {
        "slow-3g" => vec![
            ChaosRule {
                latency_ms: Some(400),
                jitter_ms: Some(200),
                ..ChaosRule::new("slow-3g-latency", ChaosKind::Latency)
            },
            ChaosRule {
                bytes_per_sec: Some(50_000),
                ..ChaosRule::new("slow-3g-bandwidth", ChaosKind::Bandwidth)
            },
        ],
        "flaky-api" => vec![
            ChaosRule {
                url_pattern: Some("/api/".to_string()),
                probability: 0.2,
                status: Some(500),
                ..ChaosRule::new("flaky-api-errors", ChaosKind::ErrorInjection)
            },
            ChaosRule {
                url_pattern: Some("/api/".to_string()),
                probability: 0.1,
                ..ChaosRule::new("flaky-api-drops", ChaosKind::Disconnect)
            },
        ],
        "rate-limited" => vec![ChaosRule {
            probability: 0.5,
            status: Some(429),
            ..ChaosRule::new("rate-limited", ChaosKind::RateLimit)
        }],
        "offline" => vec![ChaosRule {
            ..ChaosRule::new("offline", ChaosKind::Disconnect)
        }],
        _ => return None,
    };
    Some(rules)
}

#[cfg(test)]
#[path = "chaos_tests.rs"]
mod tests;
