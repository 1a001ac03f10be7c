// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chaos-rule evaluation on the request path.
//!
//! Rules are evaluated in table order; each matching rule fires with
//! its probability. Effects compose: latency accumulates, the first
//! short-circuit (error/disconnect/rate-limit) wins, bandwidth takes
//! the tightest cap.

use std::time::Duration;

use spot_core::{ChaosKind, ChaosRule};

/// A short-circuiting effect that preempts forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    /// Reply immediately with this status.
    Status(u16),
    /// Drop the client connection mid-response.
    Disconnect,
}

/// Net effect of the rule table on one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChaosOutcome {
    pub delay: Duration,
    pub short_circuit: Option<ShortCircuit>,
    pub bandwidth: Option<u64>,
    pub stale_secs: Option<u64>,
}

impl ChaosOutcome {
    pub fn is_noop(&self) -> bool {
        *self == ChaosOutcome::default()
    }
}

/// Evaluate the rule table against a request URL.
pub fn evaluate(rules: &[ChaosRule], url: &str) -> ChaosOutcome {
    evaluate_with(rules, url, |p| rand::random::<f64>() < p)
}

/// Evaluation with an injectable sampler so tests are deterministic.
pub fn evaluate_with(
    rules: &[ChaosRule],
    url: &str,
    mut fires: impl FnMut(f64) -> bool,
) -> ChaosOutcome {
    let mut outcome = ChaosOutcome::default();

    for rule in rules {
        if !rule.matches(url) || !fires(rule.probability.clamp(0.0, 1.0)) {
            continue;
        }
        match rule.kind {
            ChaosKind::Latency => {
                let base = rule.latency_ms.unwrap_or(0);
                let jitter = match rule.jitter_ms {
                    Some(j) if j > 0 => rand::random_range(0..=j),
                    _ => 0,
                };
                outcome.delay += Duration::from_millis(base + jitter);
            }
            ChaosKind::ErrorInjection => {
                outcome
                    .short_circuit
                    .get_or_insert(ShortCircuit::Status(rule.status.unwrap_or(500)));
            }
            ChaosKind::RateLimit => {
                outcome
                    .short_circuit
                    .get_or_insert(ShortCircuit::Status(rule.status.unwrap_or(429)));
            }
            ChaosKind::Disconnect | ChaosKind::PacketLoss => {
                outcome.short_circuit.get_or_insert(ShortCircuit::Disconnect);
            }
            ChaosKind::Bandwidth => {
                if let Some(cap) = rule.bytes_per_sec {
                    outcome.bandwidth = Some(match outcome.bandwidth {
                        Some(existing) => existing.min(cap),
                        None => cap,
                    });
                }
            }
            ChaosKind::Stale => {
                outcome.stale_secs = Some(rule.stale_secs.unwrap_or(3600));
            }
        }
    }

    outcome
}

/// Canonical one-line summary of a rule set (returned by CHAOS.APPLY).
pub fn digest(rules: &[ChaosRule]) -> Vec<String> {
    rules
        .iter()
        .map(|r| {
            let mut s = format!("{}:{}", r.kind, r.id);
            if r.probability < 1.0 {
                s.push_str(&format!(" p={}", r.probability));
            }
            if let Some(pattern) = &r.url_pattern {
                s.push_str(&format!(" url~{pattern}"));
            }
            s
        })
        .collect()
}

#[cfg(test)]
#[path = "chaos_tests.rs"]
mod tests;
