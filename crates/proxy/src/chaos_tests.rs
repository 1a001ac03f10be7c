// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use spot_core::ChaosRule;

fn always(_p: f64) -> bool {
    true
}

fn never(_p: f64) -> bool {
    false
}

#[test]
fn latency_accumulates() {
    let rules = vec![
        ChaosRule {
            latency_ms: Some(100),
            ..ChaosRule::new("a", ChaosKind::Latency)
        },
        ChaosRule {
            latency_ms: Some(50),
            ..ChaosRule::new("b", ChaosKind::Latency)
        },
    ];
    let outcome = evaluate_with(&rules, "http://x/", always);
    assert_eq!(outcome.delay, Duration::from_millis(150));
}

#[test]
fn first_short_circuit_wins() {
    let rules = vec![
        ChaosRule {
            status: Some(503),
            ..ChaosRule::new("err", ChaosKind::ErrorInjection)
        },
        ChaosRule {
            ..ChaosRule::new("drop", ChaosKind::Disconnect)
        },
    ];
    let outcome = evaluate_with(&rules, "http://x/", always);
    assert_eq!(outcome.short_circuit, Some(ShortCircuit::Status(503)));
}

#[test]
fn rate_limit_defaults_to_429() {
    let rules = vec![ChaosRule::new("rl", ChaosKind::RateLimit)];
    let outcome = evaluate_with(&rules, "http://x/", always);
    assert_eq!(outcome.short_circuit, Some(ShortCircuit::Status(429)));
}

#[test]
fn bandwidth_takes_tightest_cap() {
    let rules = vec![
        ChaosRule {
            bytes_per_sec: Some(100_000),
            ..ChaosRule::new("a", ChaosKind::Bandwidth)
        },
        ChaosRule {
            bytes_per_sec: Some(25_000),
            ..ChaosRule::new("b", ChaosKind::Bandwidth)
        },
    ];
    let outcome = evaluate_with(&rules, "http://x/", always);
    assert_eq!(outcome.bandwidth, Some(25_000));
}

#[test]
fn non_matching_url_is_noop() {
    let rules = vec![ChaosRule {
        url_pattern: Some("/api/".to_string()),
        status: Some(500),
        ..ChaosRule::new("err", ChaosKind::ErrorInjection)
    }];
    let outcome = evaluate_with(&rules, "http://x/static/app.js", always);
    assert!(outcome.is_noop());
}

#[test]
fn sampler_gates_effects() {
    let rules = vec![ChaosRule {
        latency_ms: Some(100),
        ..ChaosRule::new("a", ChaosKind::Latency)
    }];
    let outcome = evaluate_with(&rules, "http://x/", never);
    assert!(outcome.is_noop());
}

#[test]
fn packet_loss_behaves_like_disconnect() {
    let rules = vec![ChaosRule::new("pl", ChaosKind::PacketLoss)];
    let outcome = evaluate_with(&rules, "http://x/", always);
    assert_eq!(outcome.short_circuit, Some(ShortCircuit::Disconnect));
}

#[test]
fn digest_summarizes_rules() {
    let rules = vec![ChaosRule {
        url_pattern: Some("/api/".to_string()),
        probability: 0.2,
        status: Some(500),
        ..ChaosRule::new("flaky", ChaosKind::ErrorInjection)
    }];
    let lines = digest(&rules);
    assert_eq!(lines, vec!["error:flaky p=0.2 url~/api/".to_string()]);
}
