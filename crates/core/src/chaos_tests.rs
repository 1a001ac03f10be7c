// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn rule_without_pattern_matches_everything() {
    let rule = ChaosRule::new("r1", ChaosKind::Latency);
    assert!(rule.matches("http://localhost:3000/anything"));
}

#[test]
fn rule_pattern_is_substring_match() {
    let rule = ChaosRule {
        url_pattern: Some("/api/".to_string()),
        ..ChaosRule::new("r1", ChaosKind::ErrorInjection)
    };
    assert!(rule.matches("http://localhost:3000/api/users"));
    assert!(!rule.matches("http://localhost:3000/static/app.js"));
}

#[test]
fn disabled_rule_never_matches() {
    let rule = ChaosRule {
        enabled: false,
        ..ChaosRule::new("r1", ChaosKind::Latency)
    };
    assert!(!rule.matches("http://localhost:3000/"));
}

#[test]
fn presets_expand() {
    let rules = preset("slow-3g").unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].kind, ChaosKind::Latency);
    assert_eq!(rules[1].kind, ChaosKind::Bandwidth);

    assert!(preset("flaky-api").is_some());
    assert!(preset("rate-limited").is_some());
    assert!(preset("offline").is_some());
    assert!(preset("nonsense").is_none());
}

#[test]
fn rule_serde_round_trip() {
    let rule = ChaosRule {
        url_pattern: Some("/api/".to_string()),
        probability: 0.25,
        latency_ms: Some(100),
        ..ChaosRule::new("r1", ChaosKind::Latency)
    };
    let json = serde_json::to_string(&rule).unwrap();
    let back: ChaosRule = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rule);
}

#[test]
fn defaults_fill_in_on_deserialize() {
    let rule: ChaosRule =
        serde_json::from_str(r#"{"id": "r1", "kind": "latency"}"#).unwrap();
    assert!(rule.enabled);
    assert_eq!(rule.probability, 1.0);
}
