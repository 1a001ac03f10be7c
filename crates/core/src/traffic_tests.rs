// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

fn http(url: &str, method: &str, status: u16, at: i64) -> TrafficEntry {
    TrafficEntry::Http {
        method: method.to_string(),
        url: url.to_string(),
        status,
        duration_ms: 12,
        req_headers: Vec::new(),
        resp_headers: Vec::new(),
        req_body: None,
        resp_body: None,
        timestamp: ts(at),
    }
}

fn error(message: &str, at: i64) -> TrafficEntry {
    TrafficEntry::Error {
        message: message.to_string(),
        source: None,
        line: None,
        column: None,
        stack: None,
        url: None,
        user_agent: None,
        timestamp: ts(at),
    }
}

#[test]
fn total_plus_dropped_equals_appends() {
    let mut log = TrafficLog::new(3);
    for i in 0..10 {
        log.append(http("http://localhost:3000/", "GET", 200, i));
    }
    let stats = log.stats();
    assert_eq!(stats.total + stats.dropped, 10);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.dropped, 7);
}

#[test]
fn eviction_removes_oldest() {
    let mut log = TrafficLog::new(2);
    log.append(http("http://x/1", "GET", 200, 0));
    log.append(http("http://x/2", "GET", 200, 1));
    log.append(http("http://x/3", "GET", 200, 2));
    let (entries, _) = log.query(&TrafficFilter::default());
    let urls: Vec<_> = entries
        .iter()
        .filter_map(|e| match e {
            TrafficEntry::Http { url, .. } => Some(url.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(urls, ["http://x/2", "http://x/3"]);
}

#[test]
fn filter_by_type() {
    let mut log = TrafficLog::new(10);
    log.append(http("http://x/", "GET", 200, 0));
    log.append(error("boom", 1));
    let filter = TrafficFilter {
        types: Some(vec![TrafficKind::Error]),
        ..Default::default()
    };
    let (entries, _) = log.query(&filter);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind(), TrafficKind::Error);
}

#[test]
fn filter_by_method_and_status() {
    let mut log = TrafficLog::new(10);
    log.append(http("http://x/a", "GET", 200, 0));
    log.append(http("http://x/b", "POST", 500, 1));
    log.append(http("http://x/c", "POST", 200, 2));
    let filter = TrafficFilter {
        methods: Some(vec!["post".to_string()]),
        status_codes: Some(vec![500]),
        ..Default::default()
    };
    let (entries, _) = log.query(&filter);
    assert_eq!(entries.len(), 1);
    match &entries[0] {
        TrafficEntry::Http { url, .. } => assert_eq!(url, "http://x/b"),
        other => panic!("unexpected entry: {other:?}"),
    }
}

#[test]
fn filter_by_url_substring_and_window() {
    let mut log = TrafficLog::new(10);
    log.append(http("http://x/api/users", "GET", 200, 0));
    log.append(http("http://x/api/users", "GET", 200, 100));
    log.append(http("http://x/static/app.js", "GET", 200, 100));
    let filter = TrafficFilter {
        url_pattern: Some("/api/".to_string()),
        since: Some(ts(50)),
        ..Default::default()
    };
    let (entries, _) = log.query(&filter);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].timestamp(), ts(100));
}

#[test]
fn query_limit_returns_most_recent() {
    let mut log = TrafficLog::new(10);
    for i in 0..5 {
        log.append(http(&format!("http://x/{i}"), "GET", 200, i));
    }
    let filter = TrafficFilter {
        limit: Some(2),
        ..Default::default()
    };
    let (entries, _) = log.query(&filter);
    assert_eq!(entries.len(), 2);
    // Oldest-first within the returned window.
    assert_eq!(entries[0].timestamp(), ts(3));
    assert_eq!(entries[1].timestamp(), ts(4));
}

#[test]
fn clear_resets_counts() {
    let mut log = TrafficLog::new(1);
    log.append(error("a", 0));
    log.append(error("b", 1));
    log.clear();
    let stats = log.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn excerpt_truncates_text() {
    let excerpt = BodyExcerpt::capture("hello world".as_bytes(), 5);
    assert_eq!(excerpt.content, "hello");
    assert!(excerpt.truncated);
    assert!(!excerpt.base64);
}

#[test]
fn excerpt_tags_binary_as_base64() {
    let excerpt = BodyExcerpt::capture(&[0xff, 0xfe, 0x00, 0x01], 10);
    assert!(excerpt.base64);
    assert!(!excerpt.truncated);
}

#[test]
fn excerpt_survives_split_utf8_boundary() {
    // "héllo" truncated mid-é must not be declared binary.
    let bytes = "héllo".as_bytes();
    let excerpt = BodyExcerpt::capture(bytes, 2);
    assert!(!excerpt.base64);
    assert_eq!(excerpt.content, "h");
}

#[test]
fn entry_serde_round_trip() {
    let entry = http("http://localhost:3000/", "GET", 200, 0);
    let json = serde_json::to_string(&entry).unwrap();
    assert!(json.contains("\"type\":\"http\""));
    let back: TrafficEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, entry);
}
