// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use yare::parameterized;

#[parameterized(
    millis = { "500ms", 0.5 },
    seconds = { "90s", 90.0 },
    bare_number = { "45", 45.0 },
    minutes = { "5m", 300.0 },
    hours = { "2h", 7200.0 },
    days = { "1d", 86400.0 },
)]
fn durations_parse(input: &str, secs: f64) {
    assert_eq!(parse_duration(input).unwrap().as_secs_f64(), secs);
}

#[parameterized(
    empty = { "" },
    garbage = { "soon" },
    bad_unit = { "5y" },
    negative = { "-5s" },
)]
fn bad_durations_are_none(input: &str) {
    assert!(parse_duration(input).is_none());
}

#[test]
fn point_accepts_rfc3339() {
    let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let point = parse_point("2023-11-14T22:13:20Z", now).unwrap();
    assert_eq!(point, now);
}

#[test]
fn point_accepts_duration_ago() {
    let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let point = parse_point("5m", now).unwrap();
    assert_eq!(now - point, chrono::Duration::seconds(300));
}

#[parameterized(
    seconds = { 5, "5s" },
    minutes = { 120, "2m" },
    hours_flat = { 7200, "2h" },
    hours_minutes = { 5400, "1h30m" },
    days = { 86400 * 3, "3d" },
)]
fn elapsed_formats(secs: u64, expected: &str) {
    assert_eq!(format_elapsed(secs), expected);
}
