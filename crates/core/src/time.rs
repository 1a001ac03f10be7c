// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration parsing and elapsed-time formatting.
//!
//! Filters accept either RFC3339 instants or relative durations like
//! `"90s"`, `"5m"`, `"2h"`, `"1d"` (interpreted as that long ago).

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Parse `"500ms"`, `"90s"`, `"5m"`, `"2h"`, or `"1d"` into a duration.
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => s.split_at(pos),
        None => (s, "s"),
    };
    let n: u64 = number.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" | "sec" => Some(Duration::from_secs(n)),
        "m" | "min" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        "d" => Some(Duration::from_secs(n * 86400)),
        _ => None,
    }
}

/// Parse a point in time: RFC3339, or a duration meaning "that long
/// before `now`".
pub fn parse_point(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    let ago = parse_duration(s)?;
    let ago = chrono::Duration::from_std(ago).ok()?;
    Some(now - ago)
}

/// Format seconds as a short human-readable duration: `"5s"`, `"2m"`,
/// `"1h30m"`, `"3d"`.
pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        if m > 0 {
            format!("{h}h{m}m")
        } else {
            format!("{h}h")
        }
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod tests;
