// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn wire_error_display_includes_code() {
    let err = WireError::new(ErrorCode::NotFound, "unknown proxy: p1");
    assert_eq!(err.to_string(), "not-found: unknown proxy: p1");
}

#[test]
fn error_serde_round_trip() {
    let err = WireError::new(ErrorCode::NoClients, "no connected browsers");
    let json = serde_json::to_string(&err).unwrap();
    let back: WireError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}

#[test]
fn code_serde_is_pascal_case() {
    let json = serde_json::to_string(&ErrorCode::ShuttingDown).unwrap();
    assert_eq!(json, "\"ShuttingDown\"");
}
