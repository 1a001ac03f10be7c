// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn first_reply_wins() {
    let bus = ExecBus::new();
    let rx = bus.register("req-1");

    assert!(bus.complete(
        "req-1",
        ExecReply {
            result: Some(serde_json::json!(2)),
            error: None,
        }
    ));
    // Duplicate reply finds no waiter.
    assert!(!bus.complete(
        "req-1",
        ExecReply {
            result: Some(serde_json::json!(99)),
            error: None,
        }
    ));

    let reply = rx.await.unwrap();
    assert_eq!(reply.result, Some(serde_json::json!(2)));
}

#[tokio::test]
async fn unknown_request_id_is_ignored() {
    let bus = ExecBus::new();
    assert!(!bus.complete(
        "never-registered",
        ExecReply {
            result: None,
            error: None,
        }
    ));
}

#[tokio::test]
async fn cancel_removes_waiter() {
    let bus = ExecBus::new();
    let rx = bus.register("req-1");
    bus.cancel("req-1");
    assert_eq!(bus.pending(), 0);
    assert!(rx.await.is_err());
}

#[tokio::test]
async fn cancel_all_unblocks_waiters() {
    let bus = ExecBus::new();
    let rx1 = bus.register("a");
    let rx2 = bus.register("b");
    bus.cancel_all();
    assert!(rx1.await.is_err());
    assert!(rx2.await.is_err());
}
