// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry and scheduled delivery, including across a daemon
//! restart.

use super::prelude::*;
use serial_test::serial;
use std::time::{Duration, Instant};

fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("timed out waiting for {what}");
}

#[test]
#[serial]
fn send_writes_to_the_input_pipe() {
    let sandbox = Sandbox::new();
    let pipe = sandbox.state_dir.join("input");
    std::fs::write(&pipe, b"").unwrap();

    sandbox.spot_ok(&[
        "session",
        "register",
        "s1",
        "--input-pipe",
        pipe.to_str().unwrap(),
    ]);
    sandbox.spot_ok(&["session", "send", "s1", "hello"]);
    assert_eq!(std::fs::read_to_string(&pipe).unwrap(), "hello\n");
}

#[test]
#[serial]
fn scheduled_message_arrives_after_the_delay() {
    let sandbox = Sandbox::new();
    let pipe = sandbox.state_dir.join("input");
    std::fs::write(&pipe, b"").unwrap();

    sandbox.spot_ok(&[
        "session",
        "register",
        "s1",
        "--input-pipe",
        pipe.to_str().unwrap(),
    ]);
    sandbox.spot_ok(&["session", "schedule", "s1", "1s", "ding"]);

    wait_for("delivery", || {
        std::fs::read_to_string(&pipe).unwrap() == "ding\n"
    });

    let out = sandbox.spot_ok(&["session", "tasks", "--status", "delivered"]);
    assert!(out.contains("ding"), "tasks: {out}");
}

#[test]
#[serial]
fn scheduled_delivery_survives_daemon_restart() {
    let sandbox = Sandbox::new();
    let pipe = sandbox.state_dir.join("input");
    std::fs::write(&pipe, b"").unwrap();

    sandbox.spot_ok(&[
        "session",
        "register",
        "s1",
        "--input-pipe",
        pipe.to_str().unwrap(),
    ]);
    sandbox.spot_ok(&["session", "schedule", "s1", "2s", "hi"]);

    // Restart before the deadline; the task is persisted.
    sandbox.spot_ok(&["daemon", "stop"]);
    sandbox.wait_for_daemon_exit();
    sandbox.spot_ok(&["ping"]);

    // The session must re-register with the fresh daemon.
    sandbox.spot_ok(&[
        "session",
        "register",
        "s1",
        "--input-pipe",
        pipe.to_str().unwrap(),
    ]);

    wait_for("post-restart delivery", || {
        std::fs::read_to_string(&pipe).unwrap() == "hi\n"
    });

    // Exactly once: give a would-be duplicate time to land.
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(std::fs::read_to_string(&pipe).unwrap(), "hi\n");

    let out = sandbox.spot_ok(&["session", "tasks"]);
    assert!(out.contains("delivered"), "tasks: {out}");
}

#[test]
#[serial]
fn cancelled_task_is_never_delivered() {
    let sandbox = Sandbox::new();
    let pipe = sandbox.state_dir.join("input");
    std::fs::write(&pipe, b"").unwrap();

    sandbox.spot_ok(&[
        "session",
        "register",
        "s1",
        "--input-pipe",
        pipe.to_str().unwrap(),
    ]);
    let out = sandbox.spot_ok(&["session", "schedule", "s1", "1s", "never"]);
    let task_id = out.split_whitespace().next().unwrap().to_string();

    sandbox.spot_ok(&["session", "cancel", &task_id]);
    std::thread::sleep(Duration::from_millis(1500));
    assert_eq!(std::fs::read_to_string(&pipe).unwrap(), "");
}
