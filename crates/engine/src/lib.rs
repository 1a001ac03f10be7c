// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! spot-engine: process supervision, scheduled delivery, and session
//! bookkeeping for the Spotter daemon.

pub mod ports;
pub mod proc;
pub mod sched;
pub mod sessions;
pub mod subprocess;

pub use ports::cleanup_port;
pub use proc::{OutputResult, ProcessHandle, ProcessManager, ProcConfig};
pub use sched::{Scheduler, TaskFilter};
pub use sessions::SessionRegistry;
