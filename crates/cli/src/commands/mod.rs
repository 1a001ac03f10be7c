// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands: thin wrappers over the daemon's verb surface.

pub mod chaos;
pub mod daemon;
pub mod page;
pub mod proc;
pub mod proxy;
pub mod proxylog;
pub mod run;
pub mod session;

use anyhow::Result;

use crate::client::DaemonClient;

/// `spot ping` — autostarts the daemon and checks it answers.
pub async fn ping() -> Result<()> {
    let client = DaemonClient::for_action()?;
    client.ping().await?;
    println!("ok");
    Ok(())
}
