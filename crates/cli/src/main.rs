// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! spot - Spotter CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod daemon_process;
mod env;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::client::ClientError;
use commands::{chaos, daemon, page, proc, proxy, proxylog, run, session};

/// Exit code when the daemon is not running.
pub const EXIT_NOT_RUNNING: i32 = 2;
/// Exit code when the daemon is already running.
pub const EXIT_ALREADY_RUNNING: i32 = 3;

#[derive(Parser)]
#[command(
    name = "spot",
    version,
    about = "Spotter - watch and drive a local web-dev session"
)]
struct Cli {
    /// Daemon socket path override
    #[arg(long = "socket", global = true, value_name = "PATH")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon answers
    Ping,
    /// Daemon lifecycle control
    Daemon(daemon::DaemonArgs),
    /// Run a process under daemon management
    Run(run::RunArgs),
    /// Managed process inspection and control
    Proc(proc::ProcArgs),
    /// Reverse proxy management
    Proxy(proxy::ProxyArgs),
    /// Query a proxy's traffic log
    Proxylog(proxylog::ProxylogArgs),
    /// Page sessions captured by a proxy
    Page(page::PageArgs),
    /// Chaos fault injection
    Chaos(chaos::ChaosArgs),
    /// Agent session registry and scheduled messages
    Session(session::SessionArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The socket flag travels via env so every layer (client,
    // autostart, spawned daemon) agrees on the path.
    if let Some(socket) = &cli.socket {
        std::env::set_var("SPOT_SOCKET", socket);
    }

    let result = match cli.command {
        Commands::Ping => commands::ping().await,
        Commands::Daemon(args) => daemon::run(args).await,
        Commands::Run(args) => run::run(args).await,
        Commands::Proc(args) => proc::run(args).await,
        Commands::Proxy(args) => proxy::run(args).await,
        Commands::Proxylog(args) => proxylog::run(args).await,
        Commands::Page(args) => page::run(args).await,
        Commands::Chaos(args) => chaos::run(args).await,
        Commands::Session(args) => session::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(exit_code_for(&e));
    }
}

/// Map failures to the documented exit codes.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ClientError>() {
        Some(ClientError::DaemonNotRunning) => EXIT_NOT_RUNNING,
        _ => 1,
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
