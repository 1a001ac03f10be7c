// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot daemon` — lifecycle control for spotd.

use anyhow::Result;
use clap::{Args, Subcommand};
use spot_core::time::format_elapsed;

use crate::client::{ClientError, DaemonClient};
use crate::daemon_process::{daemon_socket, probe_socket, read_daemon_pid, stop_daemon_sync};

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    command: DaemonCommand,
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Start the daemon if it is not already running
    Start,
    /// Stop the running daemon
    Stop,
    /// Show whether the daemon is running
    Status,
    /// Stop then start the daemon
    Restart,
    /// Show daemon version, uptime, and component counts
    Info,
}

pub async fn run(args: DaemonArgs) -> Result<()> {
    match args.command {
        DaemonCommand::Start => start().await,
        DaemonCommand::Stop => stop().await,
        DaemonCommand::Status => status().await,
        DaemonCommand::Restart => {
            let _ = stop().await;
            wait_for_exit();
            start().await
        }
        DaemonCommand::Info => info().await,
    }
}

/// Block until the old daemon has released its lock (pid gone or dead).
fn wait_for_exit() {
    use crate::daemon_process::process_exists;

    let deadline = std::time::Instant::now() + crate::client::timeout_exit();
    while std::time::Instant::now() < deadline {
        match read_daemon_pid() {
            Ok(Some(pid)) if process_exists(pid) => {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            _ => return,
        }
    }
}

async fn start() -> Result<()> {
    let socket = daemon_socket()?;
    if socket.exists() && probe_socket(&socket) {
        eprintln!("error: daemon is already running");
        std::process::exit(crate::EXIT_ALREADY_RUNNING);
    }

    let client = DaemonClient::for_action()?;
    client.ping().await?;
    if let Ok(Some(pid)) = read_daemon_pid() {
        println!("daemon started (pid {pid})");
    } else {
        println!("daemon started");
    }
    Ok(())
}

async fn stop() -> Result<()> {
    match DaemonClient::for_query() {
        Ok(client) => match client.shutdown().await {
            Ok(()) => {
                println!("daemon stopping");
                Ok(())
            }
            Err(ClientError::Io(_) | ClientError::Protocol(_)) => {
                // Socket answered nothing useful; fall back to signals.
                stop_daemon_sync();
                println!("daemon stopped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Err(ClientError::DaemonNotRunning) => {
            println!("daemon is not running");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn status() -> Result<()> {
    let socket = daemon_socket()?;
    if socket.exists() && probe_socket(&socket) {
        let pid = read_daemon_pid()?
            .map(|p| format!(" (pid {p})"))
            .unwrap_or_default();
        println!("running{pid}");
        Ok(())
    } else {
        println!("not running");
        std::process::exit(crate::EXIT_NOT_RUNNING);
    }
}

async fn info() -> Result<()> {
    let client = DaemonClient::for_query()?;
    let info = client.info().await?;
    println!("version:       {}", info.version);
    println!("uptime:        {}", format_elapsed(info.uptime_secs));
    println!("socket:        {}", info.socket_path.display());
    println!("processes:     {}", info.processes);
    println!("proxies:       {}", info.proxies);
    println!("sessions:      {}", info.sessions);
    println!("tasks pending: {}", info.tasks_pending);
    Ok(())
}
