// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot session` — agent session registry and scheduled messages.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use spot_core::time::format_elapsed;

use crate::client::DaemonClient;

#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Register this session with the daemon
    Register {
        code: String,
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,
        #[arg(long)]
        command: Option<String>,
        /// Pipe that receives delivered messages as typed input
        #[arg(long, value_name = "PATH")]
        input_pipe: Option<PathBuf>,
        #[arg(long)]
        overlay: Option<String>,
    },
    /// Remove a session registration
    Unregister { code: String },
    /// Refresh a session's liveness
    Heartbeat { code: String },
    /// Deliver a message to a session now
    Send { code: String, message: String },
    /// Deliver a message to a session after a delay
    Schedule {
        code: String,
        /// Delay like "90s", "5m", "2h"
        duration: String,
        message: String,
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,
    },
    /// List scheduled tasks
    Tasks {
        /// Filter by status (pending/delivered/failed/cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Filter by session code
        #[arg(long)]
        code: Option<String>,
    },
    /// Cancel a pending task
    Cancel { task_id: String },
    /// List registered sessions
    List,
    /// Show one session
    Get { code: String },
}

pub async fn run(args: SessionArgs) -> Result<()> {
    match args.command {
        SessionCommand::Register {
            code,
            path,
            command,
            input_pipe,
            overlay,
        } => {
            let client = DaemonClient::for_action()?;
            let session = client
                .session_register(&code, path, command, Vec::new(), overlay, input_pipe)
                .await?;
            println!("registered {}", session.code);
            Ok(())
        }
        SessionCommand::Unregister { code } => {
            let client = DaemonClient::for_query()?;
            client.session_unregister(&code).await?;
            println!("unregistered {code}");
            Ok(())
        }
        SessionCommand::Heartbeat { code } => {
            let client = DaemonClient::for_query()?;
            client.session_heartbeat(&code).await?;
            Ok(())
        }
        SessionCommand::Send { code, message } => {
            let client = DaemonClient::for_query()?;
            client.session_send(&code, &message).await?;
            println!("sent");
            Ok(())
        }
        SessionCommand::Schedule {
            code,
            duration,
            message,
            path,
        } => {
            let client = DaemonClient::for_action()?;
            let task = client
                .session_schedule(&code, &duration, &message, path)
                .await?;
            println!("{} scheduled for {}", task.id, task.deliver_at.to_rfc3339());
            Ok(())
        }
        SessionCommand::Tasks { status, code } => {
            let client = DaemonClient::for_query()?;
            let tasks = client.session_tasks(status, code).await?;
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in tasks {
                let error = task
                    .last_error
                    .as_deref()
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default();
                println!(
                    "{:<14} {:<10} {} -> {} \"{}\"{}",
                    task.id,
                    task.status.to_string(),
                    task.deliver_at.format("%Y-%m-%d %H:%M:%S"),
                    task.session_code,
                    task.message,
                    error,
                );
            }
            Ok(())
        }
        SessionCommand::Cancel { task_id } => {
            let client = DaemonClient::for_query()?;
            let task = client.session_cancel(&task_id).await?;
            println!("{} {}", task.id, task.status);
            Ok(())
        }
        SessionCommand::List => {
            let client = DaemonClient::for_query()?;
            let sessions = client.session_list().await?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            let now = chrono::Utc::now();
            for session in sessions {
                let quiet = (now - session.last_seen_at).num_seconds().max(0) as u64;
                println!(
                    "{:<16} {:<7} last seen {} ago",
                    session.code,
                    format!("{:?}", session.status).to_lowercase(),
                    format_elapsed(quiet),
                );
            }
            Ok(())
        }
        SessionCommand::Get { code } => {
            let client = DaemonClient::for_query()?;
            let session = client.session_get(&code).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(())
        }
    }
}
