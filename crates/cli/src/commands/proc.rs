// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot proc` — inspect and control managed processes.

use anyhow::Result;
use clap::{Args, Subcommand};
use spot_core::{OutputFilter, ProcessState, StreamSelect};

use crate::client::DaemonClient;
use crate::output::proc_row;

#[derive(Args)]
pub struct ProcArgs {
    #[command(subcommand)]
    command: ProcCommand,
}

#[derive(Subcommand)]
enum ProcCommand {
    /// Show one process's status
    Status { id: String },
    /// Show captured output
    Output {
        id: String,
        /// Stream: stdout, stderr, or combined
        #[arg(long, default_value = "combined")]
        stream: String,
        /// Keep only lines matching this regex
        #[arg(long)]
        grep: Option<String>,
        /// Invert the grep
        #[arg(long, short = 'v')]
        invert: bool,
        /// First N lines (after grep)
        #[arg(long)]
        head: Option<usize>,
        /// Last N lines (after grep/head)
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Stop a running process (TERM then KILL)
    Stop {
        id: String,
        /// Skip TERM and kill immediately
        #[arg(long)]
        force: bool,
    },
    /// List managed processes
    List {
        /// Filter by state (pending/starting/running/stopping/stopped/failed)
        #[arg(long)]
        state: Option<String>,
    },
    /// Kill whatever is listening on a port
    CleanupPort { port: u16 },
}

pub async fn run(args: ProcArgs) -> Result<()> {
    match args.command {
        ProcCommand::Status { id } => {
            let client = DaemonClient::for_query()?;
            let status = client.proc_status(&id).await?;
            println!("{}", proc_row(&status));
            Ok(())
        }
        ProcCommand::Output {
            id,
            stream,
            grep,
            invert,
            head,
            tail,
        } => {
            let client = DaemonClient::for_query()?;
            let filter = OutputFilter {
                stream: parse_stream(&stream)?,
                grep,
                invert,
                head,
                tail,
            };
            let out = client.proc_output(&id, filter).await?;
            print!("{}", out.text);
            if out.truncated {
                eprintln!("(output truncated: {} bytes dropped)", out.dropped);
            }
            Ok(())
        }
        ProcCommand::Stop { id, force } => {
            let client = DaemonClient::for_query()?;
            let status = client.proc_stop(&id, force).await?;
            println!("{} {}", status.id, status.state);
            Ok(())
        }
        ProcCommand::List { state } => {
            let client = DaemonClient::for_query()?;
            let state = state.as_deref().map(parse_state).transpose()?;
            let procs = client.proc_list(state).await?;
            if procs.is_empty() {
                println!("no processes");
            }
            for status in procs {
                println!("{}", proc_row(&status));
            }
            Ok(())
        }
        ProcCommand::CleanupPort { port } => {
            let client = DaemonClient::for_action()?;
            let killed = client.cleanup_port(port).await?;
            if killed.is_empty() {
                println!("port {port} is free");
            } else {
                let pids: Vec<String> = killed.iter().map(|p| p.to_string()).collect();
                println!("killed {} on port {port}", pids.join(", "));
            }
            Ok(())
        }
    }
}

fn parse_stream(s: &str) -> Result<StreamSelect> {
    match s {
        "stdout" => Ok(StreamSelect::Stdout),
        "stderr" => Ok(StreamSelect::Stderr),
        "combined" => Ok(StreamSelect::Combined),
        other => anyhow::bail!("unknown stream: {other}"),
    }
}

fn parse_state(s: &str) -> Result<ProcessState> {
    match s {
        "pending" => Ok(ProcessState::Pending),
        "starting" => Ok(ProcessState::Starting),
        "running" => Ok(ProcessState::Running),
        "stopping" => Ok(ProcessState::Stopping),
        "stopped" => Ok(ProcessState::Stopped),
        "failed" => Ok(ProcessState::Failed),
        other => anyhow::bail!("unknown state: {other}"),
    }
}

#[cfg(test)]
#[path = "proc_tests.rs"]
mod tests;
