// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot run` — spawn a process under daemon management.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use spot_daemon::protocol::Response;
use spot_daemon::{RunMode, RunParams};

use crate::client::DaemonClient;

#[derive(Args)]
pub struct RunArgs {
    /// Process id (generated when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Project directory to run in
    #[arg(long, value_name = "DIR")]
    path: Option<PathBuf>,

    /// Package script name (default mode)
    #[arg(conflicts_with = "raw")]
    script: Option<String>,

    /// Treat the trailing arguments as a verbatim command
    #[arg(long)]
    raw: bool,

    /// Run in the foreground and wait for exit
    #[arg(long)]
    wait: bool,

    /// KEY=VALUE environment entries
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Command and arguments after `--` (raw mode)
    #[arg(last = true)]
    command: Vec<String>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut env = HashMap::new();
    for pair in &args.env {
        match pair.split_once('=') {
            Some((k, v)) => {
                env.insert(k.to_string(), v.to_string());
            }
            None => bail!("bad --env entry (expected KEY=VALUE): {pair}"),
        }
    }

    let params = if args.raw {
        let Some((command, rest)) = args.command.split_first() else {
            bail!("raw mode requires a command after --");
        };
        RunParams {
            id: args.id,
            path: args.path,
            mode: if args.wait { RunMode::FgRaw } else { RunMode::Bg },
            raw: true,
            command: Some(command.clone()),
            args: rest.to_vec(),
            env,
            ..Default::default()
        }
    } else {
        let Some(script) = args.script else {
            bail!("either a script name or --raw -- <command> is required");
        };
        RunParams {
            id: args.id,
            path: args.path,
            mode: if args.wait { RunMode::FgRaw } else { RunMode::Bg },
            script_name: Some(script),
            args: args.command,
            env,
            ..Default::default()
        }
    };

    let client = DaemonClient::for_action()?;
    match client.run(params).await? {
        Response::ProcStarted { status } => {
            println!("{} {} (pid {})", status.id, status.state, status.pid.unwrap_or(0));
            Ok(())
        }
        Response::RunCompleted {
            status,
            stdout,
            stderr,
        } => {
            print!("{stdout}");
            eprint!("{stderr}");
            match status.exit_code {
                Some(0) => Ok(()),
                Some(code) => std::process::exit(code),
                None => bail!("process ended without an exit code"),
            }
        }
        _ => bail!("unexpected response from daemon"),
    }
}
