// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot proxy` — reverse proxy management.

use anyhow::Result;
use clap::{Args, Subcommand};
use spot_daemon::protocol::{ProxyConfig, ProxyStatus, ToastPayload};

use crate::client::DaemonClient;
use crate::output::json_line;

#[derive(Args)]
pub struct ProxyArgs {
    #[command(subcommand)]
    command: ProxyCommand,
}

#[derive(Subcommand)]
enum ProxyCommand {
    /// Start a proxy in front of a dev server
    Start {
        id: String,
        target_url: String,
        /// Listen port (stable hash of the target when omitted)
        #[arg(long)]
        port: Option<u16>,
        /// Listen address (default 127.0.0.1)
        #[arg(long)]
        bind: Option<String>,
        /// Public origin for tunneled access (URL rewriting)
        #[arg(long)]
        public_url: Option<String>,
        /// Traffic log capacity in entries
        #[arg(long)]
        max_log_size: Option<usize>,
    },
    /// Stop a proxy
    Stop { id: String },
    /// Show a proxy's status
    Status { id: String },
    /// List running proxies
    List,
    /// Run JavaScript in the connected browser tabs
    Exec {
        id: String,
        code: String,
        /// Browser response timeout in milliseconds (max 30000)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Show a notification in the connected browser tabs
    Toast {
        id: String,
        title: String,
        message: String,
        /// Notification level (info/warn/error)
        #[arg(long)]
        level: Option<String>,
        /// Display duration in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}

pub async fn run(args: ProxyArgs) -> Result<()> {
    match args.command {
        ProxyCommand::Start {
            id,
            target_url,
            port,
            bind,
            public_url,
            max_log_size,
        } => {
            let client = DaemonClient::for_action()?;
            let status = client
                .proxy_start(
                    &id,
                    &target_url,
                    ProxyConfig {
                        port,
                        bind_address: bind,
                        public_url,
                        max_log_size,
                        body_excerpt: None,
                    },
                )
                .await?;
            println!(
                "{} listening on {} -> {}",
                status.id,
                status.listen_addr.as_deref().unwrap_or("?"),
                status.target_url
            );
            Ok(())
        }
        ProxyCommand::Stop { id } => {
            let client = DaemonClient::for_query()?;
            client.proxy_stop(&id).await?;
            println!("{id} stopped");
            Ok(())
        }
        ProxyCommand::Status { id } => {
            let client = DaemonClient::for_query()?;
            print_status(&client.proxy_status(&id).await?);
            Ok(())
        }
        ProxyCommand::List => {
            let client = DaemonClient::for_query()?;
            let proxies = client.proxy_list().await?;
            if proxies.is_empty() {
                println!("no proxies");
            }
            for status in proxies {
                println!(
                    "{:<16} {:<22} -> {:<28} clients={} entries={}",
                    status.id,
                    status.listen_addr.as_deref().unwrap_or("?"),
                    status.target_url,
                    status.browser_clients,
                    status.traffic.total,
                );
            }
            Ok(())
        }
        ProxyCommand::Exec {
            id,
            code,
            timeout_ms,
        } => {
            let client = DaemonClient::for_query()?;
            let (result, error) = client.proxy_exec(&id, &code, timeout_ms).await?;
            if let Some(error) = error {
                eprintln!("browser error: {error}");
                std::process::exit(1);
            }
            match result {
                Some(value) => println!("{}", json_line(&value)),
                None => println!("null"),
            }
            Ok(())
        }
        ProxyCommand::Toast {
            id,
            title,
            message,
            level,
            duration_ms,
        } => {
            let client = DaemonClient::for_query()?;
            let delivered = client
                .proxy_toast(
                    &id,
                    ToastPayload {
                        level,
                        title,
                        message,
                        duration_ms,
                    },
                )
                .await?;
            println!("delivered to {delivered} tab(s)");
            Ok(())
        }
    }
}

fn print_status(status: &ProxyStatus) {
    println!("id:          {}", status.id);
    println!("target:      {}", status.target_url);
    println!(
        "listen:      {}",
        status.listen_addr.as_deref().unwrap_or("?")
    );
    if let Some(public_url) = &status.public_url {
        println!("public:      {public_url}");
    }
    println!("clients:     {}", status.browser_clients);
    println!("restarts:    {}", status.restart_count);
    println!(
        "traffic:     {} entries ({} dropped)",
        status.traffic.total, status.traffic.dropped
    );
    if status.failed {
        println!("state:       FAILED");
    }
    if let Some(last_error) = &status.last_error {
        println!("last error:  {last_error}");
    }
}
