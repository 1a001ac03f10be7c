// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot proxylog` — query a proxy's captured traffic.

use anyhow::Result;
use clap::{Args, Subcommand};
use spot_core::{TrafficEntry, TrafficKind};
use spot_daemon::TrafficQuery;

use crate::client::DaemonClient;

#[derive(Args)]
pub struct ProxylogArgs {
    #[command(subcommand)]
    command: ProxylogCommand,
}

#[derive(Subcommand)]
enum ProxylogCommand {
    /// List matching traffic entries
    Query {
        proxy_id: String,
        /// Entry types (http, error, performance, custom, screenshot,
        /// execution, response, lifecycle)
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<String>,
        /// HTTP methods to keep
        #[arg(long = "method")]
        methods: Vec<String>,
        /// Status codes to keep
        #[arg(long = "status")]
        status_codes: Vec<u16>,
        /// URL substring filter
        #[arg(long)]
        url: Option<String>,
        /// Lower time bound (RFC3339 or e.g. "5m")
        #[arg(long)]
        since: Option<String>,
        /// Upper time bound (RFC3339 or e.g. "5m")
        #[arg(long)]
        until: Option<String>,
        /// Max entries (default 100)
        #[arg(long)]
        limit: Option<usize>,
        /// Print raw JSON entries
        #[arg(long)]
        json: bool,
    },
    /// Show counts by entry type
    Stats { proxy_id: String },
    /// Drop all captured entries
    Clear { proxy_id: String },
}

pub async fn run(args: ProxylogArgs) -> Result<()> {
    match args.command {
        ProxylogCommand::Query {
            proxy_id,
            types,
            methods,
            status_codes,
            url,
            since,
            until,
            limit,
            json,
        } => {
            let client = DaemonClient::for_query()?;
            let query = TrafficQuery {
                types: parse_types(&types)?,
                methods: (!methods.is_empty()).then_some(methods),
                status_codes: (!status_codes.is_empty()).then_some(status_codes),
                url_pattern: url,
                since,
                until,
                limit,
            };
            let (entries, stats) = client.log_query(&proxy_id, query).await?;
            for entry in &entries {
                if json {
                    println!("{}", serde_json::to_string(entry)?);
                } else {
                    println!("{}", entry_row(entry));
                }
            }
            eprintln!(
                "{} shown / {} retained / {} dropped",
                entries.len(),
                stats.total,
                stats.dropped
            );
            Ok(())
        }
        ProxylogCommand::Stats { proxy_id } => {
            let client = DaemonClient::for_query()?;
            let stats = client.log_stats(&proxy_id).await?;
            println!("total:   {}", stats.total);
            println!("dropped: {}", stats.dropped);
            for (kind, count) in stats.by_type {
                println!("{kind:<12} {count}");
            }
            Ok(())
        }
        ProxylogCommand::Clear { proxy_id } => {
            let client = DaemonClient::for_query()?;
            client.log_clear(&proxy_id).await?;
            println!("cleared");
            Ok(())
        }
    }
}

fn parse_types(types: &[String]) -> Result<Option<Vec<TrafficKind>>> {
    if types.is_empty() {
        return Ok(None);
    }
    types
        .iter()
        .map(|t| match t.as_str() {
            "http" => Ok(TrafficKind::Http),
            "error" => Ok(TrafficKind::Error),
            "performance" => Ok(TrafficKind::Performance),
            "custom" => Ok(TrafficKind::Custom),
            "screenshot" => Ok(TrafficKind::Screenshot),
            "execution" => Ok(TrafficKind::Execution),
            "response" => Ok(TrafficKind::Response),
            "lifecycle" => Ok(TrafficKind::Lifecycle),
            other => anyhow::bail!("unknown entry type: {other}"),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn entry_row(entry: &TrafficEntry) -> String {
    let ts = entry.timestamp().format("%H:%M:%S%.3f");
    match entry {
        TrafficEntry::Http {
            method,
            url,
            status,
            duration_ms,
            ..
        } => format!("{ts} http {method} {url} -> {status} ({duration_ms}ms)"),
        TrafficEntry::Error { message, url, .. } => format!(
            "{ts} error {} ({})",
            message,
            url.as_deref().unwrap_or("-")
        ),
        TrafficEntry::Performance { url, .. } => format!("{ts} performance {url}"),
        TrafficEntry::Custom { level, message, .. } => {
            format!("{ts} custom [{level}] {message}")
        }
        TrafficEntry::Screenshot { name, .. } => format!("{ts} screenshot {name}"),
        TrafficEntry::Execution { request_id, .. } => format!("{ts} execution {request_id}"),
        TrafficEntry::Response {
            request_id, error, ..
        } => match error {
            Some(error) => format!("{ts} response {request_id} error: {error}"),
            None => format!("{ts} response {request_id}"),
        },
        TrafficEntry::Lifecycle { event, detail, .. } => format!(
            "{ts} lifecycle {} {}",
            event,
            detail.as_deref().unwrap_or("")
        ),
    }
}
