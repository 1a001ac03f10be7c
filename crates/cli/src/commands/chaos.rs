// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot chaos` — fault injection on a proxy's request path.

use anyhow::Result;
use clap::{Args, Subcommand};
use spot_core::{ChaosKind, ChaosRule};

use crate::client::DaemonClient;

#[derive(Args)]
pub struct ChaosArgs {
    #[command(subcommand)]
    command: ChaosCommand,
}

#[derive(Subcommand)]
enum ChaosCommand {
    /// Add one rule to a proxy's chaos table
    Add {
        proxy_id: String,
        /// Rule kind: latency, error, packet-loss, bandwidth,
        /// disconnect, stale, rate-limit
        kind: String,
        /// Rule id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// URL substring the rule applies to
        #[arg(long)]
        url: Option<String>,
        /// Firing probability in [0,1] (default 1)
        #[arg(long)]
        probability: Option<f64>,
        /// Added delay for latency rules (ms)
        #[arg(long)]
        latency_ms: Option<u64>,
        /// Uniform jitter on top of the delay (ms)
        #[arg(long)]
        jitter_ms: Option<u64>,
        /// Status for error/rate-limit rules
        #[arg(long)]
        status: Option<u16>,
        /// Throughput cap for bandwidth rules (bytes/sec)
        #[arg(long)]
        bytes_per_sec: Option<u64>,
    },
    /// Show the chaos table
    List { proxy_id: String },
    /// Remove every rule
    Clear { proxy_id: String },
    /// Replace the table with a named preset
    /// (slow-3g, flaky-api, rate-limited, offline)
    Apply { proxy_id: String, preset: String },
}

pub async fn run(args: ChaosArgs) -> Result<()> {
    match args.command {
        ChaosCommand::Add {
            proxy_id,
            kind,
            id,
            url,
            probability,
            latency_ms,
            jitter_ms,
            status,
            bytes_per_sec,
        } => {
            let kind = parse_kind(&kind)?;
            let rule = ChaosRule {
                url_pattern: url,
                probability: probability.unwrap_or(1.0),
                latency_ms,
                jitter_ms,
                status,
                bytes_per_sec,
                ..ChaosRule::new(
                    id.unwrap_or_else(|| format!("rule-{kind}")),
                    kind,
                )
            };
            let client = DaemonClient::for_query()?;
            let rules = client.chaos_add(&proxy_id, rule).await?;
            println!("{} rule(s) active", rules.len());
            Ok(())
        }
        ChaosCommand::List { proxy_id } => {
            let client = DaemonClient::for_query()?;
            let rules = client.chaos_list(&proxy_id).await?;
            if rules.is_empty() {
                println!("no chaos rules");
            }
            for rule in rules {
                println!("{}", serde_json::to_string(&rule)?);
            }
            Ok(())
        }
        ChaosCommand::Clear { proxy_id } => {
            let client = DaemonClient::for_query()?;
            client.chaos_clear(&proxy_id).await?;
            println!("cleared");
            Ok(())
        }
        ChaosCommand::Apply { proxy_id, preset } => {
            let client = DaemonClient::for_query()?;
            let digest = client.chaos_apply(&proxy_id, &preset).await?;
            for line in digest {
                println!("{line}");
            }
            Ok(())
        }
    }
}

fn parse_kind(s: &str) -> Result<ChaosKind> {
    match s {
        "latency" => Ok(ChaosKind::Latency),
        "error" => Ok(ChaosKind::ErrorInjection),
        "packet-loss" => Ok(ChaosKind::PacketLoss),
        "bandwidth" => Ok(ChaosKind::Bandwidth),
        "disconnect" => Ok(ChaosKind::Disconnect),
        "stale" => Ok(ChaosKind::Stale),
        "rate-limit" => Ok(ChaosKind::RateLimit),
        other => anyhow::bail!("unknown chaos kind: {other}"),
    }
}
