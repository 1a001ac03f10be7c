// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `spot page` — page sessions captured by a proxy.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::client::DaemonClient;

#[derive(Args)]
pub struct PageArgs {
    #[command(subcommand)]
    command: PageCommand,
}

#[derive(Subcommand)]
enum PageCommand {
    /// List page sessions
    List { proxy_id: String },
    /// Show one page session in full (JSON)
    Get {
        proxy_id: String,
        session_id: String,
    },
    /// Forget all page sessions
    Clear { proxy_id: String },
}

pub async fn run(args: PageArgs) -> Result<()> {
    match args.command {
        PageCommand::List { proxy_id } => {
            let client = DaemonClient::for_query()?;
            let pages = client.page_list(&proxy_id).await?;
            if pages.is_empty() {
                println!("no page sessions");
            }
            for page in pages {
                println!(
                    "{:<14} {:<7} res={:<4} err={:<3} int={:<4} mut={:<4} {}",
                    page.id,
                    format!("{:?}", page.status).to_lowercase(),
                    page.resource_count,
                    page.error_count,
                    page.interaction_count,
                    page.mutation_count,
                    page.document_url,
                );
            }
            Ok(())
        }
        PageCommand::Get {
            proxy_id,
            session_id,
        } => {
            let client = DaemonClient::for_query()?;
            match client.page_get(&proxy_id, &session_id).await? {
                Some(page) => {
                    println!("{}", serde_json::to_string_pretty(&page)?);
                    Ok(())
                }
                None => anyhow::bail!("unknown page session: {session_id}"),
            }
        }
        PageCommand::Clear { proxy_id } => {
            let client = DaemonClient::for_query()?;
            client.page_clear(&proxy_id).await?;
            println!("cleared");
            Ok(())
        }
    }
}
