// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small formatting helpers shared by the command modules.

use spot_core::ProcessStatus;

/// `id  state  pid  command` row for process listings.
pub fn proc_row(status: &ProcessStatus) -> String {
    let pid = status
        .pid
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let exit = status
        .exit_code
        .map(|c| format!(" exit={c}"))
        .unwrap_or_default();
    format!(
        "{:<20} {:<9} {:<7} {}{}",
        status.id,
        status.state.to_string(),
        pid,
        command_line(status),
        exit
    )
}

fn command_line(status: &ProcessStatus) -> String {
    if status.args.is_empty() {
        status.command.clone()
    } else {
        format!("{} {}", status.command, status.args.join(" "))
    }
}

/// Render a JSON value on one line for exec results.
pub fn json_line(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
