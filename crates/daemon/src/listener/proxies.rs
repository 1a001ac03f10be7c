// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for `PROXY.*`, `CHAOS.*`, `PROXYLOG.*`, and
//! `CURRENTPAGE.*`.

use std::time::Duration;

use chrono::Utc;
use spot_core::{ChaosRule, TrafficFilter, WireError};
use spot_proxy::{control, registry::EXEC_TIMEOUT, ProxyConfig, ToastPayload};

use super::ListenCtx;
use crate::protocol::{Response, TrafficQuery};

pub(super) async fn handle_start(
    ctx: &ListenCtx,
    id: &str,
    target_url: &str,
    mut config: ProxyConfig,
) -> Response {
    // Env-level defaults apply when the request leaves them unset.
    if config.max_log_size.is_none() {
        config.max_log_size = crate::env::traffic_cap();
    }
    if config.body_excerpt.is_none() {
        config.body_excerpt = crate::env::body_excerpt();
    }
    match ctx.proxies.start(id, target_url, config).await {
        Ok(status) => Response::Proxy { status },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_stop(ctx: &ListenCtx, id: &str) -> Response {
    match ctx.proxies.stop(id) {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}

pub(super) fn handle_status(ctx: &ListenCtx, id: &str) -> Response {
    match ctx.proxies.get(id) {
        Ok(handle) => Response::Proxy {
            status: handle.status(),
        },
        Err(e) => e.into(),
    }
}

pub(super) async fn handle_exec(
    ctx: &ListenCtx,
    id: &str,
    code: &str,
    timeout_ms: Option<u64>,
) -> Response {
    let handle = match ctx.proxies.get(id) {
        Ok(handle) => handle,
        Err(e) => return e.into(),
    };
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(EXEC_TIMEOUT)
        .min(EXEC_TIMEOUT);
    match handle.exec(code, timeout).await {
        Ok(reply) => Response::ExecResult {
            result: reply.result,
            error: reply.error,
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_toast(ctx: &ListenCtx, id: &str, toast: &ToastPayload) -> Response {
    match ctx.proxies.get(id) {
        Ok(handle) => Response::ToastSent {
            delivered: control::send_toast(&handle, toast),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_chaos_add(ctx: &ListenCtx, proxy_id: &str, rule: ChaosRule) -> Response {
    if !(0.0..=1.0).contains(&rule.probability) {
        return WireError::invalid_args("probability must be within [0, 1]").into();
    }
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => {
            handle.chaos_add(rule);
            Response::ChaosRules {
                rules: handle.chaos_list(),
            }
        }
        Err(e) => e.into(),
    }
}

pub(super) fn handle_chaos_list(ctx: &ListenCtx, proxy_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => Response::ChaosRules {
            rules: handle.chaos_list(),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_chaos_clear(ctx: &ListenCtx, proxy_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => {
            handle.chaos_clear();
            Response::Ok
        }
        Err(e) => e.into(),
    }
}

pub(super) fn handle_chaos_apply(ctx: &ListenCtx, proxy_id: &str, preset: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => match handle.chaos_apply(preset) {
            Ok(rules) => Response::ChaosDigest { rules },
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_log_query(ctx: &ListenCtx, proxy_id: &str, query: &TrafficQuery) -> Response {
    let handle = match ctx.proxies.get(proxy_id) {
        Ok(handle) => handle,
        Err(e) => return e.into(),
    };
    let filter = match to_filter(query) {
        Ok(filter) => filter,
        Err(e) => return e.into(),
    };
    let (entries, stats) = handle.traffic_query(&filter);
    Response::Traffic { entries, stats }
}

/// Convert wire-level time bounds (RFC3339 or durations-ago) into the
/// core filter.
fn to_filter(query: &TrafficQuery) -> Result<TrafficFilter, WireError> {
    let now = Utc::now();
    let parse = |field: &Option<String>, name: &str| -> Result<_, WireError> {
        field
            .as_deref()
            .map(|s| {
                spot_core::time::parse_point(s, now)
                    .ok_or_else(|| WireError::invalid_args(format!("bad {name}: {s}")))
            })
            .transpose()
    };
    Ok(TrafficFilter {
        types: query.types.clone(),
        methods: query.methods.clone(),
        status_codes: query.status_codes.clone(),
        url_pattern: query.url_pattern.clone(),
        since: parse(&query.since, "since")?,
        until: parse(&query.until, "until")?,
        limit: query.limit,
    })
}

pub(super) fn handle_log_stats(ctx: &ListenCtx, proxy_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => Response::TrafficCounts {
            stats: handle.traffic_stats(),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_log_clear(ctx: &ListenCtx, proxy_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => {
            handle.traffic_clear();
            Response::Ok
        }
        Err(e) => e.into(),
    }
}

pub(super) fn handle_page_list(ctx: &ListenCtx, proxy_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => Response::Pages {
            pages: handle.pages_list(),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_page_get(ctx: &ListenCtx, proxy_id: &str, session_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => Response::Page {
            page: handle.pages_get(session_id).map(Box::new),
        },
        Err(e) => e.into(),
    }
}

pub(super) fn handle_page_clear(ctx: &ListenCtx, proxy_id: &str) -> Response {
    match ctx.proxies.get(proxy_id) {
        Ok(handle) => {
            handle.pages_clear();
            Response::Ok
        }
        Err(e) => e.into(),
    }
}
