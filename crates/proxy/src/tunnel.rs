// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transparent WebSocket pass-through.
//!
//! Upgrade requests on anything except the reserved control path are
//! tunneled raw: the handshake is replayed against the target over
//! TCP, the 101 response is relayed back, and after both sides upgrade
//! the proxy just copies bytes. Dev-server HMR sockets depend on this.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use chrono::Utc;
use hyper_util::rt::TokioIo;
use spot_core::TrafficEntry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::registry::ProxyHandle;

/// Cap on the buffered upstream handshake response head.
const MAX_HEAD: usize = 16 * 1024;

/// True when the request asks for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Tunnel one upgrade request to the target.
pub async fn proxy_websocket(handle: Arc<ProxyHandle>, mut req: Request<Body>) -> Response<Body> {
    let started = Instant::now();
    let path_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("{}{}", handle.target_url, path_query);

    let Some(authority) = authority_of(&handle.target_url) else {
        return plain(
            StatusCode::BAD_GATEWAY,
            "websocket tunneling requires an http target",
        );
    };

    let mut upstream = match TcpStream::connect(&authority).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(proxy = %handle.id, %url, error = %e, "ws tunnel connect failed");
            record(&handle, &path_query, 502, started);
            return plain(StatusCode::BAD_GATEWAY, format!("upstream failure: {e}"));
        }
    };

    // Replay the handshake verbatim (Host rewritten to the target).
    let mut head = format!("GET {path_query} HTTP/1.1\r\nhost: {authority}\r\n");
    for (name, value) in req.headers() {
        if name == header::HOST {
            continue;
        }
        if let Ok(value) = value.to_str() {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
    }
    head.push_str("\r\n");
    if let Err(e) = upstream.write_all(head.as_bytes()).await {
        record(&handle, &path_query, 502, started);
        return plain(StatusCode::BAD_GATEWAY, format!("handshake write: {e}"));
    }

    // Read the upstream response head.
    let (status, resp_headers, leftover) = match read_response_head(&mut upstream).await {
        Ok(parsed) => parsed,
        Err(e) => {
            record(&handle, &path_query, 502, started);
            return plain(StatusCode::BAD_GATEWAY, format!("handshake read: {e}"));
        }
    };

    record(&handle, &path_query, status, started);
    if status != 101 {
        debug!(proxy = %handle.id, %url, status, "upstream declined ws upgrade");
        let mut builder = Response::builder().status(status);
        for (name, value) in &resp_headers {
            builder = builder.header(name, value);
        }
        return builder
            .body(Body::empty())
            .unwrap_or_else(|_| plain(StatusCode::BAD_GATEWAY, "bad upstream handshake"));
    }

    // Copy bytes both ways once the client connection upgrades.
    let on_upgrade = hyper::upgrade::on(&mut req);
    let proxy_id = handle.id.clone();
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let mut client = TokioIo::new(upgraded);
                if !leftover.is_empty() {
                    if client.write_all(&leftover).await.is_err() {
                        return;
                    }
                }
                if let Err(e) =
                    tokio::io::copy_bidirectional(&mut client, &mut upstream).await
                {
                    debug!(proxy = %proxy_id, error = %e, "ws tunnel closed");
                }
            }
            Err(e) => debug!(proxy = %proxy_id, error = %e, "client upgrade failed"),
        }
    });

    let mut builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    for (name, value) in &resp_headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|_| plain(StatusCode::BAD_GATEWAY, "bad upstream handshake"))
}

/// `host:port` of an http target URL (https targets are not tunneled).
fn authority_of(target_url: &str) -> Option<String> {
    let rest = target_url.strip_prefix("http://")?;
    let host = rest.split('/').next().unwrap_or(rest);
    if host.is_empty() {
        return None;
    }
    if host.contains(':') {
        Some(host.to_string())
    } else {
        Some(format!("{host}:80"))
    }
}

/// Parse an HTTP/1.1 response head; returns status, header lines, and
/// any bytes read past the head (early frames from the server).
async fn read_response_head(
    upstream: &mut TcpStream,
) -> std::io::Result<(u16, Vec<(String, String)>, Vec<u8>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = upstream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "upstream closed during handshake",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "handshake response head too large",
            ));
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let leftover = buf[head_end + 4..].to_vec();

    let mut lines = head.lines();
    let status_line = lines.next().unwrap_or_default();
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad status line: {status_line}"),
            )
        })?;

    let headers = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    Ok((status, headers, leftover))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn record(handle: &ProxyHandle, path: &str, status: u16, started: Instant) {
    handle.record(TrafficEntry::Http {
        method: "GET".to_string(),
        url: format!("{}{}", handle.target_url, path),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
        req_headers: Vec::new(),
        resp_headers: Vec::new(),
        req_body: None,
        resp_body: None,
        timestamp: Utc::now(),
    });
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
