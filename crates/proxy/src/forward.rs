// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request forwarding: browser → listener → target.
//!
//! Chaos rules are evaluated before anything is forwarded. HTML
//! responses pass the injection pipeline and are re-emitted without
//! Content-Encoding/Content-Length; textual bodies are buffered for
//! excerpt capture; everything else streams through untouched. Every
//! round trip lands one Http entry in the traffic log and notifies the
//! page tracker.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use chrono::Utc;
use futures::StreamExt;
use spot_core::{BodyExcerpt, TrafficEntry};
use tracing::{debug, warn};

use crate::chaos::ShortCircuit;
use crate::inject::{inject_buffered, Encoding, HtmlInjector, StreamDecoder};
use crate::assets;
use crate::registry::ProxyHandle;

/// Ceiling for buffered bodies (request capture and textual responses).
const MAX_BUFFERED_BODY: usize = 64 * 1024 * 1024;

/// Headers never copied between hops.
fn is_hop_header(name: &header::HeaderName) -> bool {
    name == header::HOST
        || name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
        || name == header::CONTENT_LENGTH
}

/// Catch-all handler: everything except the control path lands here.
pub async fn proxy_handler(
    State(handle): State<Arc<ProxyHandle>>,
    req: Request<Body>,
) -> Response<Body> {
    let started = Instant::now();
    let timestamp = Utc::now();

    // Non-control WebSocket upgrades bypass the HTTP path entirely.
    if crate::tunnel::is_websocket_upgrade(req.headers()) {
        return crate::tunnel::proxy_websocket(handle, req).await;
    }

    let method = req.method().clone();
    let path_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("{}{}", handle.target_url, path_query);
    let req_headers = req.headers().clone();
    let referer = header_str(&req_headers, header::REFERER);

    // Chaos first: sampled delays apply even when the request is then
    // short-circuited.
    let chaos = handle.chaos_eval(&url);
    if !chaos.delay.is_zero() {
        tokio::time::sleep(chaos.delay).await;
    }
    if let Some(effect) = chaos.short_circuit {
        return short_circuit_response(&handle, effect, &method, &url, started, timestamp);
    }

    let body_bytes = match axum::body::to_bytes(req.into_body(), MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return plain_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body error: {e}"),
            )
        }
    };
    let req_excerpt = (!body_bytes.is_empty())
        .then(|| BodyExcerpt::capture(&body_bytes, handle.body_excerpt));

    let upstream = match forward_upstream(&handle, &method, &url, &req_headers, body_bytes).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(proxy = %handle.id, %url, error = %e, "upstream failure");
            let entry = TrafficEntry::Http {
                method: method.to_string(),
                url: url.clone(),
                status: 502,
                duration_ms: started.elapsed().as_millis() as u64,
                req_headers: headers_vec(&req_headers),
                resp_headers: Vec::new(),
                req_body: req_excerpt,
                resp_body: None,
                timestamp,
            };
            handle.record(entry);
            handle.page_resource(&url, 502, referer.as_deref());
            return plain_response(StatusCode::BAD_GATEWAY, format!("upstream failure: {e}"));
        }
    };

    let status = upstream.status();
    let resp_headers = upstream.headers().clone();
    let content_type = header_str(&resp_headers, header::CONTENT_TYPE).unwrap_or_default();
    let is_html = content_type.starts_with("text/html");

    // Traffic + page-tracker bookkeeping happens once headers are in;
    // body excerpts are filled in per path below.
    let mut entry_resp_body: Option<BodyExcerpt> = None;

    let response = if is_html {
        let encoding = Encoding::from_header(header_str(&resp_headers, header::CONTENT_ENCODING).as_deref());
        match html_response(&handle, upstream, encoding, &mut entry_resp_body).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(proxy = %handle.id, %url, error = %e, "injection pipeline failed");
                plain_response(StatusCode::BAD_GATEWAY, format!("injection failed: {e}"))
            }
        }
    } else if is_textual(&content_type)
        && header_str(&resp_headers, header::CONTENT_ENCODING).is_none()
    {
        match upstream.bytes().await {
            Ok(bytes) => {
                entry_resp_body = Some(BodyExcerpt::capture(&bytes, handle.body_excerpt));
                passthrough_buffered(&resp_headers, status, bytes, chaos.bandwidth)
            }
            Err(e) => plain_response(StatusCode::BAD_GATEWAY, format!("upstream body: {e}")),
        }
    } else {
        passthrough_streaming(&resp_headers, status, upstream, chaos.bandwidth)
    };

    let mut response = response;
    if let Some(secs) = chaos.stale_secs {
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={secs}")) {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, value);
        }
    }

    let status_u16 = status.as_u16();
    handle.record(TrafficEntry::Http {
        method: method.to_string(),
        url: url.clone(),
        status: status_u16,
        duration_ms: started.elapsed().as_millis() as u64,
        req_headers: headers_vec(&req_headers),
        resp_headers: headers_vec(&resp_headers),
        req_body: req_excerpt,
        resp_body: entry_resp_body,
        timestamp,
    });

    if is_html && status.is_success() && method == axum::http::Method::GET {
        let session = handle.page_document(&url);
        debug!(proxy = %handle.id, %url, session, "new page session");
    } else {
        handle.page_resource(&url, status_u16, referer.as_deref());
    }

    response
}

async fn forward_upstream(
    handle: &ProxyHandle,
    method: &axum::http::Method,
    url: &str,
    req_headers: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut forwarded = HeaderMap::new();
    for (name, value) in req_headers {
        if !is_hop_header(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }

    handle
        .http
        .request(method.clone(), url)
        .headers(forwarded)
        .body(body.to_vec())
        .send()
        .await
}

/// HTML path: decode, splice the agent script, re-emit uncompressed.
///
/// With a public URL configured the whole document is buffered so the
/// origin rewrite sees complete text; otherwise only the prefix up to
/// the insertion point is held back and the tail streams through.
async fn html_response(
    handle: &Arc<ProxyHandle>,
    upstream: reqwest::Response,
    encoding: Encoding,
    entry_resp_body: &mut Option<BodyExcerpt>,
) -> Result<Response<Body>, io::Error> {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let script = assets::script_tag();

    let builder = html_builder(status, &headers);

    if let Some(public_url) = handle.public_url.clone() {
        let raw = upstream
            .bytes()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
        let injected = inject_buffered(
            &raw,
            encoding,
            &script,
            Some((handle.target_url.as_str(), public_url.as_str())),
        )?;
        *entry_resp_body = Some(BodyExcerpt::capture(&injected, handle.body_excerpt));
        return builder
            .body(Body::from(injected))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
    }

    let decoder = StreamDecoder::new(encoding);
    let injector = HtmlInjector::new(&script);
    let upstream_stream = Box::pin(upstream.bytes_stream());

    struct StreamState<S> {
        upstream: S,
        decoder: Option<StreamDecoder>,
        injector: HtmlInjector,
    }

    let state = StreamState {
        upstream: upstream_stream,
        decoder: Some(decoder),
        injector,
    };

    let body_stream = futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    let decoder = state.decoder.as_mut()?;
                    let decoded = match decoder.push(&chunk) {
                        Ok(decoded) => decoded,
                        Err(e) => return Some((Err(e), None)),
                    };
                    let out = state.injector.push(&decoded);
                    if out.is_empty() {
                        continue;
                    }
                    return Some((Ok(Bytes::from(out)), Some(state)));
                }
                Some(Err(e)) => {
                    return Some((Err(io::Error::new(io::ErrorKind::UnexpectedEof, e)), None));
                }
                None => {
                    let decoder = state.decoder.take()?;
                    let mut tail = match decoder.finish() {
                        Ok(tail) => state.injector.push(&tail),
                        Err(e) => return Some((Err(e), None)),
                    };
                    tail.extend(state.injector.finish());
                    return Some((Ok(Bytes::from(tail)), None));
                }
            }
        }
    });

    builder
        .body(Body::from_stream(body_stream))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Response builder for injected HTML: original headers minus
/// Content-Encoding and Content-Length (the body is re-emitted
/// uncompressed over chunked transfer).
fn html_builder(status: StatusCode, headers: &HeaderMap) -> axum::http::response::Builder {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        if name == header::CONTENT_ENCODING
            || name == header::CONTENT_LENGTH
            || name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
        {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
}

fn passthrough_buffered(
    headers: &HeaderMap,
    status: StatusCode,
    bytes: Bytes,
    bandwidth: Option<u64>,
) -> Response<Body> {
    match bandwidth {
        Some(rate) => {
            // Throttled copies go chunked; a fixed length no longer holds.
            let mut builder = Response::builder().status(status);
            for (name, value) in headers {
                if name == header::CONTENT_LENGTH
                    || name == header::TRANSFER_ENCODING
                    || name == header::CONNECTION
                {
                    continue;
                }
                builder = builder.header(name, value);
            }
            let stream = throttled_chunks(bytes, rate);
            builder
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "response"))
        }
        None => {
            let mut builder = Response::builder().status(status);
            for (name, value) in headers {
                if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
                    continue;
                }
                builder = builder.header(name, value);
            }
            builder
                .body(Body::from(bytes))
                .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "response"))
        }
    }
}

fn passthrough_streaming(
    headers: &HeaderMap,
    status: StatusCode,
    upstream: reqwest::Response,
    bandwidth: Option<u64>,
) -> Response<Body> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        if name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
            || (bandwidth.is_some() && name == header::CONTENT_LENGTH)
        {
            continue;
        }
        builder = builder.header(name, value);
    }

    let stream = upstream
        .bytes_stream()
        .map(|item| item.map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e)));

    let body = match bandwidth {
        Some(rate) => Body::from_stream(stream.then(move |item| async move {
            if let Ok(chunk) = &item {
                tokio::time::sleep(throttle_delay(chunk.len(), rate)).await;
            }
            item
        })),
        None => Body::from_stream(stream),
    };

    builder
        .body(body)
        .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "response"))
}

/// Break a buffered body into rate-limited chunks.
fn throttled_chunks(
    bytes: Bytes,
    rate: u64,
) -> impl futures::Stream<Item = Result<Bytes, io::Error>> {
    const CHUNK: usize = 16 * 1024;
    let chunks: Vec<Bytes> = bytes
        .chunks(CHUNK)
        .map(|c| Bytes::copy_from_slice(c))
        .collect();
    futures::stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(throttle_delay(chunk.len(), rate)).await;
        Ok(chunk)
    })
}

fn throttle_delay(len: usize, bytes_per_sec: u64) -> std::time::Duration {
    if bytes_per_sec == 0 {
        return std::time::Duration::ZERO;
    }
    std::time::Duration::from_secs_f64(len as f64 / bytes_per_sec as f64)
}

/// Chaos short-circuits: immediate status replies and mid-response
/// disconnects. Both still produce a traffic entry.
fn short_circuit_response(
    handle: &ProxyHandle,
    effect: ShortCircuit,
    method: &axum::http::Method,
    url: &str,
    started: Instant,
    timestamp: chrono::DateTime<Utc>,
) -> Response<Body> {
    let status = match effect {
        ShortCircuit::Status(code) => code,
        ShortCircuit::Disconnect => 0,
    };
    handle.record(TrafficEntry::Http {
        method: method.to_string(),
        url: url.to_string(),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
        req_headers: Vec::new(),
        resp_headers: Vec::new(),
        req_body: None,
        resp_body: None,
        timestamp,
    });

    match effect {
        ShortCircuit::Status(code) => plain_response(
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "chaos: injected failure",
        ),
        ShortCircuit::Disconnect => {
            // Headers go out, then the stream errors and the connection
            // drops mid-response.
            let stream = futures::stream::once(async {
                Err::<Bytes, io::Error>(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "chaos: disconnect",
                ))
            });
            Response::builder()
                .status(StatusCode::OK)
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "chaos"))
        }
    }
}

fn plain_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.starts_with("application/json")
        || content_type.starts_with("application/javascript")
        || content_type.starts_with("application/xml")
        || content_type.contains("+json")
        || content_type.contains("+xml")
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn headers_vec(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
