// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::control::CONTROL_PATH;
use axum::routing::get;
use axum::Router;
use futures::SinkExt;
use spot_core::{ChaosKind, ChaosRule, TrafficFilter, TrafficKind};
use std::io::Write as _;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

use crate::registry::{ProxyConfig, ProxyManager};

const HTML: &str = "<html><head><title>x</title></head><body>hello</body></html>";

async fn gzip_html() -> Response<Body> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(HTML.as_bytes()).unwrap();
    let compressed = enc.finish().unwrap();
    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_ENCODING, "gzip")
        .header(header::CONTENT_LENGTH, compressed.len())
        .body(Body::from(compressed))
        .unwrap()
}

async fn plain_html() -> Response<Body> {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/html")
        .body(Body::from(HTML))
        .unwrap()
}

async fn api_json() -> Response<Body> {
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"users\": [1, 2, 3]}"))
        .unwrap()
}

async fn spawn_target() -> SocketAddr {
    let app = Router::new()
        .route("/", get(gzip_html))
        .route("/plain", get(plain_html))
        .route("/api/data", get(api_json));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_proxy(mgr: &ProxyManager, id: &str, target: SocketAddr) -> String {
    let status = mgr
        .start(id, &format!("http://{target}"), ProxyConfig::default())
        .await
        .unwrap();
    format!("http://{}", status.listen_addr.unwrap())
}

#[tokio::test]
async fn injects_script_through_gzip() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;

    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert!(resp.status().is_success());
    assert!(
        resp.headers().get(header::CONTENT_ENCODING).is_none(),
        "content-encoding must be stripped after injection"
    );
    assert!(resp.headers().get(header::CONTENT_LENGTH).is_none());

    let body = resp.text().await.unwrap();
    let script_at = body.find("<script data-spot-agent>").unwrap();
    let head_close = body.find("</head>").unwrap();
    assert!(script_at < head_close);
    assert!(body.contains("<title>x</title>"));
    assert!(body.ends_with("</html>"));

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn html_document_starts_page_session() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;

    reqwest::get(format!("{base}/plain")).await.unwrap();
    let handle = mgr.get("p1").unwrap();
    let pages = handle.pages_list();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].document_url.ends_with("/plain"));

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn json_body_excerpt_is_captured() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;

    let body = reqwest::get(format!("{base}/api/data"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "{\"users\": [1, 2, 3]}");

    let handle = mgr.get("p1").unwrap();
    let (entries, _) = handle.traffic_query(&TrafficFilter {
        types: Some(vec![TrafficKind::Http]),
        ..Default::default()
    });
    assert_eq!(entries.len(), 1);
    match &entries[0] {
        spot_core::TrafficEntry::Http {
            status, resp_body, ..
        } => {
            assert_eq!(*status, 200);
            assert!(resp_body.as_ref().unwrap().content.contains("users"));
        }
        other => panic!("unexpected entry: {other:?}"),
    }

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn upstream_failure_becomes_502_entry() {
    let mgr = ProxyManager::new();
    // Port 9 (discard) is never a dev server.
    let status = mgr
        .start("p1", "http://127.0.0.1:9", ProxyConfig::default())
        .await
        .unwrap();
    let base = format!("http://{}", status.listen_addr.unwrap());

    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 502);

    let handle = mgr.get("p1").unwrap();
    let (entries, _) = handle.traffic_query(&TrafficFilter::default());
    assert!(entries
        .iter()
        .any(|e| matches!(e, spot_core::TrafficEntry::Http { status: 502, .. })));

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn latency_rule_delays_matching_requests() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;

    let handle = mgr.get("p1").unwrap();
    handle.chaos_add(ChaosRule {
        latency_ms: Some(150),
        ..ChaosRule::new("slow", ChaosKind::Latency)
    });

    let started = std::time::Instant::now();
    reqwest::get(format!("{base}/plain")).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn error_rule_short_circuits() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;

    let handle = mgr.get("p1").unwrap();
    handle.chaos_add(ChaosRule {
        url_pattern: Some("/api/".to_string()),
        status: Some(503),
        ..ChaosRule::new("err", ChaosKind::ErrorInjection)
    });

    let resp = reqwest::get(format!("{base}/api/data")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    // Non-matching paths are untouched.
    let resp = reqwest::get(format!("{base}/plain")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn public_url_rewrite_applies_to_html() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let status = mgr
        .start(
            "p1",
            &format!("http://{target}"),
            ProxyConfig {
                public_url: Some("https://demo.tunnel.dev".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let base = format!("http://{}", status.listen_addr.unwrap());

    // The page links back to its own origin; the proxy must rewrite it.
    let body = reqwest::get(format!("{base}/plain"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!body.contains(&format!("http://{target}")));
    assert!(body.contains("data-spot-agent"));

    mgr.stop("p1").unwrap();
}

// ─── control channel ────────────────────────────────────────────────

async fn connect_control(
    base: &str,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let ws_url = format!("{}{}", base.replace("http://", "ws://"), CONTROL_PATH);
    let (socket, _) = tokio_tungstenite::connect_async(ws_url).await.unwrap();
    socket
}

#[tokio::test]
async fn exec_round_trip_with_echo_client() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;
    let handle = mgr.get("p1").unwrap();

    let mut socket = connect_control(&base).await;
    let echo = tokio::spawn(async move {
        while let Some(Ok(frame)) = socket.next().await {
            if let tungstenite::Message::Text(text) = frame {
                let msg: serde_json::Value = serde_json::from_str(&text).unwrap();
                if msg["type"] == "exec" {
                    let reply = serde_json::json!({
                        "type": "exec_response",
                        "request_id": msg["request_id"],
                        "result": msg["request_id"],
                    });
                    socket
                        .send(tungstenite::Message::Text(reply.to_string()))
                        .await
                        .unwrap();
                }
            }
        }
    });

    // Wait for the client to register on the proxy side.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while handle.client_count() == 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let reply = handle.exec("1+1", Duration::from_secs(5)).await.unwrap();
    assert!(reply.result.is_some());
    assert!(reply.error.is_none());

    // Exactly one Execution and one Response entry.
    let stats = handle.traffic_stats();
    let count = |kind| {
        stats
            .by_type
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };
    assert_eq!(count(TrafficKind::Execution), 1);
    assert_eq!(count(TrafficKind::Response), 1);

    echo.abort();
    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn telemetry_error_lands_in_traffic_and_pages() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;
    let handle = mgr.get("p1").unwrap();

    // A page session to attach to.
    reqwest::get(format!("{base}/plain")).await.unwrap();

    let mut socket = connect_control(&base).await;
    let event = serde_json::json!({
        "type": "error",
        "tab_id": "tab-1",
        "message": "boom",
        "url": format!("http://{target}/plain"),
    });
    socket
        .send(tungstenite::Message::Text(event.to_string()))
        .await
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let (entries, _) = handle.traffic_query(&TrafficFilter {
            types: Some(vec![TrafficKind::Error]),
            ..Default::default()
        });
        if !entries.is_empty() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "error entry never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let pages = handle.pages_list();
    assert_eq!(pages[0].error_count, 1);

    mgr.stop("p1").unwrap();
}

#[tokio::test]
async fn toast_reaches_connected_tabs() {
    let target = spawn_target().await;
    let mgr = ProxyManager::new();
    let base = start_proxy(&mgr, "p1", target).await;
    let handle = mgr.get("p1").unwrap();

    let mut socket = connect_control(&base).await;
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while handle.client_count() == 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let delivered = crate::control::send_toast(
        &handle,
        &crate::control::ToastPayload {
            level: Some("info".to_string()),
            title: "Build".to_string(),
            message: "done".to_string(),
            duration_ms: Some(3000),
        },
    );
    assert_eq!(delivered, 1);

    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        tungstenite::Message::Text(text) => {
            let msg: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(msg["type"], "toast");
            assert_eq!(msg["title"], "Build");
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    mgr.stop("p1").unwrap();
}
