// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn upgrade_detection_is_case_insensitive() {
    let mut headers = HeaderMap::new();
    headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
    assert!(is_websocket_upgrade(&headers));

    headers.insert(header::UPGRADE, "h2c".parse().unwrap());
    assert!(!is_websocket_upgrade(&headers));

    assert!(!is_websocket_upgrade(&HeaderMap::new()));
}

#[test]
fn authority_defaults_port_80() {
    assert_eq!(
        authority_of("http://localhost:5173").as_deref(),
        Some("localhost:5173")
    );
    assert_eq!(
        authority_of("http://app.test").as_deref(),
        Some("app.test:80")
    );
    assert_eq!(authority_of("https://app.test"), None);
}

#[test]
fn head_end_detection() {
    assert_eq!(find_head_end(b"HTTP/1.1 101 x\r\n\r\nrest"), Some(14));
    assert_eq!(find_head_end(b"HTTP/1.1 101 x\r\n"), None);
}

#[tokio::test]
async fn parses_handshake_response_and_leftover() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  upgrade: websocket\r\n\
                  sec-websocket-accept: abc123\r\n\r\nEARLY",
            )
            .await
            .unwrap();
    });

    let mut upstream = TcpStream::connect(addr).await.unwrap();
    let (status, headers, leftover) = read_response_head(&mut upstream).await.unwrap();
    assert_eq!(status, 101);
    assert!(headers
        .iter()
        .any(|(name, value)| name == "sec-websocket-accept" && value == "abc123"));
    assert_eq!(leftover, b"EARLY");
}

#[tokio::test]
async fn closed_upstream_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut upstream = TcpStream::connect(addr).await.unwrap();
    let err = read_response_head(&mut upstream).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}
