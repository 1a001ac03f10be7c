// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use spot_core::ErrorCode;
use tempfile::TempDir;
use tokio::net::UnixListener;

/// Serve one connection with a canned responder.
fn fake_daemon(
    dir: &TempDir,
    respond: impl Fn(Request) -> Response + Send + Sync + 'static,
) -> PathBuf {
    let socket_path = dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (mut reader, mut writer) = stream.into_split();
            while let Ok(request) = protocol::read_request(&mut reader, timeout_ipc()).await {
                let response = respond(request);
                if protocol::write_response(&mut writer, &response, timeout_ipc())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    });
    socket_path
}

#[tokio::test]
#[serial]
async fn ping_round_trip() {
    let dir = TempDir::new().unwrap();
    let socket = fake_daemon(&dir, |request| match request {
        Request::Ping => Response::Pong { ok: true },
        _ => Response::error(ErrorCode::Internal, "unexpected"),
    });
    std::env::set_var("SPOT_SOCKET", &socket);

    let client = DaemonClient::connect().unwrap();
    client.ping().await.unwrap();

    std::env::remove_var("SPOT_SOCKET");
}

#[tokio::test]
#[serial]
async fn daemon_error_becomes_coded_client_error() {
    let dir = TempDir::new().unwrap();
    let socket = fake_daemon(&dir, |_| {
        Response::error(ErrorCode::NotFound, "unknown process: ghost")
    });
    std::env::set_var("SPOT_SOCKET", &socket);

    let client = DaemonClient::connect().unwrap();
    let err = client.proc_status("ghost").await.unwrap_err();
    match err {
        ClientError::Daemon(wire) => {
            assert_eq!(wire.code, ErrorCode::NotFound);
            assert!(wire.message.contains("ghost"));
        }
        other => panic!("unexpected error: {other}"),
    }

    std::env::remove_var("SPOT_SOCKET");
}

#[tokio::test]
#[serial]
async fn unexpected_payload_is_flagged() {
    let dir = TempDir::new().unwrap();
    let socket = fake_daemon(&dir, |_| Response::Ok);
    std::env::set_var("SPOT_SOCKET", &socket);

    let client = DaemonClient::connect().unwrap();
    let err = client.info().await.unwrap_err();
    assert!(matches!(err, ClientError::UnexpectedResponse));

    std::env::remove_var("SPOT_SOCKET");
}

#[tokio::test]
#[serial]
async fn missing_socket_is_daemon_not_running() {
    let dir = TempDir::new().unwrap();
    std::env::set_var("SPOT_SOCKET", dir.path().join("nope.sock"));

    let err = DaemonClient::connect().unwrap_err();
    assert!(matches!(err, ClientError::DaemonNotRunning));

    std::env::remove_var("SPOT_SOCKET");
}

#[tokio::test]
#[serial]
async fn reconnect_hook_fires_after_transient_failure() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("daemon.sock");
    std::env::set_var("SPOT_SOCKET", &socket_path);
    std::env::set_var("SPOT_TIMEOUT_IPC_MS", "500");

    // No listener yet: the first attempt fails with IO, then we bind
    // mid-retry and the request succeeds.
    std::fs::write(&socket_path, b"").unwrap();
    let client = DaemonClient::connect().unwrap();
    std::fs::remove_file(&socket_path).unwrap();

    let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fired_clone = Arc::clone(&fired);
    let client = client.with_on_reconnect(move || {
        fired_clone.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    let bind_path = socket_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = UnixListener::bind(&bind_path).unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let _ = protocol::read_request(&mut reader, timeout_ipc()).await;
        let _ = protocol::write_response(&mut writer, &Response::Pong { ok: true }, timeout_ipc())
            .await;
    });

    client.ping().await.unwrap();
    assert!(fired.load(std::sync::atomic::Ordering::SeqCst));

    std::env::remove_var("SPOT_SOCKET");
    std::env::remove_var("SPOT_TIMEOUT_IPC_MS");
}
