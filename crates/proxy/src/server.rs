// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener setup and the accept-loop supervisor.
//!
//! Port selection is deterministic: a stable hash of the target URL
//! picks a port in [10000, 60000), so restarting a proxy for the same
//! target converges on the same listen address. If that port is taken
//! the scan walks forward through the range. An explicitly requested
//! port is never substituted — a conflict surfaces as PortInUse.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use chrono::Utc;
use sha2::{Digest, Sha256};
use spot_core::{ErrorCode, TrafficEntry, WireError};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::control::{self, CONTROL_PATH};
use crate::forward;
use crate::registry::{ProxyConfig, ProxyHandle, ProxyManager, ProxyStatus};

/// Inclusive lower bound of the hashed port range.
pub const PORT_RANGE_START: u16 = 10_000;
/// Exclusive upper bound of the hashed port range.
pub const PORT_RANGE_END: u16 = 60_000;
/// How many candidate ports the fallback scan tries.
const PORT_SCAN_LIMIT: u16 = 200;

const DEFAULT_BIND: &str = "127.0.0.1";

/// Stable port for a target URL.
pub fn port_for_target(target_url: &str) -> u16 {
    let digest = Sha256::digest(target_url.as_bytes());
    let mut eight = [0u8; 8];
    eight.copy_from_slice(&digest[..8]);
    let span = (PORT_RANGE_END - PORT_RANGE_START) as u64;
    PORT_RANGE_START + (u64::from_be_bytes(eight) % span) as u16
}

impl ProxyManager {
    /// Start a proxy for `target_url` and report its listen address.
    pub async fn start(
        &self,
        id: &str,
        target_url: &str,
        config: ProxyConfig,
    ) -> Result<ProxyStatus, WireError> {
        let handle = Arc::new(ProxyHandle::new(id, target_url, &config)?);

        let bind_address = config.bind_address.as_deref().unwrap_or(DEFAULT_BIND);
        let (listener, addr) = bind_listener(bind_address, config.port, &handle.target_url).await?;
        handle.set_listen_addr(addr);

        self.insert(Arc::clone(&handle))?;
        handle.record(TrafficEntry::Lifecycle {
            event: "started".to_string(),
            detail: Some(format!("{} -> {}", addr, handle.target_url)),
            timestamp: Utc::now(),
        });
        info!(proxy = %id, %addr, target = %handle.target_url, "proxy listening");

        tokio::spawn(supervise(Arc::clone(&handle), listener));
        Ok(handle.status())
    }
}

/// Bind the listener, scanning forward from the hashed port unless the
/// caller pinned one.
async fn bind_listener(
    bind_address: &str,
    port: Option<u16>,
    target_url: &str,
) -> Result<(TcpListener, SocketAddr), WireError> {
    if let Some(port) = port {
        return match TcpListener::bind((bind_address, port)).await {
            Ok(listener) => local_addr(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(WireError::new(
                ErrorCode::PortInUse,
                format!("port {port} is already in use"),
            )),
            Err(e) => Err(WireError::internal(format!("bind failed: {e}"))),
        };
    }

    let base = port_for_target(target_url);
    let span = PORT_RANGE_END - PORT_RANGE_START;
    for offset in 0..PORT_SCAN_LIMIT {
        let candidate = PORT_RANGE_START + (base - PORT_RANGE_START + offset) % span;
        match TcpListener::bind((bind_address, candidate)).await {
            Ok(listener) => return local_addr(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(WireError::internal(format!("bind failed: {e}"))),
        }
    }
    Err(WireError::new(
        ErrorCode::PortInUse,
        format!("no free port near {base} for {target_url}"),
    ))
}

fn local_addr(listener: TcpListener) -> Result<(TcpListener, SocketAddr), WireError> {
    let addr = listener
        .local_addr()
        .map_err(|e| WireError::internal(format!("local_addr: {e}")))?;
    Ok((listener, addr))
}

fn router(handle: Arc<ProxyHandle>) -> Router {
    Router::new()
        .route(CONTROL_PATH, get(control::ws_handler))
        .fallback(forward::proxy_handler)
        .with_state(handle)
}

/// Run the accept loop, rebinding after crashes until the restart
/// budget (5 per trailing minute) is spent.
async fn supervise(handle: Arc<ProxyHandle>, mut listener: TcpListener) {
    loop {
        let app = router(Arc::clone(&handle));
        let mut shutdown = handle.shutdown_rx();
        let graceful = async move {
            if !*shutdown.borrow() {
                let _ = shutdown.changed().await;
            }
        };

        match axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
        {
            Ok(()) => {
                info!(proxy = %handle.id, "proxy listener stopped");
                return;
            }
            Err(e) => {
                error!(proxy = %handle.id, error = %e, "proxy accept loop crashed");
                if !handle.record_restart(&e.to_string()) {
                    return;
                }
            }
        }

        listener = match rebind(&handle).await {
            Some(listener) => listener,
            None => return,
        };
    }
}

/// Re-acquire the proxy's address after a crash.
async fn rebind(handle: &ProxyHandle) -> Option<TcpListener> {
    let addr = handle.listen_addr()?;
    for _ in 0..3 {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                handle.record(TrafficEntry::Lifecycle {
                    event: "rebound".to_string(),
                    detail: Some(addr.to_string()),
                    timestamp: Utc::now(),
                });
                return Some(listener);
            }
            Err(e) => {
                warn!(proxy = %handle.id, error = %e, "rebind failed, retrying");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
    handle.record_restart("rebind failed");
    None
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
