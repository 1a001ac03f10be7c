// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy records and the proxy registry.
//!
//! A [`ProxyHandle`] owns everything scoped to one reverse proxy: the
//! traffic log, page tracker, chaos table, connected browser clients,
//! and the exec bus. The registry hands out `Arc` handles; client
//! connections keep only ids and re-resolve per command, so stopping a
//! proxy never dangles state in a client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use spot_core::{
    ChaosRule, ErrorCode, PageSession, PageSummary, PageTracker, TelemetryKind, TrafficEntry,
    TrafficFilter, TrafficLog, TrafficStats, WireError, DEFAULT_BODY_EXCERPT, DEFAULT_TRAFFIC_CAP,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::chaos::{self, ChaosOutcome};
use crate::exec::{ExecBus, ExecReply};

/// Wait this long for a browser to answer an exec broadcast.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Crash budget for the accept-loop supervisor.
const RESTART_WINDOW: Duration = Duration::from_secs(60);
const MAX_RESTARTS_PER_WINDOW: usize = 5;

/// Options accepted by `PROXY.START`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_log_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_excerpt: Option<usize>,
}

/// Wire-facing status row for a proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyStatus {
    pub id: String,
    pub target_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub restart_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub browser_clients: usize,
    pub failed: bool,
    pub traffic: TrafficStats,
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("id", &self.id)
            .field("target_url", &self.target_url)
            .finish_non_exhaustive()
    }
}

/// One running reverse proxy.
pub struct ProxyHandle {
    pub id: String,
    /// Normalized target origin, no trailing slash.
    pub target_url: String,
    pub public_url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub body_excerpt: usize,
    pub(crate) http: reqwest::Client,
    pub(crate) exec: ExecBus,
    listen_addr: Mutex<Option<SocketAddr>>,
    traffic: Mutex<TrafficLog>,
    pages: Mutex<PageTracker>,
    chaos: Mutex<Vec<ChaosRule>>,
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_client_id: AtomicU64,
    restarts: Mutex<Vec<Instant>>,
    restart_total: AtomicU64,
    last_error: Mutex<Option<String>>,
    failed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl ProxyHandle {
    pub fn new(id: &str, target_url: &str, config: &ProxyConfig) -> Result<Self, WireError> {
        let target_url = target_url.trim_end_matches('/').to_string();
        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(WireError::invalid_args(format!(
                "target_url must be http(s): {target_url}"
            )));
        }

        // No automatic decompression and no redirect following: the
        // injection pipeline owns decoding, and browsers handle 3xx.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| WireError::internal(format!("http client: {e}")))?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            id: id.to_string(),
            target_url,
            public_url: config
                .public_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            started_at: Utc::now(),
            body_excerpt: config.body_excerpt.unwrap_or(DEFAULT_BODY_EXCERPT),
            http,
            exec: ExecBus::new(),
            listen_addr: Mutex::new(None),
            traffic: Mutex::new(TrafficLog::new(
                config.max_log_size.unwrap_or(DEFAULT_TRAFFIC_CAP),
            )),
            pages: Mutex::new(PageTracker::new()),
            chaos: Mutex::new(Vec::new()),
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            restarts: Mutex::new(Vec::new()),
            restart_total: AtomicU64::new(0),
            last_error: Mutex::new(None),
            failed: AtomicBool::new(false),
            shutdown,
        })
    }

    // ─── traffic ────────────────────────────────────────────────────

    pub fn record(&self, entry: TrafficEntry) {
        self.traffic.lock().append(entry);
    }

    pub fn traffic_query(&self, filter: &TrafficFilter) -> (Vec<TrafficEntry>, TrafficStats) {
        self.traffic.lock().query(filter)
    }

    pub fn traffic_stats(&self) -> TrafficStats {
        self.traffic.lock().stats()
    }

    pub fn traffic_clear(&self) {
        self.traffic.lock().clear();
    }

    // ─── page sessions ──────────────────────────────────────────────

    pub fn page_document(&self, url: &str) -> String {
        self.pages.lock().record_document(url, Utc::now())
    }

    pub fn page_resource(&self, url: &str, status: u16, referer: Option<&str>) {
        self.pages
            .lock()
            .attach_resource(url, status, referer, Utc::now());
    }

    pub fn page_event(
        &self,
        kind: TelemetryKind,
        tab_id: Option<&str>,
        url: Option<&str>,
        payload: serde_json::Value,
    ) {
        self.pages
            .lock()
            .record_event(kind, tab_id, url, payload, Utc::now());
    }

    pub fn pages_list(&self) -> Vec<PageSummary> {
        self.pages.lock().list()
    }

    pub fn pages_get(&self, session_id: &str) -> Option<PageSession> {
        self.pages.lock().get(session_id).cloned()
    }

    pub fn pages_clear(&self) {
        self.pages.lock().clear();
    }

    pub fn pages_sweep(&self) {
        self.pages.lock().sweep(Utc::now());
    }

    // ─── chaos ──────────────────────────────────────────────────────

    pub fn chaos_add(&self, rule: ChaosRule) {
        self.chaos.lock().push(rule);
    }

    pub fn chaos_list(&self) -> Vec<ChaosRule> {
        self.chaos.lock().clone()
    }

    pub fn chaos_clear(&self) {
        self.chaos.lock().clear();
    }

    /// Replace the table with a named preset's rules.
    pub fn chaos_apply(&self, preset: &str) -> Result<Vec<String>, WireError> {
        let rules = spot_core::chaos::preset(preset)
            .ok_or_else(|| WireError::not_found(format!("chaos preset: {preset}")))?;
        let digest = chaos::digest(&rules);
        *self.chaos.lock() = rules;
        info!(proxy = %self.id, preset, "chaos preset applied");
        Ok(digest)
    }

    pub fn chaos_eval(&self, url: &str) -> ChaosOutcome {
        let rules = self.chaos.lock();
        chaos::evaluate(&rules, url)
    }

    // ─── browser clients ────────────────────────────────────────────

    pub fn add_client(&self, sender: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().insert(id, sender);
        self.record(TrafficEntry::Lifecycle {
            event: "browser_connected".to_string(),
            detail: Some(format!("client {id}")),
            timestamp: Utc::now(),
        });
        id
    }

    pub fn remove_client(&self, id: u64) {
        if self.clients.lock().remove(&id).is_some() {
            debug!(proxy = %self.id, client = id, "browser client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Fan a message out to every connected browser. Dead senders are
    /// pruned on the way. Returns how many clients got the message.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut clients = self.clients.lock();
        let mut delivered = 0;
        clients.retain(|_, tx| match tx.send(message.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => false,
        });
        delivered
    }

    // ─── exec ───────────────────────────────────────────────────────

    /// Remote-JS round trip per the exec contract: broadcast, wait for
    /// the first matching response, ignore duplicates.
    pub async fn exec(&self, code: &str, timeout: Duration) -> Result<ExecReply, WireError> {
        if self.client_count() == 0 {
            return Err(WireError::new(
                ErrorCode::NoClients,
                "no connected browser clients",
            ));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        self.record(TrafficEntry::Execution {
            request_id: request_id.clone(),
            code: code.to_string(),
            timestamp: Utc::now(),
        });

        let rx = self.exec.register(&request_id);
        let message = serde_json::json!({
            "type": "exec",
            "request_id": request_id,
            "code": code,
        })
        .to_string();
        self.broadcast(&message);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => {
                self.record(TrafficEntry::Response {
                    request_id,
                    result: reply.result.clone(),
                    error: reply.error.clone(),
                    timestamp: Utc::now(),
                });
                Ok(reply)
            }
            Ok(Err(_)) => Err(WireError::new(
                ErrorCode::ShuttingDown,
                "exec cancelled by shutdown",
            )),
            Err(_) => {
                self.exec.cancel(&request_id);
                Err(WireError::new(
                    ErrorCode::Timeout,
                    format!("no browser response within {}s", timeout.as_secs()),
                ))
            }
        }
    }

    // ─── supervisor bookkeeping ─────────────────────────────────────

    pub fn set_listen_addr(&self, addr: SocketAddr) {
        *self.listen_addr.lock() = Some(addr);
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        *self.listen_addr.lock()
    }

    /// Record an accept-loop crash. Returns true when the supervisor
    /// may rebind, false once the crash budget for the trailing minute
    /// is spent (the proxy then goes terminal).
    pub fn record_restart(&self, error: &str) -> bool {
        *self.last_error.lock() = Some(error.to_string());
        self.restart_total.fetch_add(1, Ordering::SeqCst);
        self.record(TrafficEntry::Lifecycle {
            event: "restarted".to_string(),
            detail: Some(error.to_string()),
            timestamp: Utc::now(),
        });

        let mut restarts = self.restarts.lock();
        let now = Instant::now();
        restarts.retain(|t| now.duration_since(*t) < RESTART_WINDOW);
        restarts.push(now);
        if restarts.len() >= MAX_RESTARTS_PER_WINDOW {
            self.failed.store(true, Ordering::SeqCst);
            warn!(proxy = %self.id, "restart budget exhausted, proxy failed");
            false
        } else {
            true
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tear the proxy down: stop the listener, unblock exec waiters,
    /// drop browser clients.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.exec.cancel_all();
        self.clients.lock().clear();
    }

    pub fn status(&self) -> ProxyStatus {
        ProxyStatus {
            id: self.id.clone(),
            target_url: self.target_url.clone(),
            listen_addr: self.listen_addr().map(|a| a.to_string()),
            public_url: self.public_url.clone(),
            started_at: self.started_at,
            restart_count: self.restart_total.load(Ordering::SeqCst),
            last_error: self.last_error.lock().clone(),
            browser_clients: self.client_count(),
            failed: self.is_failed(),
            traffic: self.traffic_stats(),
        }
    }
}

/// Registry of running proxies.
#[derive(Default)]
pub struct ProxyManager {
    proxies: RwLock<HashMap<String, Arc<ProxyHandle>>>,
}

impl ProxyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, handle: Arc<ProxyHandle>) -> Result<(), WireError> {
        let mut proxies = self.proxies.write();
        if proxies.contains_key(&handle.id) {
            return Err(WireError::new(
                ErrorCode::AlreadyExists,
                format!("proxy id already in use: {}", handle.id),
            ));
        }
        proxies.insert(handle.id.clone(), handle);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<ProxyHandle>, WireError> {
        self.proxies
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WireError::not_found(format!("proxy: {id}")))
    }

    pub fn list(&self) -> Vec<ProxyStatus> {
        let mut rows: Vec<ProxyStatus> =
            self.proxies.read().values().map(|h| h.status()).collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    /// Stop one proxy and forget it.
    pub fn stop(&self, id: &str) -> Result<(), WireError> {
        let handle = self
            .proxies
            .write()
            .remove(id)
            .ok_or_else(|| WireError::not_found(format!("proxy: {id}")))?;
        handle.shutdown();
        info!(proxy = %id, "proxy stopped");
        Ok(())
    }

    /// Stop everything (daemon shutdown).
    pub fn stop_all(&self) {
        let handles: Vec<Arc<ProxyHandle>> = self.proxies.write().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.shutdown();
        }
    }

    /// Periodic page-session aging across all proxies.
    pub fn sweep_pages(&self) {
        for handle in self.proxies.read().values() {
            handle.pages_sweep();
        }
    }

    pub fn count(&self) -> usize {
        self.proxies.read().len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
