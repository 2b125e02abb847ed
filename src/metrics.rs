//! Prometheus-compatible metrics endpoint
//!
//! One registry is shared by the directory server and any sessions running in
//! the same process. Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry
#[derive(Debug)]
pub struct Metrics {
    // Directory
    pub http_requests: AtomicU64,
    pub http_bad_requests: AtomicU64,
    pub lobbies_active: AtomicU64,
    pub registrations: AtomicU64,
    pub unregistrations: AtomicU64,
    pub lobbies_pruned: AtomicU64,

    // Request handling time (microseconds)
    pub request_time_us: AtomicU64,
    pub request_time_p95_us: AtomicU64,
    pub request_time_max_us: AtomicU64,

    // Sessions
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub send_failures: AtomicU64,
    pub roster_size: AtomicU64,
    pub matches_started: AtomicU64,
    pub matches_ended: AtomicU64,

    start_time: Instant,

    // Rolling request times for percentile calculation
    request_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            http_requests: AtomicU64::new(0),
            http_bad_requests: AtomicU64::new(0),
            lobbies_active: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            unregistrations: AtomicU64::new(0),
            lobbies_pruned: AtomicU64::new(0),
            request_time_us: AtomicU64::new(0),
            request_time_p95_us: AtomicU64::new(0),
            request_time_max_us: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            roster_size: AtomicU64::new(0),
            matches_started: AtomicU64::new(0),
            matches_ended: AtomicU64::new(0),
            start_time: Instant::now(),
            request_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record how long a directory request took and update percentiles
    pub fn record_request_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.request_time_us.store(us, Ordering::Relaxed);

        let mut history = self.request_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.request_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.request_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Directory
        metric!("peer_royale_http_requests_total", "Directory requests handled", "counter",
            self.http_requests.load(Ordering::Relaxed));
        metric!("peer_royale_http_bad_requests_total", "Directory requests rejected with 400", "counter",
            self.http_bad_requests.load(Ordering::Relaxed));
        metric!("peer_royale_lobbies_active", "Lobbies currently listed", "gauge",
            self.lobbies_active.load(Ordering::Relaxed));
        metric!("peer_royale_registrations_total", "Lobby registrations and heartbeats", "counter",
            self.registrations.load(Ordering::Relaxed));
        metric!("peer_royale_unregistrations_total", "Lobby unregistrations", "counter",
            self.unregistrations.load(Ordering::Relaxed));
        metric!("peer_royale_lobbies_pruned_total", "Lobbies pruned for age", "counter",
            self.lobbies_pruned.load(Ordering::Relaxed));
        metric!("peer_royale_request_time_microseconds", "Last request handling time", "gauge",
            self.request_time_us.load(Ordering::Relaxed));
        metric!("peer_royale_request_time_p95_microseconds", "95th percentile request handling time", "gauge",
            self.request_time_p95_us.load(Ordering::Relaxed));
        metric!("peer_royale_request_time_max_microseconds", "Maximum request handling time", "gauge",
            self.request_time_max_us.load(Ordering::Relaxed));

        // Sessions
        metric!("peer_royale_connections_active", "Open peer connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("peer_royale_messages_sent_total", "Peer messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("peer_royale_messages_received_total", "Peer messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("peer_royale_send_failures_total", "Peer sends that failed", "counter",
            self.send_failures.load(Ordering::Relaxed));
        metric!("peer_royale_roster_size", "Players in the current session", "gauge",
            self.roster_size.load(Ordering::Relaxed));
        metric!("peer_royale_matches_started_total", "Matches started", "counter",
            self.matches_started.load(Ordering::Relaxed));
        metric!("peer_royale_matches_ended_total", "Matches ended", "counter",
            self.matches_ended.load(Ordering::Relaxed));
        metric!("peer_royale_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON view of the same numbers
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "directory": {
                "requests": self.http_requests.load(Ordering::Relaxed),
                "bad_requests": self.http_bad_requests.load(Ordering::Relaxed),
                "lobbies": self.lobbies_active.load(Ordering::Relaxed),
                "registrations": self.registrations.load(Ordering::Relaxed),
                "unregistrations": self.unregistrations.load(Ordering::Relaxed),
                "request_time_p95_us": self.request_time_p95_us.load(Ordering::Relaxed),
            },
            "session": {
                "connections": self.connections_active.load(Ordering::Relaxed),
                "messages_sent": self.messages_sent.load(Ordering::Relaxed),
                "messages_received": self.messages_received.load(Ordering::Relaxed),
                "roster_size": self.roster_size.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, bind: IpAddr, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::new(bind, port);
    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") {
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK".to_string()
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
