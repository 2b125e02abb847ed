//! Lobby directory HTTP server
//!
//! A small JSON API over plain TCP:
//!
//! - `GET /api/lobbies` lists every record
//! - `POST /api/lobbies` registers or refreshes one
//! - `DELETE /api/lobbies` removes one
//!
//! Records past their TTL are pruned on every request. Responses carry
//! permissive CORS headers so browser clients can call it cross-origin.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::game::constants::directory::{DEFAULT_MAX_PLAYERS, DEFAULT_PLAYER_COUNT, MAX_REQUEST_SIZE};
use crate::lobby::directory::{now_millis, LobbyEntry, LobbyList};
use crate::lobby::store::LobbyStore;
use crate::metrics::Metrics;

const LOBBIES_PATH: &str = "/api/lobbies";
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "error": message }))
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Payload Too Large",
            _ => "Internal Server Error",
        }
    }

    /// Full HTTP/1.1 response with CORS headers
    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, DELETE, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.body.len(),
            self.body
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    peer_id: Option<String>,
    host_name: Option<String>,
    player_count: Option<u32>,
    max_players: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnregisterBody {
    peer_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Route one request against the store
pub fn handle_request(
    method: &str,
    path: &str,
    body: &[u8],
    store: &mut LobbyStore,
    now_ms: i64,
    metrics: &Metrics,
) -> HttpResponse {
    let pruned = store.prune(now_ms);
    if pruned > 0 {
        debug!("Pruned {} stale lobbies", pruned);
        metrics.lobbies_pruned.fetch_add(pruned as u64, Ordering::Relaxed);
    }

    let path = path.split('?').next().unwrap_or(path);
    if path != LOBBIES_PATH && path != "/api/lobbies/" {
        return HttpResponse::error(404, "Not found");
    }

    let response = match method {
        "OPTIONS" => HttpResponse {
            status: 200,
            body: String::new(),
        },
        "GET" => match serde_json::to_value(LobbyList {
            lobbies: store.list(),
        }) {
            Ok(list) => HttpResponse::json(200, list),
            Err(e) => {
                warn!("Failed to serialize lobby list: {}", e);
                HttpResponse::error(500, "Internal error")
            }
        },
        "POST" => match serde_json::from_slice::<RegisterBody>(body) {
            Ok(request) => match (non_empty(request.peer_id), non_empty(request.host_name)) {
                (Some(peer_id), Some(host_name)) => {
                    let entry = LobbyEntry {
                        peer_id,
                        host_name,
                        player_count: request.player_count.unwrap_or(DEFAULT_PLAYER_COUNT),
                        max_players: request.max_players.unwrap_or(DEFAULT_MAX_PLAYERS),
                    };
                    if store.upsert(entry.clone(), now_ms) {
                        info!("Lobby registered: {} ({})", entry.host_name, entry.peer_id);
                    }
                    metrics.registrations.fetch_add(1, Ordering::Relaxed);
                    HttpResponse::json(200, json!({ "success": true }))
                }
                _ => HttpResponse::error(400, "peerId and hostName are required"),
            },
            Err(_) => HttpResponse::error(400, "Invalid JSON"),
        },
        "DELETE" => match serde_json::from_slice::<UnregisterBody>(body) {
            Ok(request) => match non_empty(request.peer_id) {
                Some(peer_id) => {
                    if store.remove(&peer_id) {
                        info!("Lobby removed: {}", peer_id);
                        metrics.unregistrations.fetch_add(1, Ordering::Relaxed);
                    }
                    HttpResponse::json(200, json!({ "success": true }))
                }
                None => HttpResponse::error(400, "peerId is required"),
            },
            Err(_) => HttpResponse::error(400, "Invalid JSON"),
        },
        _ => HttpResponse::error(405, "Method not allowed"),
    };

    if response.status == 400 {
        metrics.http_bad_requests.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .lobbies_active
        .store(store.len() as u64, Ordering::Relaxed);
    response
}

/// Parsed request head plus body
#[derive(Debug)]
struct RawRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Request too large")]
    TooLarge,
    #[error("Malformed request")]
    Malformed,
    #[error("Connection closed")]
    Closed,
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_request(socket: &mut TcpStream) -> Result<RawRequest, RequestError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        if buf.len() > MAX_REQUEST_SIZE {
            return Err(RequestError::TooLarge);
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().ok_or(RequestError::Malformed)?.split_whitespace();
    let method = request_line.next().ok_or(RequestError::Malformed)?.to_string();
    let path = request_line.next().ok_or(RequestError::Malformed)?.to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse::<usize>())
        .transpose()
        .map_err(|_| RequestError::Malformed)?
        .unwrap_or(0);
    if content_length > MAX_REQUEST_SIZE {
        return Err(RequestError::TooLarge);
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Closed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(RawRequest { method, path, body })
}

async fn handle_connection(mut socket: TcpStream, store: Arc<Mutex<LobbyStore>>, metrics: Arc<Metrics>) {
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());

    let response = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut socket)).await {
        Ok(Ok(request)) => {
            let started = Instant::now();
            metrics.http_requests.fetch_add(1, Ordering::Relaxed);
            debug!("{} {} from {}", request.method, request.path, peer);
            let response = handle_request(
                &request.method,
                &request.path,
                &request.body,
                &mut store.lock(),
                now_millis(),
                &metrics,
            );
            metrics.record_request_time(started.elapsed());
            response
        }
        Ok(Err(RequestError::TooLarge)) => HttpResponse::error(413, "Request too large"),
        Ok(Err(RequestError::Closed)) => return,
        Ok(Err(e)) => {
            debug!("Bad request from {}: {}", peer, e);
            HttpResponse::error(400, "Malformed request")
        }
        Err(_) => {
            debug!("Request from {} timed out", peer);
            return;
        }
    };

    if let Err(e) = socket.write_all(response.to_http().as_bytes()).await {
        debug!("Failed to write response to {}: {}", peer, e);
    }
    let _ = socket.shutdown().await;
}

/// Accept and serve directory requests forever
pub async fn serve(listener: TcpListener, store: Arc<Mutex<LobbyStore>>, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    info!("Lobby directory listening on http://{}{}", listener.local_addr()?, LOBBIES_PATH);

    loop {
        let (socket, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        tokio::spawn(handle_connection(socket, store.clone(), metrics.clone()));
    }
}
