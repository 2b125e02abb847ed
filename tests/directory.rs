use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use peer_royale::lobby::directory::{Directory, DirectoryClient, LobbyEntry};
use peer_royale::lobby::server;
use peer_royale::lobby::store::LobbyStore;
use peer_royale::metrics::Metrics;

async fn spawn_directory() -> (String, Arc<Metrics>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let store = Arc::new(Mutex::new(LobbyStore::new(1800)));
    let metrics = Arc::new(Metrics::new());
    tokio::spawn(server::serve(listener, store, metrics.clone()));
    (base, metrics)
}

async fn raw_request(base: &str, request: &str) -> String {
    let addr = base.trim_start_matches("http://");
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_register_list_unregister() {
    let (base, metrics) = spawn_directory().await;
    let client = DirectoryClient::new(&base).unwrap();

    assert!(client.list().await.unwrap().is_empty());

    client
        .register(&LobbyEntry {
            peer_id: "host-1".into(),
            host_name: "Nova".into(),
            player_count: 4,
            max_players: 10,
        })
        .await
        .unwrap();
    client
        .register(&LobbyEntry {
            peer_id: "host-2".into(),
            host_name: "Luna".into(),
            player_count: 1,
            max_players: 10,
        })
        .await
        .unwrap();

    let listed = client.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].peer_id, "host-1");
    assert_eq!(listed[0].player_count, 4);
    assert!(listed[0].timestamp > 0);

    client.unregister("host-1").await.unwrap();
    let listed = client.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].host_name, "Luna");

    assert_eq!(metrics.registrations.load(std::sync::atomic::Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_heartbeat_keeps_single_entry() {
    let (base, _) = spawn_directory().await;
    let client = DirectoryClient::new(&base).unwrap();
    let mut entry = LobbyEntry {
        peer_id: "host".into(),
        host_name: "Nova".into(),
        player_count: 1,
        max_players: 10,
    };

    client.register(&entry).await.unwrap();
    entry.player_count = 3;
    client.register(&entry).await.unwrap();

    let listed = client.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].player_count, 3);
}

#[tokio::test]
async fn test_bad_requests_are_rejected() {
    let (base, _) = spawn_directory().await;

    let body = r#"{"hostName":"Nova"}"#;
    let response = raw_request(
        &base,
        &format!(
            "POST /api/lobbies HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 400"));

    let response = raw_request(&base, "GET /api/unknown HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"));

    let response = raw_request(&base, "PUT /api/lobbies HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 405"));

    let client = DirectoryClient::new(&base).unwrap();
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_directory_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = DirectoryClient::new(&base).unwrap();
    assert!(client.list().await.is_err());
}
