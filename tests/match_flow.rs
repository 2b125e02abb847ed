use std::sync::Arc;

use tokio::time::{sleep, Duration};

use peer_royale::game::lifecycle::GamePhase;
use peer_royale::lobby::directory::InMemoryDirectory;
use peer_royale::lobby::matchmaking::{MatchKind, Matchmaker, MatchmakerConfig};
use peer_royale::metrics::Metrics;
use peer_royale::net::game_session::SessionRuntime;
use peer_royale::net::memory::MemoryNetwork;
use peer_royale::net::session::Visibility;
use peer_royale::render::{RecordingRenderer, RenderCommand};

fn config(name: &str, seed: u64) -> MatchmakerConfig {
    MatchmakerConfig {
        player_name: name.into(),
        public_bots: 0,
        seed: Some(seed),
        ..MatchmakerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_public_match_from_host_to_winner() {
    let network = MemoryNetwork::new();
    let directory = Arc::new(InMemoryDirectory::new());

    // Nobody is listed, so the first player hosts
    let host = Matchmaker::new(network.clone(), directory.clone(), config("Nova", 1))
        .play()
        .await
        .unwrap();
    assert_eq!(host.kind, MatchKind::Hosted(Visibility::Public));
    let host_id = host.session.local_id().to_string();

    let host_screen = RecordingRenderer::new();
    let (host_runtime, host_handle) =
        SessionRuntime::new(host, host_screen.clone(), Some(directory.clone()), Arc::new(Metrics::new()));
    let host_task = tokio::spawn(host_runtime.run());

    sleep(Duration::from_millis(100)).await;
    let listed = directory.records();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].peer_id, host_id);
    assert_eq!(listed[0].host_name, "Nova");

    // The second player finds and joins it
    let client = Matchmaker::new(network.clone(), directory.clone(), config("Luna", 2))
        .play()
        .await
        .unwrap();
    assert_eq!(client.kind, MatchKind::Joined { host: host_id.clone() });
    assert_eq!(client.attempted, vec![host_id.clone()]);
    assert_eq!(client.session.roster().len(), 2);
    let client_id = client.session.local_id().to_string();

    let client_screen = RecordingRenderer::new();
    let (client_runtime, client_handle) = SessionRuntime::<_, InMemoryDirectory>::new(
        client,
        client_screen.clone(),
        None,
        Arc::new(Metrics::new()),
    );
    let client_task = tokio::spawn(client_runtime.run());

    host_handle.start();
    sleep(Duration::from_millis(200)).await;
    assert!(client_screen
        .commands()
        .iter()
        .any(|c| matches!(c, RenderCommand::SpawnEntity(p) if p.id == host_id)));
    assert!(host_screen
        .commands()
        .iter()
        .any(|c| matches!(c, RenderCommand::SpawnEntity(p) if p.id == client_id)));

    // Luna quits mid-match; Nova is the last one standing
    client_handle.leave();
    let client_outcome = client_task.await.unwrap();
    assert!(!client_outcome.was_host);
    assert_eq!(client_outcome.phase, GamePhase::Ended);

    let host_outcome = host_task.await.unwrap();
    assert_eq!(host_outcome.end_message.as_deref(), Some("Nova wins! Game ending..."));
    assert_eq!(host_screen.end_screens(), vec!["Nova wins! Game ending...".to_string()]);
    assert!(directory.records().is_empty());
    assert_eq!(network.peer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_client_ends_when_host_leaves() {
    let network = MemoryNetwork::new();
    let directory = Arc::new(InMemoryDirectory::new());

    let host = Matchmaker::new(network.clone(), directory.clone(), config("Nova", 3))
        .host_private()
        .await
        .unwrap();
    let host_id = host.session.local_id().to_string();
    assert!(directory.records().is_empty());

    let (host_runtime, host_handle) = SessionRuntime::<_, InMemoryDirectory>::new(
        host,
        RecordingRenderer::new(),
        None,
        Arc::new(Metrics::new()),
    );
    let host_task = tokio::spawn(host_runtime.run());

    let client = Matchmaker::new(network.clone(), directory.clone(), config("Luna", 4))
        .join_direct(&host_id)
        .await
        .unwrap();
    let client_screen = RecordingRenderer::new();
    let (client_runtime, _client_handle) = SessionRuntime::<_, InMemoryDirectory>::new(
        client,
        client_screen.clone(),
        None,
        Arc::new(Metrics::new()),
    );
    let client_task = tokio::spawn(client_runtime.run());

    sleep(Duration::from_millis(100)).await;
    host_handle.leave();
    host_task.await.unwrap();

    let outcome = client_task.await.unwrap();
    assert_eq!(outcome.end_message.as_deref(), Some("Host left the game"));
    assert_eq!(client_screen.end_screens(), vec!["Host left the game".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_offline_practice_match_ends() {
    let network = MemoryNetwork::new();
    network.set_offline(true);
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_unavailable(true);

    let mut cfg = config("Solo", 5);
    cfg.offline_bots = 2;
    let established = Matchmaker::new(network, directory, cfg).play().await.unwrap();
    assert_eq!(established.kind, MatchKind::Hosted(Visibility::Offline));

    let (runtime, handle) = SessionRuntime::<_, InMemoryDirectory>::new(
        established,
        RecordingRenderer::new(),
        None,
        Arc::new(Metrics::new()),
    );
    let task = tokio::spawn(runtime.run());

    // Autostart fires after three seconds
    sleep(Duration::from_secs(4)).await;
    handle.leave();
    let outcome = task.await.unwrap();
    assert!(outcome.was_host);
    assert_eq!(outcome.phase, GamePhase::Ended);
}
