//! Headless player
//!
//! `play`               find a public match, or host one
//! `play host`          host a private match and print its id
//! `play join <id>`     join a host directly
//! `play offline`       practice against bots without any network

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, Level};

use peer_royale::config::ClientConfig;
use peer_royale::lobby::directory::DirectoryClient;
use peer_royale::lobby::matchmaking::{Established, Matchmaker, MatchmakerConfig};
use peer_royale::metrics::Metrics;
use peer_royale::net::game_session::SessionRuntime;
use peer_royale::net::tcp::TcpSignaling;
use peer_royale::render::TracingRenderer;

enum Mode {
    Play,
    Host,
    Join(String),
    Offline,
}

fn parse_mode() -> anyhow::Result<Mode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["play"] => Ok(Mode::Play),
        ["host"] => Ok(Mode::Host),
        ["join", host] => Ok(Mode::Join(host.to_string())),
        ["offline"] => Ok(Mode::Offline),
        other => bail!("Unrecognised arguments {:?}; expected play | host | join <id> | offline", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let mode = parse_mode()?;
    let config = ClientConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!("Playing as {} (directory {})", config.player_name, config.directory_url);

    let directory = Arc::new(DirectoryClient::new(&config.directory_url).context("Failed to build directory client")?);
    let signaling = TcpSignaling::new(SocketAddr::new(config.bind_address, 0));
    let matchmaker = Matchmaker::new(signaling, directory.clone(), MatchmakerConfig::from(&config));

    let established: Established = match mode {
        Mode::Play => matchmaker.play().await?,
        Mode::Host => {
            let established = matchmaker.host_private().await?;
            info!("Private match ready; share id {}", established.session.local_id());
            established
        }
        Mode::Join(host) => matchmaker.join_direct(&host).await?,
        Mode::Offline => matchmaker.host_offline().await?,
    };

    let metrics = Arc::new(Metrics::new());
    let (runtime, handle) = SessionRuntime::new(established, TracingRenderer, Some(directory), metrics);

    let leave = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Leaving match...");
            leave.leave();
        }
    });

    let outcome = runtime.run().await;
    match outcome.end_message {
        Some(message) => info!("{}", message),
        None => info!("Session ended in phase {:?}", outcome.phase),
    }
    Ok(())
}
