use std::net::{IpAddr, Ipv4Addr};

use crate::game::constants::{directory, matchmaking, player};

/// Lobby directory server configuration
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Port for the Prometheus endpoint
    pub metrics_port: u16,
    /// Records older than this are pruned (seconds)
    pub lobby_ttl_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            metrics_port: 9090,
            lobby_ttl_secs: directory::LOBBY_TTL_SECS,
        }
    }
}

fn parse_port(var: &str) -> Option<u16> {
    let value = std::env::var(var).ok()?;
    match value.parse::<u16>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be > 0, using default", var);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", var, value);
            None
        }
    }
}

fn parse_bind_address(default: IpAddr) -> IpAddr {
    match std::env::var("BIND_ADDRESS") {
        Ok(addr) => addr.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            default
        }),
        Err(_) => default,
    }
}

impl DirectoryConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();
        config.bind_address = parse_bind_address(config.bind_address);

        if let Some(port) = parse_port("PORT") {
            config.port = port;
        }
        if let Some(port) = parse_port("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Ok(ttl) = std::env::var("LOBBY_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(parsed) if parsed >= 60 => config.lobby_ttl_secs = parsed,
                Ok(_) => tracing::warn!("LOBBY_TTL_SECS must be at least 60, using default"),
                Err(_) => tracing::warn!("Invalid LOBBY_TTL_SECS '{}', using default", ttl),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.port == self.metrics_port {
            return Err("PORT and METRICS_PORT must differ".to_string());
        }
        if self.lobby_ttl_secs == 0 {
            return Err("lobby_ttl_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Headless player configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the lobby directory
    pub directory_url: String,
    pub player_name: String,
    /// Address the peer transport listens on; port 0 picks a free one
    pub bind_address: IpAddr,
    pub public_bots: usize,
    pub offline_bots: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_url: "http://127.0.0.1:3000".to_string(),
            player_name: "Player".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            public_bots: matchmaking::PUBLIC_BOTS,
            offline_bots: matchmaking::OFFLINE_BOTS,
        }
    }
}

fn parse_bot_count(var: &str) -> Option<usize> {
    let value = std::env::var(var).ok()?;
    match value.parse::<usize>() {
        Ok(parsed) if parsed < player::MAX_PLAYERS => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be below {}, using default", var, player::MAX_PLAYERS);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", var, value);
            None
        }
    }
}

impl ClientConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DIRECTORY_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.directory_url = url;
            } else {
                tracing::warn!("Invalid DIRECTORY_URL '{}', using default", url);
            }
        }

        if let Ok(name) = std::env::var("PLAYER_NAME") {
            let name = name.trim();
            if name.is_empty() {
                tracing::warn!("PLAYER_NAME is empty, using default");
            } else {
                config.player_name = name.to_string();
            }
        }

        config.bind_address = parse_bind_address(config.bind_address);
        if let Some(bots) = parse_bot_count("PUBLIC_BOTS") {
            config.public_bots = bots;
        }
        if let Some(bots) = parse_bot_count("OFFLINE_BOTS") {
            config.offline_bots = bots;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.player_name.trim().is_empty() {
            return Err("player_name cannot be empty".to_string());
        }
        if self.public_bots >= player::MAX_PLAYERS || self.offline_bots >= player::MAX_PLAYERS {
            return Err(format!("bot counts must be below {}", player::MAX_PLAYERS));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directory_config() {
        let config = DirectoryConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.lobby_ttl_secs, 1800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_directory_ports_must_differ() {
        let config = DirectoryConfig {
            metrics_port: 3000,
            ..DirectoryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.public_bots, 3);
        assert_eq!(config.offline_bots, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_rejects_blank_name() {
        let config = ClientConfig {
            player_name: "  ".into(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default() {
        let config = DirectoryConfig::load_or_default();
        assert!(config.port > 0);
        let config = ClientConfig::load_or_default();
        assert!(!config.player_name.is_empty());
    }
}
