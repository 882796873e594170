//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; any origin when unset
    pub client_origin: Option<String>,

    /// ASCII map consumed at startup
    pub map_path: String,
    /// Durable leaderboard file
    pub leaderboard_path: String,

    /// NPCs created at the start of every round
    pub initial_npc_count: usize,
    /// Seconds between spawn batches while a round is playing
    pub npc_spawn_interval: Duration,
    /// Mean and variance of each spawn batch
    pub npc_spawn_increment: f32,
    /// NPC pursuit speed (world units per millisecond)
    pub npc_speed: f32,
    /// NPC target acquisition radius (world units)
    pub npc_search_radius: f32,
    /// Health per second drained by each touching NPC
    pub npc_damage_per_sec: f32,
    /// Fixed RNG seed; random when unset
    pub world_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            map_path: env::var("MAP_PATH").unwrap_or_else(|_| "assets/map.txt".to_string()),
            leaderboard_path: env::var("LEADERBOARD_PATH")
                .unwrap_or_else(|_| "leaderboard.txt".to_string()),

            initial_npc_count: parse_var("INITIAL_NPC_COUNT", 8)?,
            npc_spawn_interval: Duration::from_secs_f32(
                parse_var::<f32>("NPC_SPAWN_INTERVAL_SECS", 8.0)?.max(0.1),
            ),
            npc_spawn_increment: parse_var("NPC_SPAWN_INCREMENT", 3.0)?,
            npc_speed: parse_var("NPC_SPEED", 0.12)?,
            npc_search_radius: parse_var("NPC_SEARCH_RADIUS", 450.0)?,
            npc_damage_per_sec: parse_var("NPC_DAMAGE_PER_SEC", 30.0)?,
            world_seed: parse_optional_var("WORLD_SEED")?,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional_var(name)?.unwrap_or(default))
}

fn parse_optional_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names; the process environment is shared
    #[test]
    fn test_parse_var_default_and_override() {
        env::remove_var("ARENA_TEST_COUNT");
        assert_eq!(parse_var("ARENA_TEST_COUNT", 5usize).unwrap(), 5);

        env::set_var("ARENA_TEST_COUNT", " 12 ");
        assert_eq!(parse_var("ARENA_TEST_COUNT", 5usize).unwrap(), 12);
        env::remove_var("ARENA_TEST_COUNT");
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("ARENA_TEST_SPEED", "fast");
        assert!(matches!(
            parse_var::<f32>("ARENA_TEST_SPEED", 0.1),
            Err(ConfigError::Invalid("ARENA_TEST_SPEED"))
        ));
        env::remove_var("ARENA_TEST_SPEED");
    }

    #[test]
    fn test_optional_var() {
        env::remove_var("ARENA_TEST_SEED");
        assert_eq!(parse_optional_var::<u64>("ARENA_TEST_SEED").unwrap(), None);
        env::set_var("ARENA_TEST_SEED", "99");
        assert_eq!(parse_optional_var::<u64>("ARENA_TEST_SEED").unwrap(), Some(99));
        env::remove_var("ARENA_TEST_SEED");
    }
}
