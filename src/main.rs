//! Arena Game Server - Authoritative multiplayer arena server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for real-time gameplay
//! - The game loop driving physics, NPCs and rounds
//! - Leaderboard persistence
//! - HTTP status endpoints

mod app;
mod config;
mod game;
mod http;
mod store;
mod util;
mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::{GameLoop, World, WorldMap, WorldSettings};
use crate::http::build_router;
use crate::store::{Leaderboard, LeaderboardStore, LeaderboardWriter};
use crate::util::time::init_server_time;

/// Fallback arena size in tiles when the map file cannot be used
const FALLBACK_ARENA: (usize, usize) = (32, 24);

/// Time allowed for the last leaderboard write after shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Game Server");
    info!("Server address: {}", config.server_addr);

    // Leaderboard: durable history plus background writer
    let durable = Leaderboard::load(&config.leaderboard_path).await;
    let (writer, writer_task) = LeaderboardWriter::spawn(&config.leaderboard_path);
    let leaderboard = LeaderboardStore::new(durable, Some(writer));

    let map = match WorldMap::load(&config.map_path) {
        Ok(map) => {
            info!(
                path = %config.map_path,
                width = map.width,
                height = map.height,
                walls = map.structures.len(),
                open_tiles = map.open_tile_count(),
                "Map loaded"
            );
            map
        }
        Err(e) => {
            warn!(path = %config.map_path, error = %e, "Map unavailable, using open arena");
            WorldMap::open_arena(FALLBACK_ARENA.0, FALLBACK_ARENA.1)
        }
    };

    let seed = config.world_seed.unwrap_or_else(rand::random);
    info!(seed, "World seeded");

    let world = World::new(map, WorldSettings::from_config(&config), leaderboard, seed);
    let (game_loop, game) = GameLoop::new(world, config.npc_spawn_interval);
    let game_task = tokio::spawn(game_loop.run());

    // Create application state and router
    let state = AppState::new(config.clone(), game);
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Game loop stops once the last handle is gone, which closes the writer
    let flushed = tokio::time::timeout(FLUSH_TIMEOUT, async {
        let _ = game_task.await;
        let _ = writer_task.await;
    })
    .await;
    if flushed.is_err() {
        warn!("Timed out waiting for leaderboard flush");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
