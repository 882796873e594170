//! Game loop actor: the single task that mutates the world

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::store::{LeaderboardEntry, LEADERBOARD_TOP_N};
use crate::util::time::{broadcast_period, physics_period, TickClock};
use crate::ws::protocol::ClientMsg;

use super::round::{RoundEvent, RoundState};
use super::session::{Binding, Outbound};
use super::world::{World, WorldStatus};

/// Mailbox capacity of the game loop
const COMMAND_BUFFER: usize = 1024;

/// Requests delivered to the game loop
#[derive(Debug)]
pub enum GameCommand {
    Connect {
        requested: Option<String>,
        remote: SocketAddr,
        outbound: Outbound,
        reply: oneshot::Sender<Binding>,
    },
    Disconnect {
        player_id: String,
        connection: u64,
    },
    Input {
        player_id: String,
        connection: u64,
        msg: ClientMsg,
    },
    Status {
        reply: oneshot::Sender<WorldStatus>,
    },
    Leaderboard {
        reply: oneshot::Sender<Vec<LeaderboardEntry>>,
    },
}

/// Game loop errors
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Game loop is not running")]
    Stopped,
}

/// Cloneable handle used by connection handlers to reach the game loop
#[derive(Clone, Debug)]
pub struct GameHandle {
    tx: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    pub async fn connect(
        &self,
        requested: Option<String>,
        remote: SocketAddr,
        outbound: Outbound,
    ) -> Result<Binding, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::Connect {
            requested,
            remote,
            outbound,
            reply,
        })
        .await?;
        rx.await.map_err(|_| GameError::Stopped)
    }

    pub async fn disconnect(&self, player_id: String, connection: u64) -> Result<(), GameError> {
        self.send(GameCommand::Disconnect {
            player_id,
            connection,
        })
        .await
    }

    pub async fn input(
        &self,
        player_id: String,
        connection: u64,
        msg: ClientMsg,
    ) -> Result<(), GameError> {
        self.send(GameCommand::Input {
            player_id,
            connection,
            msg,
        })
        .await
    }

    pub async fn status(&self) -> Result<WorldStatus, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::Status { reply }).await?;
        rx.await.map_err(|_| GameError::Stopped)
    }

    /// Top entries of the durable leaderboard
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::Leaderboard { reply }).await?;
        rx.await.map_err(|_| GameError::Stopped)
    }

    async fn send(&self, cmd: GameCommand) -> Result<(), GameError> {
        self.tx.send(cmd).await.map_err(|_| GameError::Stopped)
    }
}

/// Owns the world and serializes every mutation: inbound commands, the
/// physics tick, the broadcast tick and the spawn tick
pub struct GameLoop {
    world: World,
    cmd_rx: mpsc::Receiver<GameCommand>,
    spawn_period: Duration,
}

impl GameLoop {
    pub fn new(world: World, spawn_period: Duration) -> (Self, GameHandle) {
        let (tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let game_loop = Self {
            world,
            cmd_rx,
            spawn_period,
        };
        (game_loop, GameHandle { tx })
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!(
            npc_count = self.world.npcs().len(),
            spawn_period_ms = self.spawn_period.as_millis() as u64,
            "Game loop started"
        );

        let mut physics = interval(physics_period());
        physics.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcast = interval(broadcast_period());
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Only exists while a round is being played
        let mut spawn: Option<Interval> = None;
        let mut clock = TickClock::new();

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        info!("All game handles dropped, stopping game loop");
                        break;
                    }
                },
                _ = physics.tick() => {
                    let dt_ms = clock.lap_ms();
                    let event = self.world.physics_tick(dt_ms);
                    self.log_transition(event, "physics");
                }
                _ = broadcast.tick() => {
                    self.world.broadcast_state();
                }
                _ = next_spawn(&mut spawn) => {
                    self.world.spawn_batch();
                }
            }

            self.sync_spawn_timer(&mut spawn);
        }
    }

    fn handle(&mut self, cmd: GameCommand) {
        match cmd {
            GameCommand::Connect {
                requested,
                remote,
                outbound,
                reply,
            } => {
                let (binding, event) = self.world.connect(requested.as_deref(), outbound);
                debug!(player_id = %binding.player_id, remote = %remote, outcome = ?binding.outcome, "Socket bound");
                self.log_transition(event, "connect");

                let (player_id, connection) = (binding.player_id.clone(), binding.connection);
                if reply.send(binding).is_err() {
                    warn!(player_id = %player_id, "Connection gone before bind completed");
                    let event = self.world.disconnect(&player_id, connection);
                    self.log_transition(event, "disconnect");
                }
            }
            GameCommand::Disconnect {
                player_id,
                connection,
            } => {
                let event = self.world.disconnect(&player_id, connection);
                self.log_transition(event, "disconnect");
            }
            GameCommand::Input {
                player_id,
                connection,
                msg,
            } => {
                if !self.world.is_bound(&player_id, connection) {
                    debug!(player_id = %player_id, connection, "Input from superseded socket dropped");
                    return;
                }
                let event = self.world.ingest(&player_id, &msg);
                self.log_transition(event, "input");
            }
            GameCommand::Status { reply } => {
                let _ = reply.send(self.world.status());
            }
            GameCommand::Leaderboard { reply } => {
                let _ = reply.send(self.world.leaderboard().durable().top(LEADERBOARD_TOP_N));
            }
        }
    }

    fn log_transition(&self, event: Option<RoundEvent>, cause: &'static str) {
        if let Some(event) = event {
            debug!(?event, cause, round = ?self.world.round(), "Round transition");
        }
    }

    /// Start the spawn timer on entering a round, cancel it on leaving one
    fn sync_spawn_timer(&self, spawn: &mut Option<Interval>) {
        match (self.world.round(), spawn.is_some()) {
            (RoundState::Playing, false) => {
                let mut timer = interval_at(Instant::now() + self.spawn_period, self.spawn_period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *spawn = Some(timer);
                info!("NPC spawn timer started");
            }
            (round, true) if !round.is_playing() => {
                *spawn = None;
                info!("NPC spawn timer cancelled");
            }
            _ => {}
        }
    }
}

async fn next_spawn(spawn: &mut Option<Interval>) {
    match spawn {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::WorldMap;
    use crate::game::npc::NpcTuning;
    use crate::game::world::WorldSettings;
    use crate::store::{Leaderboard, LeaderboardStore};
    use crate::ws::protocol::{ContentUpdate, Flag};
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    const SPAWN_PERIOD: Duration = Duration::from_millis(40);

    fn spawn_loop() -> GameHandle {
        let settings = WorldSettings {
            initial_npcs: 3,
            spawn_increment: 9.0,
            npc: NpcTuning {
                speed: 0.1,
                search_radius: 300.0,
            },
            damage_per_sec: 10.0,
        };
        let world = World::new(
            WorldMap::open_arena(30, 30),
            settings,
            LeaderboardStore::new(Leaderboard::new(), None),
            77,
        );
        let (game_loop, handle) = GameLoop::new(world, SPAWN_PERIOD);
        tokio::spawn(game_loop.run());
        handle
    }

    fn remote() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn next_frame(rx: &mut mpsc::Receiver<String>, marker: &str) -> String {
        let wait = async {
            loop {
                let frame = rx.recv().await.expect("outbound closed");
                if frame.contains(marker) {
                    return frame;
                }
            }
        };
        timeout(Duration::from_secs(2), wait)
            .await
            .expect("frame never arrived")
    }

    /// Pick a mask and ready up
    async fn join_round(handle: &GameHandle, id: &str, connection: u64) {
        let has_mask = ClientMsg::Update {
            content: ContentUpdate {
                has_mask: Some(true),
                ..Default::default()
            },
        };
        assert_ok!(handle.input(id.to_string(), connection, has_mask).await);
        assert_ok!(
            handle
                .input(id.to_string(), connection, ClientMsg::Ready { ready: Flag::Number(1) })
                .await
        );
    }

    #[tokio::test]
    async fn test_connect_greets_and_registers() {
        let handle = spawn_loop();
        let (tx, mut rx) = mpsc::channel(256);

        let binding = assert_ok!(handle.connect(None, remote(), tx).await);
        let welcome = next_frame(&mut rx, "player_id").await;
        assert!(welcome.contains(&binding.player_id));
        assert!(welcome.contains(r#""game_running":false"#));

        let status = assert_ok!(handle.status().await);
        assert_eq!(status.players, 1);
        assert_eq!(status.active_players, 1);
        assert_eq!(status.round, RoundState::Lobby);

        // Broadcast tick delivers full world state
        let state = next_frame(&mut rx, "characters").await;
        assert!(state.contains(r#""players":["#));
    }

    #[tokio::test]
    async fn test_spawn_runs_only_during_round() {
        let handle = spawn_loop();
        let (tx, mut rx) = mpsc::channel(1024);
        let binding = assert_ok!(handle.connect(None, remote(), tx).await);
        let (id, conn) = (binding.player_id.clone(), binding.connection);

        join_round(&handle, &id, conn).await;
        next_frame(&mut rx, "start_game").await;

        sleep(SPAWN_PERIOD * 6).await;
        let status = assert_ok!(handle.status().await);
        assert_eq!(status.round, RoundState::Playing);
        assert!(status.npcs > 3, "npcs = {}", status.npcs);

        assert_ok!(
            handle
                .input(
                    id.clone(),
                    conn,
                    ClientMsg::Update {
                        content: ContentUpdate {
                            health: Some(-1.0),
                            ..Default::default()
                        },
                    },
                )
                .await
        );
        next_frame(&mut rx, "reset_game").await;

        sleep(SPAWN_PERIOD * 4).await;
        let status = assert_ok!(handle.status().await);
        assert_eq!(status.round, RoundState::Lobby);
        assert_eq!(status.npcs, 3);
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect() {
        let handle = spawn_loop();
        let (tx, _rx) = mpsc::channel(256);
        let first = assert_ok!(handle.connect(None, remote(), tx).await);
        assert_ok!(handle.disconnect(first.player_id.clone(), first.connection).await);

        let status = assert_ok!(handle.status().await);
        assert_eq!(status.players, 1);
        assert_eq!(status.active_players, 0);

        let (tx, _rx) = mpsc::channel(256);
        let again = assert_ok!(handle.connect(Some(first.player_id.clone()), remote(), tx).await);
        assert_eq!(again.player_id, first.player_id);

        let status = assert_ok!(handle.status().await);
        assert_eq!(status.players, 1);
        assert_eq!(status.active_players, 1);
    }

    #[tokio::test]
    async fn test_leaderboard_query() {
        let handle = spawn_loop();
        let (tx, _rx) = mpsc::channel(256);
        let binding = assert_ok!(handle.connect(None, remote(), tx).await);
        join_round(&handle, &binding.player_id, binding.connection).await;
        assert_ok!(
            handle
                .input(
                    binding.player_id.clone(),
                    binding.connection,
                    ClientMsg::Death {
                        death: Flag::Number(1),
                        survival_time: 8.5,
                    },
                )
                .await
        );

        let top = assert_ok!(handle.leaderboard().await);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].player_id, binding.player_id);
        assert_eq!(top[0].time, 8.5);
    }

    #[tokio::test]
    async fn test_superseded_socket_input_is_dropped() {
        let handle = spawn_loop();
        let (tx, _old_rx) = mpsc::channel(256);
        let old = assert_ok!(handle.connect(None, remote(), tx).await);
        let (tx, _new_rx) = mpsc::channel(256);
        let new = assert_ok!(handle.connect(Some(old.player_id.clone()), remote(), tx).await);
        assert_eq!(new.player_id, old.player_id);
        assert_ne!(new.connection, old.connection);

        join_round(&handle, &old.player_id, old.connection).await;
        let status = assert_ok!(handle.status().await);
        assert_eq!(status.round, RoundState::Lobby);

        join_round(&handle, &new.player_id, new.connection).await;
        let status = assert_ok!(handle.status().await);
        assert_eq!(status.round, RoundState::Playing);
    }
}
