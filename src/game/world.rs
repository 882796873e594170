//! The owned simulation context: players, NPCs, map, round and rankings

use std::collections::HashSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::store::{LeaderboardEntry, LeaderboardStore, LEADERBOARD_TOP_N};
use crate::util::random::gaussian;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, DrawState, PlayerRank, ServerMsg};

use super::character::{CharacterState, CHARACTER_BOX, MAX_HEALTH};
use super::collision::CollisionSystem;
use super::map::WorldMap;
use super::npc::{Npc, NpcTuning};
use super::round::{RoundEvent, RoundState};
use super::session::{Binding, Ingested, Outbound, SessionRegistry};

/// Simulation tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSettings {
    /// NPCs present at the start of every round
    pub initial_npcs: usize,
    /// Mean and variance of each periodic spawn batch
    pub spawn_increment: f32,
    pub npc: NpcTuning,
    /// Health lost per second per overlapping NPC
    pub damage_per_sec: f32,
}

impl WorldSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_npcs: config.initial_npc_count,
            spawn_increment: config.npc_spawn_increment,
            npc: NpcTuning {
                speed: config.npc_speed,
                search_radius: config.npc_search_radius,
            },
            damage_per_sec: config.npc_damage_per_sec,
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            initial_npcs: 8,
            spawn_increment: 3.0,
            npc: NpcTuning {
                speed: 0.12,
                search_radius: 450.0,
            },
            damage_per_sec: 30.0,
        }
    }
}

/// Summary reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WorldStatus {
    pub round: RoundState,
    pub players: usize,
    pub active_players: usize,
    pub npcs: usize,
}

/// Authoritative world state. Mutated only by the game loop task.
pub struct World {
    map: WorldMap,
    sessions: SessionRegistry,
    npcs: Vec<Npc>,
    round: RoundState,
    leaderboard: LeaderboardStore,
    /// Players of the last reset round whose death report may still arrive
    unreported: HashSet<String>,
    settings: WorldSettings,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(map: WorldMap, settings: WorldSettings, leaderboard: LeaderboardStore, seed: u64) -> Self {
        let mut world = Self {
            map,
            sessions: SessionRegistry::new(),
            npcs: Vec::new(),
            round: RoundState::Lobby,
            leaderboard,
            unreported: HashSet::new(),
            settings,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        world.populate_npcs();
        world
    }

    pub fn round(&self) -> RoundState {
        self.round
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn npcs(&self) -> &[Npc] {
        &self.npcs
    }

    pub fn leaderboard(&self) -> &LeaderboardStore {
        &self.leaderboard
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            round: self.round,
            players: self.sessions.len(),
            active_players: self.sessions.active_count(),
            npcs: self.npcs.len(),
        }
    }

    // ------------------------------------------------------------------
    // Connections and inbound messages
    // ------------------------------------------------------------------

    /// Bind a socket, greet it, and re-evaluate the lobby quorum
    pub fn connect(&mut self, requested: Option<&str>, outbound: Outbound) -> (Binding, Option<RoundEvent>) {
        let spawn = self.map.random_spawn(&mut self.rng);
        let binding = self.sessions.connect(requested, spawn, outbound);

        let welcome = ServerMsg::Welcome {
            player_id: binding.player_id.clone(),
            game_running: self.round.is_playing(),
        };
        if let Some(frame) = encode(&welcome) {
            self.sessions.send_to(&binding.player_id, &frame);
        }

        let event = self.update_round();
        (binding, event)
    }

    pub fn disconnect(&mut self, player_id: &str, connection: u64) -> Option<RoundEvent> {
        if self.sessions.disconnect(player_id, connection) {
            self.update_round()
        } else {
            None
        }
    }

    /// Whether `connection` is the live socket of `player_id`
    pub fn is_bound(&self, player_id: &str, connection: u64) -> bool {
        self.sessions.is_bound(player_id, connection)
    }

    pub fn ingest(&mut self, player_id: &str, msg: &ClientMsg) -> Option<RoundEvent> {
        if let ClientMsg::Death { death, .. } = msg {
            if death.is_set() && !self.accepts_death(player_id) {
                debug!(player_id = %player_id, round = ?self.round, "Death report outside a round ignored");
                return None;
            }
        }

        match self.sessions.ingest(player_id, msg) {
            Ingested::Death { survival_time } => self.record_death(player_id, survival_time),
            Ingested::Updated | Ingested::Ready => {}
            Ingested::Ignored => return None,
        }
        self.update_round()
    }

    /// Deaths count while playing, and once for each player of the round
    /// that just reset, since the round ends on the last catch
    fn accepts_death(&mut self, player_id: &str) -> bool {
        self.round.is_playing() || self.unreported.remove(player_id)
    }

    /// Rank the death on both leaderboards and tell everyone
    fn record_death(&mut self, player_id: &str, survival_time: f32) {
        let entry = LeaderboardEntry::new(player_id, survival_time, unix_millis());
        let rank = self.leaderboard.record(entry);

        info!(player_id = %player_id, survival_time, rank, "Player died");

        let msg = ServerMsg::Leaderboard {
            leaderboard: self.leaderboard.durable().top(LEADERBOARD_TOP_N),
            player_rank: Some(PlayerRank {
                player_id: player_id.to_string(),
                rank,
            }),
        };
        if let Some(frame) = encode(&msg) {
            self.sessions.broadcast(&frame);
        }
    }

    // ------------------------------------------------------------------
    // Periodic tasks
    // ------------------------------------------------------------------

    /// One physics/AI step over `dt_ms` milliseconds of wall-clock time
    pub fn physics_tick(&mut self, dt_ms: f32) -> Option<RoundEvent> {
        let playing = self.round.is_playing();

        if playing {
            self.update_npcs();
        }

        self.move_players(dt_ms);

        if playing {
            self.move_npcs(dt_ms);
            self.apply_contact_damage(dt_ms);
        }

        self.update_round()
    }

    /// Full world state as sent to every client
    pub fn state_message(&self) -> ServerMsg {
        ServerMsg::WorldState {
            players: self.sessions.active().map(|s| s.state.clone()).collect(),
            characters: self.npcs.iter().map(|n| n.state.clone()).collect(),
        }
    }

    pub fn broadcast_state(&self) {
        if let Some(frame) = encode(&self.state_message()) {
            self.sessions.broadcast(&frame);
        }
    }

    /// Add a Gaussian-sized batch of hunting NPCs; only while playing
    pub fn spawn_batch(&mut self) -> usize {
        if !self.round.is_playing() {
            return 0;
        }

        let increment = self.settings.spawn_increment.max(0.0);
        let count = gaussian(&mut self.rng, increment, increment.sqrt())
            .round()
            .max(0.0) as usize;

        for _ in 0..count {
            let at = self.map.random_spawn(&mut self.rng);
            let mut npc = Npc::spawn(&mut self.rng, at, self.settings.npc);
            npc.state.draw_state = DrawState::Moving;
            self.npcs.push(npc);
        }

        debug!(spawned = count, npc_count = self.npcs.len(), "Spawned NPC batch");
        count
    }

    fn update_npcs(&mut self) {
        let players: Vec<&CharacterState> = self.sessions.iter().map(|s| &s.state).collect();
        for npc in &mut self.npcs {
            npc.update(&players, &mut self.rng);
        }
    }

    fn move_players(&mut self, dt_ms: f32) {
        for session in self.sessions.iter_mut().filter(|s| s.state.active) {
            step_character(&self.map, &mut session.state, dt_ms);
        }
    }

    fn move_npcs(&mut self, dt_ms: f32) {
        for npc in &mut self.npcs {
            step_character(&self.map, &mut npc.state, dt_ms);
        }
    }

    /// NPCs overlapping a player with the same mask drain their health
    fn apply_contact_damage(&mut self, dt_ms: f32) {
        let damage = self.settings.damage_per_sec * dt_ms / 1000.0;

        for session in self.sessions.iter_mut().filter(|s| s.state.active) {
            let player = &mut session.state;
            let contacts = self
                .npcs
                .iter()
                .filter(|npc| npc.state.mask == player.mask)
                .filter(|npc| {
                    CollisionSystem::overlap(
                        &CHARACTER_BOX,
                        (npc.state.x, npc.state.y),
                        &CHARACTER_BOX,
                        (player.x, player.y),
                    )
                    .is_some()
                })
                .count();

            if contacts == 0 {
                continue;
            }

            let before = player.health;
            player.health -= damage * contacts as f32;
            if before >= 0.0 && player.health < 0.0 {
                info!(player_id = ?player.identity, contacts, "Player caught");
            }
        }
    }

    // ------------------------------------------------------------------
    // Round state machine
    // ------------------------------------------------------------------

    fn update_round(&mut self) -> Option<RoundEvent> {
        match self.round {
            round if round.is_pregame() => {
                if self.sessions.all_active_ready() {
                    self.start_round();
                    Some(RoundEvent::Started)
                } else {
                    let next = RoundState::from_readiness(self.sessions.any_active_ready());
                    if next != self.round {
                        debug!(from = ?self.round, to = ?next, "Lobby readiness changed");
                        self.round = next;
                    }
                    None
                }
            }
            RoundState::Playing => {
                let everyone_caught = self.sessions.active().all(|s| s.state.health < 0.0);
                if everyone_caught {
                    self.reset_round();
                    Some(RoundEvent::Reset)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn start_round(&mut self) {
        self.round = RoundState::Playing;
        self.unreported.clear();

        for session in self.sessions.iter_mut() {
            session.state.health = MAX_HEALTH;
            session.state.survival_time = None;
        }

        for npc in &mut self.npcs {
            npc.state.draw_state = DrawState::Moving;
        }

        if let Some(frame) = encode(&ServerMsg::start_game()) {
            self.sessions.broadcast(&frame);
        }

        info!(
            players = self.sessions.active_count(),
            npc_count = self.npcs.len(),
            "Round started"
        );
    }

    fn reset_round(&mut self) {
        self.round = RoundState::GameOver;
        info!(npc_count = self.npcs.len(), "All players caught, resetting round");

        self.sessions.clear_ready();

        if let Some(frame) = encode(&ServerMsg::reset_game()) {
            self.sessions.broadcast(&frame);
        }

        let dropped = self.sessions.purge_inactive();

        self.unreported = self
            .sessions
            .iter()
            .filter(|s| s.state.survival_time.is_none())
            .map(|s| s.identity().to_string())
            .collect();

        for session in self.sessions.iter_mut() {
            session.state.health = MAX_HEALTH;
            session.state.survival_time = None;
        }

        self.npcs.clear();
        self.populate_npcs();
        self.round = RoundState::Lobby;

        info!(
            dropped_players = dropped,
            players = self.sessions.len(),
            npc_count = self.npcs.len(),
            "Round reset to lobby"
        );
    }

    /// Initial, stationary NPC population
    fn populate_npcs(&mut self) {
        for _ in 0..self.settings.initial_npcs {
            let at = self.map.random_spawn(&mut self.rng);
            let npc = Npc::spawn(&mut self.rng, at, self.settings.npc);
            self.npcs.push(npc);
        }
    }

    #[cfg(test)]
    pub fn npcs_mut(&mut self) -> &mut Vec<Npc> {
        &mut self.npcs
    }

    #[cfg(test)]
    pub fn sessions_mut(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }
}

/// Push back against map geometry, integrate, then keep on the map
fn step_character(map: &WorldMap, state: &mut CharacterState, dt_ms: f32) {
    let factors =
        CollisionSystem::resolve_against(&map.structures, &CHARACTER_BOX, (state.x, state.y), (state.vx, state.vy));
    let (vx, vy) = factors.apply(state.vx, state.vy);
    state.vx = vx;
    state.vy = vy;

    state.integrate(dt_ms);
    let (x, y) = map.clamp(state.x, state.y);
    state.x = x;
    state.y = y;
}

fn encode(msg: &ServerMsg) -> Option<String> {
    match msg.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(error = %e, "Failed to encode server message");
            None
        }
    }
}
