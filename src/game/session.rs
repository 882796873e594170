//! Player session registry: identity -> entity state + outbound socket

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::ClientMsg;

use super::character::CharacterState;

/// Outbound queue of encoded frames drained by the connection's writer task
pub type Outbound = mpsc::Sender<String>;

/// A player's entry; retained across disconnects until a round reset
#[derive(Debug)]
pub struct PlayerSession {
    pub state: CharacterState,
    pub ready: bool,
    outbound: Option<Outbound>,
    /// Generation of the socket currently bound to this entry
    connection: u64,
}

impl PlayerSession {
    pub fn identity(&self) -> &str {
        self.state.identity.as_deref().unwrap_or_default()
    }

    /// Queue a frame without waiting; a full or closed queue drops it
    fn send(&self, frame: &str) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        match outbound.try_send(frame.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(player_id = %self.identity(), "Outbound queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(player_id = %self.identity(), "Outbound queue closed");
            }
        }
    }
}

/// Whether `connect` created or reused an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    New,
    Reconnected,
}

/// Result of binding a socket to an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub player_id: String,
    pub connection: u64,
    pub outcome: ConnectOutcome,
}

/// Effect of an inbound message on the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Updated,
    Ready,
    /// First death report of the round for this player
    Death { survival_time: f32 },
    Ignored,
}

/// All player entries, in join order
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<PlayerSession>,
    next_connection: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a socket. A known `requested` identity is reused (reconnection);
    /// otherwise a fresh entry with a new opaque identity is appended at
    /// `spawn`.
    pub fn connect(&mut self, requested: Option<&str>, spawn: (f32, f32), outbound: Outbound) -> Binding {
        self.next_connection += 1;
        let connection = self.next_connection;

        if let Some(session) = requested.and_then(|id| self.position(id)).map(|i| &mut self.sessions[i]) {
            session.outbound = Some(outbound);
            session.connection = connection;
            session.state.active = true;

            info!(
                player_id = %session.identity(),
                x = session.state.x,
                y = session.state.y,
                health = session.state.health,
                "Player reconnected"
            );

            return Binding {
                player_id: session.identity().to_string(),
                connection,
                outcome: ConnectOutcome::Reconnected,
            };
        }

        if let Some(id) = requested {
            debug!(requested = %id, "Unknown session identity, issuing a new one");
        }

        let player_id = Uuid::new_v4().to_string();
        self.sessions.push(PlayerSession {
            state: CharacterState::new_player(player_id.clone(), spawn.0, spawn.1),
            ready: false,
            outbound: Some(outbound),
            connection,
        });

        info!(player_id = %player_id, player_count = self.sessions.len(), "Player joined");

        Binding {
            player_id,
            connection,
            outcome: ConnectOutcome::New,
        }
    }

    /// Mark an entry inactive. Ignored when a newer socket has since been
    /// bound to the same identity.
    pub fn disconnect(&mut self, player_id: &str, connection: u64) -> bool {
        let Some(session) = self.get_mut(player_id) else {
            return false;
        };
        if session.connection != connection {
            debug!(player_id = %player_id, "Stale connection closed, keeping newer binding");
            return false;
        }

        session.state.active = false;
        session.outbound = None;
        info!(player_id = %player_id, "Player disconnected");
        true
    }

    /// Whether `connection` is the live socket of this identity
    pub fn is_bound(&self, player_id: &str, connection: u64) -> bool {
        self.get(player_id)
            .map(|s| s.state.active && s.connection == connection)
            .unwrap_or(false)
    }

    /// Apply an inbound message to the player's entry
    pub fn ingest(&mut self, player_id: &str, msg: &ClientMsg) -> Ingested {
        let Some(session) = self.get_mut(player_id) else {
            warn!(player_id = %player_id, "Message for unknown player");
            return Ingested::Ignored;
        };

        match msg {
            ClientMsg::Update { content } => {
                session.state.apply_content(content);
                Ingested::Updated
            }
            ClientMsg::Ready { ready } if ready.is_set() => {
                if !session.state.has_mask {
                    debug!(player_id = %player_id, "Ready ignored until a mask is chosen");
                    return Ingested::Ignored;
                }
                if !session.ready {
                    info!(player_id = %player_id, "Player ready");
                }
                session.ready = true;
                Ingested::Ready
            }
            ClientMsg::Death {
                death,
                survival_time,
            } if death.is_set() => {
                if session.state.survival_time.is_some() {
                    debug!(player_id = %player_id, "Duplicate death report");
                    return Ingested::Ignored;
                }
                session.state.survival_time = Some(*survival_time);
                // A reported death counts as caught even if the server has
                // not observed it yet
                if session.state.health >= 0.0 {
                    session.state.health = -1.0;
                }
                Ingested::Death {
                    survival_time: *survival_time,
                }
            }
            _ => Ingested::Ignored,
        }
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerSession> {
        self.sessions.iter().find(|s| s.identity() == player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut PlayerSession> {
        self.sessions.iter_mut().find(|s| s.identity() == player_id)
    }

    fn position(&self, player_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.identity() == player_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerSession> {
        self.sessions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn active(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.iter().filter(|s| s.state.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// At least one active player, and every active player is ready
    pub fn all_active_ready(&self) -> bool {
        let mut active = self.active().peekable();
        active.peek().is_some() && active.all(|s| s.ready)
    }

    pub fn any_active_ready(&self) -> bool {
        self.active().any(|s| s.ready)
    }

    pub fn clear_ready(&mut self) {
        for session in &mut self.sessions {
            session.ready = false;
        }
    }

    /// Remove disconnected entries; only valid at a round boundary
    pub fn purge_inactive(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.state.active);
        before - self.sessions.len()
    }

    pub fn send_to(&self, player_id: &str, frame: &str) {
        if let Some(session) = self.get(player_id) {
            session.send(frame);
        }
    }

    /// Queue a frame on every active connection
    pub fn broadcast(&self, frame: &str) {
        for session in self.active() {
            session.send(frame);
        }
    }
}
