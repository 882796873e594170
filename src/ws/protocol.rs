//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::CharacterState;
use crate::store::LeaderboardEntry;

/// Facing direction of a character sprite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
}

impl Default for Orientation {
    fn default() -> Self {
        Self::Down
    }
}

/// Presentational animation flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawState {
    Stationary,
    Moving,
}

impl Default for DrawState {
    fn default() -> Self {
        Self::Stationary
    }
}

/// Marker field value; clients send either `1` or `true`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Number(u8),
}

impl Flag {
    pub fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Number(n) => n != 0,
        }
    }
}

/// Messages sent from client to server.
///
/// Variants are distinguished by which marker key is present. A payload
/// matching none of them is rejected at the deserialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMsg {
    /// Round-end survival report
    Death {
        death: Flag,
        survival_time: f32,
    },

    /// Mark this connection's player ready
    Ready {
        ready: Flag,
    },

    /// Kinematic/state update
    Update {
        content: ContentUpdate,
    },
}

/// Partial character update. Absent fields leave the entity unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub orientation: Option<Orientation>,
    pub draw_state: Option<DrawState>,
    pub mask: Option<usize>,
    pub has_mask: Option<bool>,
    pub health: Option<f32>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMsg {
    /// Sent once per connection establishment
    Welcome {
        player_id: String,
        game_running: bool,
    },

    /// Periodic full-state broadcast
    WorldState {
        players: Vec<CharacterState>,
        characters: Vec<CharacterState>,
    },

    /// Round start notification
    StartGame {
        start_game: u8,
    },

    /// Round reset notification
    ResetGame {
        reset_game: u8,
    },

    /// Ranking update sent on a death event
    Leaderboard {
        leaderboard: Vec<LeaderboardEntry>,
        player_rank: Option<PlayerRank>,
    },
}

impl ServerMsg {
    pub fn start_game() -> Self {
        Self::StartGame { start_game: 1 }
    }

    pub fn reset_game() -> Self {
        Self::ResetGame { reset_game: 1 }
    }

    /// Encode to the JSON text frame sent over the socket
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Rank of a single player within the session leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRank {
    pub player_id: String,
    pub rank: usize,
}
