//! Round lifecycle states

use serde::Serialize;

/// Lobby -> ready-pending -> playing -> game over -> lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    /// Waiting for players; nobody active is ready yet
    Lobby,
    /// Some, but not all, active players are ready
    ReadyPending,
    /// NPCs hunt and damage players
    Playing,
    /// Every active player was caught; reset is under way
    GameOver,
}

impl RoundState {
    pub fn is_playing(self) -> bool {
        self == RoundState::Playing
    }

    /// Pre-game state implied by the lobby's readiness
    pub fn from_readiness(any_ready: bool) -> Self {
        if any_ready {
            RoundState::ReadyPending
        } else {
            RoundState::Lobby
        }
    }

    pub fn is_pregame(self) -> bool {
        matches!(self, RoundState::Lobby | RoundState::ReadyPending)
    }
}

/// Round transition produced by a simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    Started,
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pregame_states() {
        assert!(RoundState::Lobby.is_pregame());
        assert!(RoundState::ReadyPending.is_pregame());
        assert!(!RoundState::Playing.is_pregame());
        assert!(!RoundState::GameOver.is_pregame());
        assert_eq!(RoundState::from_readiness(true), RoundState::ReadyPending);
        assert_eq!(RoundState::from_readiness(false), RoundState::Lobby);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&RoundState::ReadyPending).unwrap();
        assert_eq!(json, r#""ready_pending""#);
    }
}
