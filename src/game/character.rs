//! Shared entity state for players and NPCs

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ws::protocol::{ContentUpdate, DrawState, Orientation};

use super::collision::CollisionBox;

/// Health every player starts a round with
pub const MAX_HEALTH: f32 = 100.0;

/// One entry of the fixed mask table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaskConfig {
    pub id: usize,
    pub name: &'static str,
    /// Tint applied by clients to sprites wearing this mask
    pub color: &'static str,
}

/// Masks selectable by players and worn by NPCs
pub const MASKS: [MaskConfig; 4] = [
    MaskConfig { id: 0, name: "fox", color: "#e07a2f" },
    MaskConfig { id: 1, name: "owl", color: "#6b8cce" },
    MaskConfig { id: 2, name: "frog", color: "#4caf50" },
    MaskConfig { id: 3, name: "cat", color: "#b05fc4" },
];

pub fn is_valid_mask(mask: usize) -> bool {
    mask < MASKS.len()
}

/// Collision footprint shared by every character sprite (64x64),
/// covering the lower part of the sprite.
pub const CHARACTER_BOX: CollisionBox = CollisionBox::with_offset(40.0, 32.0, 12.0, 28.0);

/// Physical and presentational state of a player or NPC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Session token for players, `None` for NPCs
    pub identity: Option<String>,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub orientation: Orientation,
    pub draw_state: DrawState,
    pub mask: usize,
    pub has_mask: bool,
    pub active: bool,
    pub health: f32,
    pub survival_time: Option<f32>,
}

impl CharacterState {
    /// Fresh player entry, placed at the given spawn point
    pub fn new_player(identity: String, x: f32, y: f32) -> Self {
        Self {
            identity: Some(identity),
            ..Self::new_npc(x, y, 0)
        }
    }

    pub fn new_npc(x: f32, y: f32, mask: usize) -> Self {
        Self {
            identity: None,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            orientation: Orientation::default(),
            draw_state: DrawState::default(),
            mask,
            has_mask: false,
            active: true,
            health: MAX_HEALTH,
            survival_time: None,
        }
    }

    /// A player who is still connected and not caught
    pub fn is_alive(&self) -> bool {
        self.active && self.health > 0.0
    }

    /// Recompute orientation from the current velocity.
    /// A zero velocity keeps the previous facing.
    pub fn face_velocity(&mut self) {
        if let Some(orientation) = orientation_for_velocity(self.vx, self.vy) {
            self.orientation = orientation;
        }
    }

    /// `pos += velocity * dt`, with `dt` in milliseconds
    pub fn integrate(&mut self, dt_ms: f32) {
        self.x += self.vx * dt_ms;
        self.y += self.vy * dt_ms;
    }

    /// Apply a client update; fields absent from the payload stay untouched
    pub fn apply_content(&mut self, content: &ContentUpdate) {
        if let Some(x) = content.x {
            self.x = x;
        }
        if let Some(y) = content.y {
            self.y = y;
        }
        if let Some(vx) = content.vx {
            self.vx = vx;
        }
        if let Some(vy) = content.vy {
            self.vy = vy;
        }
        if let Some(orientation) = content.orientation {
            self.orientation = orientation;
        }
        if let Some(draw_state) = content.draw_state {
            self.draw_state = draw_state;
        }
        if let Some(mask) = content.mask {
            if is_valid_mask(mask) {
                self.mask = mask;
            } else {
                warn!(identity = ?self.identity, mask, "Ignoring unknown mask");
            }
        }
        if let Some(has_mask) = content.has_mask {
            self.has_mask = has_mask;
        }
        if let Some(health) = content.health {
            self.health = health;
        }
    }
}

/// Map a velocity vector onto one of four 90° sectors using `atan2(vx, vy)`.
/// Screen coordinates: +y points down.
pub fn orientation_for_velocity(vx: f32, vy: f32) -> Option<Orientation> {
    if vx == 0.0 && vy == 0.0 {
        return None;
    }

    let angle = vx.atan2(vy);
    let quarter = std::f32::consts::FRAC_PI_4;

    let orientation = if angle.abs() <= quarter {
        Orientation::Down
    } else if angle > quarter && angle <= 3.0 * quarter {
        Orientation::Right
    } else if angle < -quarter && angle >= -3.0 * quarter {
        Orientation::Left
    } else {
        Orientation::Up
    };

    Some(orientation)
}
