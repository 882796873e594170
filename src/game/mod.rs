//! Game simulation modules

pub mod character;
pub mod collision;
pub mod r#loop;
pub mod map;
pub mod npc;
pub mod round;
pub mod session;
pub mod world;

pub use character::CharacterState;
pub use map::WorldMap;
pub use r#loop::{GameError, GameHandle, GameLoop};
pub use world::{World, WorldSettings, WorldStatus};
