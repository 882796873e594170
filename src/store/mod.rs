//! Persistent stores

pub mod leaderboard;

pub use leaderboard::{
    Leaderboard, LeaderboardEntry, LeaderboardStore, LeaderboardWriter, LEADERBOARD_TOP_N,
};
