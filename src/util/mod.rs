//! Shared utilities

pub mod random;
pub mod rate_limit;
pub mod time;
