//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const PHYSICS_TPS: u32 = 30; // 30 physics/AI ticks per second
pub const BROADCAST_TPS: u32 = 10; // 10 full-state broadcasts per second

/// Period of the physics/AI tick
pub fn physics_period() -> Duration {
    Duration::from_micros(1_000_000 / PHYSICS_TPS as u64)
}

/// Period of the world state broadcast
pub fn broadcast_period() -> Duration {
    Duration::from_micros(1_000_000 / BROADCAST_TPS as u64)
}

/// Measures wall-clock milliseconds between successive ticks
#[derive(Debug, Clone)]
pub struct TickClock {
    last: Instant,
}

impl TickClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Milliseconds since the previous call (or since creation)
    pub fn lap_ms(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        elapsed.as_secs_f32() * 1000.0
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periods_match_tick_rates() {
        assert_eq!(physics_period(), Duration::from_micros(33_333));
        assert_eq!(broadcast_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_tick_clock_is_monotonic() {
        let mut clock = TickClock::new();
        std::thread::sleep(Duration::from_millis(5));
        let first = clock.lap_ms();
        assert!(first >= 5.0);
        let second = clock.lap_ms();
        assert!(second >= 0.0);
        assert!(second < first);
    }
}
