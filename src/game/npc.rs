//! NPC pursuit and idle behavior

use rand::Rng;
use tracing::debug;

use crate::util::random::{gaussian, random_direction};

use super::character::{CharacterState, MASKS};

/// Fraction of velocity an idle NPC keeps each tick
const IDLE_DAMPING: f32 = 0.1;

/// Standard deviation of the idle wander noise (world units / ms)
const IDLE_NOISE_SIGMA: f32 = 0.02;

/// Below this separation the pursuit direction is undefined
const MIN_PURSUIT_DISTANCE: f32 = 1e-3;

/// Tunables shared by every NPC
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpcTuning {
    /// Pursuit speed in world units per millisecond
    pub speed: f32,
    /// Acquisition radius in world units
    pub search_radius: f32,
}

/// Non-player character hunting players that share its mask
#[derive(Debug, Clone)]
pub struct Npc {
    pub state: CharacterState,
    /// Identity of the pursued player
    pub target: Option<String>,
    pub search_radius: f32,
    pub speed: f32,
}

impl Npc {
    pub fn new(x: f32, y: f32, mask: usize, tuning: NpcTuning) -> Self {
        Self {
            state: CharacterState::new_npc(x, y, mask),
            target: None,
            search_radius: tuning.search_radius,
            speed: tuning.speed,
        }
    }

    /// NPC at a given spawn point wearing a random mask
    pub fn spawn<R: Rng + ?Sized>(rng: &mut R, at: (f32, f32), tuning: NpcTuning) -> Self {
        let mask = rng.gen_range(0..MASKS.len());
        debug!(mask = MASKS[mask].name, x = at.0, y = at.1, "NPC spawned");
        Self::new(at.0, at.1, mask, tuning)
    }

    /// One behavior step: acquire, validate, then steer or drift.
    /// Position integration is left to the caller.
    pub fn update<R: Rng + ?Sized>(&mut self, players: &[&CharacterState], rng: &mut R) {
        self.acquire_target(players);
        self.validate_target(players);

        let target_pos = self
            .target
            .as_deref()
            .and_then(|id| find_player(players, id))
            .map(|p| (p.x, p.y));

        match target_pos {
            Some(pos) => self.pursue(pos, rng),
            None => self.drift(rng),
        }

        self.state.face_velocity();
    }

    /// Nearest eligible player within the search radius replaces the
    /// current target. With no candidate the current target is kept.
    fn acquire_target(&mut self, players: &[&CharacterState]) {
        let nearest = players
            .iter()
            .filter(|p| p.is_alive() && p.mask == self.state.mask)
            .filter_map(|p| {
                let id = p.identity.as_deref()?;
                let distance = self.distance_to(p.x, p.y);
                (distance <= self.search_radius).then_some((id, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((id, distance)) = nearest {
            if self.target.as_deref() != Some(id) {
                debug!(target = %id, distance, mask = self.state.mask, "NPC acquired target");
                self.target = Some(id.to_string());
            }
        }
    }

    /// Drop a target that changed mask, disconnected, was caught or is gone
    fn validate_target(&mut self, players: &[&CharacterState]) {
        let Some(id) = self.target.as_deref() else {
            return;
        };

        let valid = find_player(players, id)
            .map(|p| p.mask == self.state.mask && p.is_alive())
            .unwrap_or(false);

        if !valid {
            debug!(target = %id, "NPC dropped target");
            self.target = None;
        }
    }

    fn pursue<R: Rng + ?Sized>(&mut self, target: (f32, f32), rng: &mut R) {
        let dx = target.0 - self.state.x;
        let dy = target.1 - self.state.y;
        let distance = (dx * dx + dy * dy).sqrt();

        let (nx, ny) = if distance < MIN_PURSUIT_DISTANCE {
            random_direction(rng)
        } else {
            (dx / distance, dy / distance)
        };

        self.state.vx = self.speed * nx;
        self.state.vy = self.speed * ny;
    }

    fn drift<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.state.vx = self.state.vx * IDLE_DAMPING + gaussian(rng, 0.0, IDLE_NOISE_SIGMA);
        self.state.vy = self.state.vy * IDLE_DAMPING + gaussian(rng, 0.0, IDLE_NOISE_SIGMA);
    }

    fn distance_to(&self, x: f32, y: f32) -> f32 {
        let dx = x - self.state.x;
        let dy = y - self.state.y;
        (dx * dx + dy * dy).sqrt()
    }
}

fn find_player<'a>(players: &[&'a CharacterState], id: &str) -> Option<&'a CharacterState> {
    players
        .iter()
        .copied()
        .find(|p| p.identity.as_deref() == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Orientation;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TUNING: NpcTuning = NpcTuning {
        speed: 0.1,
        search_radius: 200.0,
    };

    fn player(id: &str, x: f32, y: f32, mask: usize) -> CharacterState {
        let mut p = CharacterState::new_player(id.to_string(), x, y);
        p.mask = mask;
        p.has_mask = true;
        p
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn speed(state: &CharacterState) -> f32 {
        (state.vx * state.vx + state.vy * state.vy).sqrt()
    }

    #[test]
    fn test_selects_nearest_matching_player() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let p1 = player("p1", 100.0, 0.0, 0);
        let p2 = player("p2", 0.0, 50.0, 0);

        npc.update(&[&p1, &p2], &mut rng());
        assert_eq!(npc.target.as_deref(), Some("p2"));
    }

    #[test]
    fn test_skips_players_with_other_masks() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let p1 = player("p1", 100.0, 0.0, 0);
        let p2 = player("p2", 0.0, 50.0, 1);

        npc.update(&[&p1, &p2], &mut rng());
        assert_eq!(npc.target.as_deref(), Some("p1"));

        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let p1 = player("p1", 100.0, 0.0, 2);
        npc.update(&[&p1, &p2], &mut rng());
        assert_eq!(npc.target, None);
    }

    #[test]
    fn test_skips_disconnected_players() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let mut offline = player("offline", 10.0, 0.0, 0);
        offline.active = false;
        let online = player("online", 120.0, 0.0, 0);

        npc.update(&[&offline, &online], &mut rng());
        assert_eq!(npc.target.as_deref(), Some("online"));

        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        npc.update(&[&offline], &mut rng());
        assert_eq!(npc.target, None);
    }

    #[test]
    fn test_ignores_players_outside_radius() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let far = player("far", 500.0, 0.0, 0);
        npc.update(&[&far], &mut rng());
        assert_eq!(npc.target, None);
    }

    #[test]
    fn test_switches_to_closer_candidate() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let p1 = player("p1", 100.0, 0.0, 0);
        npc.update(&[&p1], &mut rng());
        assert_eq!(npc.target.as_deref(), Some("p1"));

        let p2 = player("p2", -30.0, 0.0, 0);
        npc.update(&[&p1, &p2], &mut rng());
        assert_eq!(npc.target.as_deref(), Some("p2"));
    }

    #[test]
    fn test_retains_target_that_walks_out_of_radius() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let near = player("p1", 100.0, 0.0, 0);
        npc.update(&[&near], &mut rng());

        let escaped = player("p1", 1000.0, 0.0, 0);
        npc.update(&[&escaped], &mut rng());
        assert_eq!(npc.target.as_deref(), Some("p1"));
        assert!((npc.state.vx - TUNING.speed).abs() < 1e-6);
    }

    #[test]
    fn test_drops_target_on_mask_change_or_disconnect() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        let p1 = player("p1", 100.0, 0.0, 0);
        npc.update(&[&p1], &mut rng());
        assert!(npc.target.is_some());

        let masked = player("p1", 100.0, 0.0, 3);
        npc.update(&[&masked], &mut rng());
        assert_eq!(npc.target, None);

        npc.update(&[&p1], &mut rng());
        assert!(npc.target.is_some());
        let mut gone = p1.clone();
        gone.active = false;
        npc.update(&[&gone], &mut rng());
        assert_eq!(npc.target, None);

        npc.update(&[&p1], &mut rng());
        let mut caught = p1.clone();
        caught.health = -1.0;
        npc.update(&[&caught], &mut rng());
        assert_eq!(npc.target, None);
    }

    #[test]
    fn test_pursuit_velocity_is_normalized() {
        let mut npc = Npc::new(0.0, 0.0, 1, TUNING);
        let p = player("p", 30.0, -40.0, 1);
        npc.update(&[&p], &mut rng());

        assert!((npc.state.vx - 0.06).abs() < 1e-6);
        assert!((npc.state.vy + 0.08).abs() < 1e-6);
        assert!((speed(&npc.state) - TUNING.speed).abs() < 1e-6);
        assert_eq!(npc.state.orientation, Orientation::Up);
    }

    #[test]
    fn test_coincident_target_gets_random_direction() {
        let mut npc = Npc::new(10.0, 10.0, 0, TUNING);
        let p = player("p", 10.0, 10.0, 0);
        npc.update(&[&p], &mut rng());

        assert!(npc.state.vx.is_finite() && npc.state.vy.is_finite());
        assert!((speed(&npc.state) - TUNING.speed).abs() < 1e-5);
    }

    #[test]
    fn test_idle_drift_damps_and_wanders() {
        let mut npc = Npc::new(0.0, 0.0, 0, TUNING);
        npc.state.vx = 5.0;
        npc.state.vy = -5.0;
        let mut rng = rng();

        npc.update(&[], &mut rng);
        // Damped to ~0.5 plus small noise
        assert!(npc.state.vx > 0.3 && npc.state.vx < 0.7, "vx = {}", npc.state.vx);
        assert!(npc.state.vy < -0.3 && npc.state.vy > -0.7, "vy = {}", npc.state.vy);

        // After settling, idle NPCs keep moving a little rather than freezing
        for _ in 0..20 {
            npc.update(&[], &mut rng);
        }
        assert!(speed(&npc.state) > 0.0);
        assert!(speed(&npc.state) < 0.2);
    }
}
