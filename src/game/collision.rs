//! Axis-aligned box overlap and velocity push-back

use std::f32::consts::{FRAC_PI_2, PI};

/// Axis-aligned collision rectangle, positioned relative to its owner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub width: f32,
    pub height: f32,
    pub x_offset: f32,
    pub y_offset: f32,
}

impl CollisionBox {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            x_offset: 0.0,
            y_offset: 0.0,
        }
    }

    pub const fn with_offset(width: f32, height: f32, x_offset: f32, y_offset: f32) -> Self {
        Self {
            width,
            height,
            x_offset,
            y_offset,
        }
    }

    /// World rectangle `(x, y, w, h)` for an owner at `(owner_x, owner_y)`
    pub fn world_rect(&self, owner_x: f32, owner_y: f32) -> (f32, f32, f32, f32) {
        (
            owner_x + self.x_offset,
            owner_y + self.y_offset,
            self.width,
            self.height,
        )
    }

    pub fn center(&self, owner_x: f32, owner_y: f32) -> (f32, f32) {
        let (x, y, w, h) = self.world_rect(owner_x, owner_y);
        (x + w / 2.0, y + h / 2.0)
    }
}

/// Static map geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Structure {
    pub x: f32,
    pub y: f32,
    pub collision: CollisionBox,
}

/// Multiplicative velocity response (1 keeps a component, 0 cancels it)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityFactors {
    pub vx: f32,
    pub vy: f32,
}

impl VelocityFactors {
    pub const UNCHANGED: Self = Self { vx: 1.0, vy: 1.0 };

    pub fn apply(&self, vx: f32, vy: f32) -> (f32, f32) {
        (vx * self.vx, vy * self.vy)
    }
}

/// Collision system for box overlap and push-back
pub struct CollisionSystem;

impl CollisionSystem {
    /// AABB intersection test. On overlap returns the vector from the center
    /// of `box1` to the center of `box2`; the moving box should be `box2`.
    pub fn overlap(
        box1: &CollisionBox,
        p1: (f32, f32),
        box2: &CollisionBox,
        p2: (f32, f32),
    ) -> Option<(f32, f32)> {
        let (x1, y1, w1, h1) = box1.world_rect(p1.0, p1.1);
        let (x2, y2, w2, h2) = box2.world_rect(p2.0, p2.1);

        if x1 < x2 + w2 && x1 + w1 > x2 && y1 < y2 + h2 && y1 + h1 > y2 {
            let (c1x, c1y) = box1.center(p1.0, p1.1);
            let (c2x, c2y) = box2.center(p2.0, p2.1);
            Some((c2x - c1x, c2y - c1y))
        } else {
            None
        }
    }

    /// Classify the overlap vector into left/right/above/below of the static
    /// box by comparing its angle with the angle of the box's top-left
    /// corner, then cancel the moving velocity component that points into
    /// the static box. Position is not corrected.
    pub fn resolve(
        static_box: &CollisionBox,
        overlap: (f32, f32),
        velocity: (f32, f32),
    ) -> VelocityFactors {
        let (vx, vy) = velocity;
        let mut factors = VelocityFactors::UNCHANGED;

        // Screen y points down, so flip to get a conventional angle
        let angle = -overlap.1.atan2(overlap.0);
        let top_left = (static_box.height / 2.0).atan2(-static_box.width / 2.0);

        // Left of the box
        if angle.abs() > FRAC_PI_2 && angle.abs() > top_left.abs() && vx > 0.0 {
            factors.vx = 0.0;
        }

        // Right of the box
        if angle.abs() < FRAC_PI_2 && angle.abs() < (PI - top_left).abs() && vx < 0.0 {
            factors.vx = 0.0;
        }

        // Above the box
        if angle > PI - top_left && angle < top_left && vy > 0.0 {
            factors.vy = 0.0;
        }

        // Below the box
        if angle > -top_left && angle < top_left - PI && vy < 0.0 {
            factors.vy = 0.0;
        }

        factors
    }

    /// Resolve a moving box against every overlapping structure and return
    /// the combined velocity factors
    pub fn resolve_against(
        structures: &[Structure],
        moving_box: &CollisionBox,
        position: (f32, f32),
        velocity: (f32, f32),
    ) -> VelocityFactors {
        let mut combined = VelocityFactors::UNCHANGED;

        for structure in structures {
            if let Some(overlap) = Self::overlap(
                &structure.collision,
                (structure.x, structure.y),
                moving_box,
                position,
            ) {
                let factors = Self::resolve(&structure.collision, overlap, velocity);
                combined.vx *= factors.vx;
                combined.vy *= factors.vy;
            }
        }

        combined
    }
}
