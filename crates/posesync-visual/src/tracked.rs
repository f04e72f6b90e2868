//! Per-slot tracked state

use posesync_core::{Timestamp, Vec3};

use crate::VisibilityStage;

/// Kinematic state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackedPoint {
    /// Smoothed world position
    pub position: Vec3,
    /// Integrator velocity, world units per second
    pub velocity: Vec3,
    /// Time of the last observation, `None` until first seen
    pub last_seen: Option<Timestamp>,
}

impl TrackedPoint {
    pub fn is_seen(&self) -> bool {
        self.last_seen.is_some()
    }

    /// Jump straight to `target` at rest
    pub fn seed(&mut self, target: Vec3, now: Timestamp) {
        self.position = target;
        self.velocity = Vec3::ZERO;
        self.last_seen = Some(now);
    }
}

/// Renderable state for one slot, emitted every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSample {
    pub id: u32,
    pub position: Vec3,
    pub alpha: f32,
    pub stage: VisibilityStage,
}

impl PointSample {
    pub fn unseen(id: u32) -> Self {
        Self {
            id,
            position: Vec3::ZERO,
            alpha: 0.0,
            stage: VisibilityStage::Never,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.alpha > 0.0
    }
}
