//! Interpolation toward observed targets

use std::time::Duration;

use posesync_core::{Smoothing, Vec3};

/// Smallest time constant the integrator accepts
const MIN_SMOOTH_TIME: f32 = 1e-4;

/// One critically-damped spring step on a single axis.
///
/// Uses the usual polynomial approximation of `exp(-omega * dt)`. The result
/// never overshoots `target`; if it would, it lands on the target at rest.
pub fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return current;
    }

    let smooth_time = smooth_time.max(MIN_SMOOTH_TIME);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * exp;
    let output = target + (change + temp) * exp;

    // Overshoot
    if (target - current > 0.0) == (output > target) {
        *velocity = 0.0;
        return target;
    }
    output
}

/// Applies the configured [`Smoothing`] to 3D points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoother {
    smoothing: Smoothing,
}

impl Smoother {
    pub fn new(smoothing: Smoothing) -> Self {
        Self { smoothing }
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    /// Advance `position` one step of `dt` toward `target`
    pub fn step(&self, position: &mut Vec3, velocity: &mut Vec3, target: Vec3, dt: Duration) {
        let dt = dt.as_secs_f32();
        match self.smoothing {
            Smoothing::CriticallyDamped { smooth_time } => {
                let st = smooth_time.as_secs_f32();
                position.x = smooth_damp(position.x, target.x, &mut velocity.x, st, dt);
                position.y = smooth_damp(position.y, target.y, &mut velocity.y, st, dt);
                position.z = smooth_damp(position.z, target.z, &mut velocity.z, st, dt);
            }
            Smoothing::Exponential { alpha } => {
                if dt > 0.0 {
                    *position = position.lerp(&target, alpha);
                }
                *velocity = Vec3::ZERO;
            }
        }
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(Smoothing::default())
    }
}
