//! Session configuration
//!
//! Every tunable used by the pipeline lives here. Nothing downstream bakes
//! in its own defaults; it reads them from a `PoseConfig`.

use std::time::Duration;

use crate::{PoseError, PoseResult, Vec3};

/// BlazePose landmark count
pub const DEFAULT_SLOT_COUNT: usize = 33;

/// Default upper bound for one assembled message
pub const DEFAULT_FRAME_BUFFER_CAP: usize = 1024 * 1024;

/// Mapping from normalized image coordinates to world coordinates.
///
/// The world frame is centered on the origin with `y` pointing up, so the
/// image's vertical axis is always flipped. `flip_x` mirrors horizontally,
/// which is what a front-facing camera needs to behave like a mirror.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub flip_x: bool,
    pub world_width: f32,
    pub world_height: f32,
}

impl ViewTransform {
    /// Transform a normalized observation into world space. Depth passes through.
    pub fn apply(&self, normalized: Vec3) -> Vec3 {
        let u = if self.flip_x {
            1.0 - normalized.x
        } else {
            normalized.x
        };
        Vec3 {
            x: (u - 0.5) * self.world_width,
            y: (0.5 - normalized.y) * self.world_height,
            z: normalized.z,
        }
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            flip_x: true,
            world_width: 16.0,
            world_height: 9.0,
        }
    }
}

/// Staleness thresholds for the visibility policy.
///
/// A point is held fully visible for `grace` after its last observation,
/// fades out over the window `[fade_after - fade_duration, fade_after]`
/// (never starting before `grace`), and is hidden past `fade_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadePolicy {
    pub grace: Duration,
    pub fade_after: Duration,
    pub fade_duration: Duration,
}

impl FadePolicy {
    /// Age at which the fade actually begins
    pub fn fade_start(&self) -> Duration {
        self.fade_after
            .saturating_sub(self.fade_duration)
            .max(self.grace)
    }
}

impl Default for FadePolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(250),
            fade_after: Duration::from_millis(1000),
            fade_duration: Duration::from_millis(500),
        }
    }
}

/// Interpolation strategy toward newly observed targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    /// Critically-damped spring parameterized by its time constant
    CriticallyDamped { smooth_time: Duration },
    /// Exponential moving average, `alpha` is the weight of the new sample
    Exponential { alpha: f32 },
}

impl Default for Smoothing {
    fn default() -> Self {
        Smoothing::CriticallyDamped {
            smooth_time: Duration::from_millis(80),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoseConfig {
    /// Number of tracked slots, fixed for the session
    pub slot_count: usize,
    /// Normalized to world mapping
    pub transform: ViewTransform,
    /// Visibility thresholds
    pub fade: FadePolicy,
    /// Interpolation strategy
    pub smoothing: Smoothing,
    /// Largest integration step a single tick may take
    pub max_step: Duration,
    /// Upper bound for one assembled message
    pub frame_buffer_cap: usize,
    /// Bound on the connect handshake
    pub connect_timeout: Duration,
    /// Bound on the cooperative close handshake
    pub close_timeout: Duration,
}

impl Default for PoseConfig {
    fn default() -> Self {
        PoseConfig {
            slot_count: DEFAULT_SLOT_COUNT,
            transform: ViewTransform::default(),
            fade: FadePolicy::default(),
            smoothing: Smoothing::default(),
            max_step: Duration::from_millis(100),
            frame_buffer_cap: DEFAULT_FRAME_BUFFER_CAP,
            connect_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl PoseConfig {
    /// BlazePose full-body tracking (the default)
    pub fn blazepose() -> Self {
        Self::default()
    }

    /// Snappier motion and quicker hiding, for hosts that prefer
    /// responsiveness over calm visuals
    pub fn low_latency() -> Self {
        PoseConfig {
            fade: FadePolicy {
                grace: Duration::from_millis(100),
                fade_after: Duration::from_millis(400),
                fade_duration: Duration::from_millis(200),
            },
            smoothing: Smoothing::CriticallyDamped {
                smooth_time: Duration::from_millis(30),
            },
            max_step: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Check every invariant the pipeline relies on
    pub fn validate(&self) -> PoseResult<()> {
        if self.slot_count == 0 {
            return Err(invalid("slot_count", "must be at least 1"));
        }
        if self.slot_count > u32::MAX as usize {
            return Err(invalid("slot_count", "must fit in a u32 id"));
        }

        let t = &self.transform;
        if !(t.world_width.is_finite() && t.world_width > 0.0) {
            return Err(invalid("world_width", "must be finite and positive"));
        }
        if !(t.world_height.is_finite() && t.world_height > 0.0) {
            return Err(invalid("world_height", "must be finite and positive"));
        }

        if self.fade.fade_after < self.fade.grace {
            return Err(invalid("fade_after", "must not be shorter than grace"));
        }
        if self.fade.fade_duration.is_zero() {
            return Err(invalid("fade_duration", "must be positive"));
        }

        match self.smoothing {
            Smoothing::CriticallyDamped { smooth_time } => {
                if smooth_time.is_zero() {
                    return Err(invalid("smooth_time", "must be positive"));
                }
            }
            Smoothing::Exponential { alpha } => {
                if !(alpha > 0.0 && alpha < 1.0) {
                    return Err(invalid("alpha", "must lie strictly between 0 and 1"));
                }
            }
        }

        if self.max_step.is_zero() {
            return Err(invalid("max_step", "must be positive"));
        }
        if self.frame_buffer_cap == 0 {
            return Err(invalid("frame_buffer_cap", "must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout", "must be positive"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> PoseError {
    PoseError::InvalidConfig {
        field,
        reason: reason.to_string(),
    }
}
