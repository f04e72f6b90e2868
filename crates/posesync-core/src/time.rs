//! Time primitives for the pose pipeline
//!
//! All staleness decisions are made against a `Timestamp` supplied by the
//! host on every tick. The host may drive it from `SessionClock` or from its
//! own frame clock.

use std::ops::{Add, Sub};
use std::time::{Duration, Instant};

/// Session time, in microseconds since the session epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs * 1_000_000.0) as i64)
    }

    #[inline]
    pub fn as_micros(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0 / 1000
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn since(self, earlier: Timestamp) -> Duration {
        self - earlier
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration_micros(duration)))
    }

    #[inline]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration_micros(duration)))
    }
}

/// Whole microseconds in `duration`, clamped to the `i64` range
#[inline]
fn duration_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        if self.0 > rhs.0 {
            Duration::from_micros(self.0.abs_diff(rhs.0))
        } else {
            Duration::ZERO
        }
    }
}

impl std::fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({:.3}ms)", self.0 as f64 / 1000.0)
    }
}

/// Monotonic session clock backed by the OS monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    epoch: Instant,
}

impl SessionClock {
    /// Start a clock whose epoch is now
    pub fn new() -> Self {
        SessionClock {
            epoch: Instant::now(),
        }
    }

    /// Current session time
    pub fn now(&self) -> Timestamp {
        Timestamp::from_micros(duration_micros(self.epoch.elapsed()))
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
