//! Staleness-driven visibility
//!
//! Visibility is a pure function of how long ago a slot was last observed.
//!
//! ```text
//! alpha
//!   1 |------------------\
//!     |                  :\
//!     |                  : \
//!   0 +------------------+--+---------> age
//!     0     grace   fade_start  fade_after
//! ```

use std::time::Duration;

use posesync_core::FadePolicy;

/// Where a slot is in its visibility lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityStage {
    /// Never observed this session
    Never,
    /// Observed within the grace window
    Fresh,
    /// Past grace but not yet fading
    Held,
    /// Inside the fade window
    Fading,
    /// Past `fade_after`
    Hidden,
}

impl VisibilityStage {
    /// Classify an age; `None` means never seen
    pub fn classify(policy: &FadePolicy, age: Option<Duration>) -> Self {
        let Some(age) = age else {
            return VisibilityStage::Never;
        };
        if age <= policy.grace {
            VisibilityStage::Fresh
        } else if age <= policy.fade_start() {
            VisibilityStage::Held
        } else if age <= policy.fade_after {
            VisibilityStage::Fading
        } else {
            VisibilityStage::Hidden
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityStage::Never => "never",
            VisibilityStage::Fresh => "fresh",
            VisibilityStage::Held => "held",
            VisibilityStage::Fading => "fading",
            VisibilityStage::Hidden => "hidden",
        }
    }
}

/// Opacity for a slot of the given age; `None` means never seen.
///
/// The fade is linear from 1 at `fade_start` down to 0 at `fade_after`.
pub fn visibility_alpha(policy: &FadePolicy, age: Option<Duration>) -> f32 {
    let Some(age) = age else {
        return 0.0;
    };

    let fade_start = policy.fade_start();
    if age <= fade_start {
        return 1.0;
    }
    if age > policy.fade_after {
        return 0.0;
    }

    let window = (policy.fade_after - fade_start).as_secs_f32();
    if window <= 0.0 {
        return 0.0;
    }
    let remaining = (policy.fade_after - age).as_secs_f32();
    (remaining / window).clamp(0.0, 1.0)
}
