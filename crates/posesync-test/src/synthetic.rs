//! Synthetic pose generator
//!
//! Produces a plausible full-body figure that sways over time, so clients can
//! be exercised without a camera. Dropout hides individual points per frame,
//! the way a real detector loses occluded landmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use posesync_core::{Frame, Observation, DEFAULT_SLOT_COUNT};
use posesync_wire::EncodeOptions;

/// Rest pose in normalized image coordinates, head first, roughly following
/// the BlazePose landmark order
const REST_POSE: [(f32, f32); 33] = [
    (0.50, 0.20), // nose
    (0.48, 0.18),
    (0.47, 0.18),
    (0.46, 0.18),
    (0.52, 0.18),
    (0.53, 0.18),
    (0.54, 0.18),
    (0.44, 0.19),
    (0.56, 0.19),
    (0.49, 0.23),
    (0.51, 0.23),
    (0.40, 0.32), // shoulders
    (0.60, 0.32),
    (0.36, 0.44), // elbows
    (0.64, 0.44),
    (0.34, 0.56), // wrists
    (0.66, 0.56),
    (0.33, 0.59),
    (0.67, 0.59),
    (0.33, 0.58),
    (0.67, 0.58),
    (0.34, 0.57),
    (0.66, 0.57),
    (0.44, 0.58), // hips
    (0.56, 0.58),
    (0.44, 0.73), // knees
    (0.56, 0.73),
    (0.44, 0.88), // ankles
    (0.56, 0.88),
    (0.43, 0.90),
    (0.57, 0.90),
    (0.45, 0.92),
    (0.55, 0.92),
];

/// Generator of synthetic pose frames
#[derive(Debug)]
pub struct SyntheticPose {
    slot_count: u32,
    dropout: f64,
    rng: StdRng,
}

impl SyntheticPose {
    /// Full-body generator with no dropout
    pub fn new() -> Self {
        Self::with_slots(DEFAULT_SLOT_COUNT as u32)
    }

    /// Generator for the first `slot_count` landmarks
    pub fn with_slots(slot_count: u32) -> Self {
        Self {
            slot_count: slot_count.min(REST_POSE.len() as u32),
            dropout: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Drop each point with probability `dropout`, reproducibly from `seed`
    pub fn with_dropout(mut self, dropout: f64, seed: u64) -> Self {
        self.dropout = dropout.clamp(0.0, 1.0);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// The pose at `t` seconds
    pub fn frame_at(&mut self, t: f32) -> Frame {
        let sway = (t * 1.3).sin() * 0.04;
        let bob = (t * 2.6).sin() * 0.01;
        let wave = (t * 4.0).sin() * 0.06;

        let mut observations = Vec::with_capacity(self.slot_count as usize);
        for id in 0..self.slot_count {
            if self.dropout > 0.0 && self.rng.gen_bool(self.dropout) {
                continue;
            }
            let (x, y) = REST_POSE[id as usize];
            // Right arm waves
            let arm = if matches!(id, 14 | 16 | 18 | 20 | 22) { wave } else { 0.0 };
            let z = -0.1 + 0.05 * (t + id as f32 * 0.2).cos();
            observations.push(Observation::new(id, x + sway, y + bob - arm, z));
        }
        Frame::new(observations)
    }

    /// Encoded payload for the pose at `t` seconds
    pub fn payload_at(&mut self, t: f32, options: &EncodeOptions) -> serde_json::Result<String> {
        let frame = self.frame_at(t);
        posesync_wire::encode(&frame, options)
    }
}

impl Default for SyntheticPose {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload observing exactly one point
pub fn single_point_payload(id: u32, x: f32, y: f32, z: f32) -> String {
    format!(
        r#"{{"pose":[{{"id":{},"x":{},"y":{},"z":{}}}]}}"#,
        id, x, y, z
    )
}
