//! Observations and frames
//!
//! An observation is one tracked point's reported position in one frame.
//! Coordinates are normalized image space: `x` and `y` in [0, 1] with `y`
//! growing downward, `z` a relative depth.

use crate::Vec3;

/// One tracked point's position as reported by the peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Stable point identifier (slot index)
    pub id: u32,
    /// Normalized position
    pub position: Vec3,
}

impl Observation {
    pub fn new(id: u32, x: f32, y: f32, z: f32) -> Self {
        Self {
            id,
            position: Vec3::new(x, y, z),
        }
    }
}

/// One complete set of observations received as a single logical message.
///
/// Observations keep arrival order. A frame may contain the same id more
/// than once; consumers resolve that last-one-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Observations in payload order
    pub observations: Vec<Observation>,
    /// Records dropped by the decoder because they were malformed
    pub skipped_records: u32,
}

impl Frame {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self {
            observations,
            skipped_records: 0,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Last observation for `id`, matching the last-one-wins rule
    pub fn get(&self, id: u32) -> Option<&Observation> {
        self.observations.iter().rev().find(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_last_one_wins() {
        let frame = Frame::new(vec![
            Observation::new(3, 0.1, 0.1, 0.0),
            Observation::new(4, 0.2, 0.2, 0.0),
            Observation::new(3, 0.9, 0.9, 0.0),
        ]);

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.get(3).map(|o| o.position.x), Some(0.9));
        assert!(frame.get(7).is_none());
        assert!(Frame::empty().is_empty());
    }
}
