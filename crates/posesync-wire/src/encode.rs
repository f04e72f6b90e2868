//! Frame encoder
//!
//! Produces the same compact payload a pose server emits. Used by test
//! peers and the replay tool; the client itself only decodes.

use posesync_core::{Frame, Observation};
use serde::Serialize;

/// Encoder options
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Round coordinates to this many decimal digits to shrink payloads
    pub round_digits: Option<u32>,
    /// Value for the optional `ts` field
    pub timestamp: Option<String>,
}

impl EncodeOptions {
    /// Four-digit rounding, the usual setting for 30 Hz broadcast
    pub fn compact() -> Self {
        Self {
            round_digits: Some(4),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }

    fn coord(&self, v: f32) -> f32 {
        // JSON has no NaN; a missing landmark goes out as zero
        let v = if v.is_finite() { v } else { 0.0 };
        match self.round_digits {
            Some(digits) => {
                let scale = 10f64.powi(digits as i32);
                ((v as f64 * scale).round() / scale) as f32
            }
            None => v,
        }
    }
}

#[derive(Serialize)]
struct WirePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<&'a str>,
    pose: Vec<WirePoint>,
}

#[derive(Serialize)]
struct WirePoint {
    id: u32,
    x: f32,
    y: f32,
    z: f32,
}

/// Encode a list of observations as a payload
pub fn encode_observations(
    observations: &[Observation],
    options: &EncodeOptions,
) -> serde_json::Result<String> {
    let pose = observations
        .iter()
        .map(|o| WirePoint {
            id: o.id,
            x: options.coord(o.position.x),
            y: options.coord(o.position.y),
            z: options.coord(o.position.z),
        })
        .collect();

    serde_json::to_string(&WirePayload {
        ts: options.timestamp.as_deref(),
        pose,
    })
}

/// Encode a frame as a payload
pub fn encode(frame: &Frame, options: &EncodeOptions) -> serde_json::Result<String> {
    encode_observations(&frame.observations, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use proptest::prelude::*;

    #[test]
    fn test_encode_shape() {
        let frame = Frame::new(vec![Observation::new(15, 0.5, 0.5, 0.0)]);
        let text = encode(&frame, &EncodeOptions::default()).unwrap();
        assert_eq!(text, r#"{"pose":[{"id":15,"x":0.5,"y":0.5,"z":0.0}]}"#);

        let text = encode(&frame, &EncodeOptions::default().with_timestamp("T0")).unwrap();
        assert!(text.starts_with(r#"{"ts":"T0","pose":"#));
    }

    #[test]
    fn test_nan_becomes_zero_and_rounding() {
        let frame = Frame::new(vec![Observation::new(1, f32::NAN, 0.123_456, -0.987_654)]);
        let decoded = decode(encode(&frame, &EncodeOptions::compact()).unwrap().as_bytes()).unwrap();

        let p = decoded.observations[0].position;
        assert_eq!(p.x, 0.0);
        assert!((p.y - 0.1235).abs() < 1e-6);
        assert!((p.z + 0.9877).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_decode_recovers_encoded_tuples(
            points in prop::collection::vec((0u32..64, 0.0f32..1.0, 0.0f32..1.0, -1.0f32..1.0), 0..40)
        ) {
            let frame = Frame::new(
                points.iter().map(|&(id, x, y, z)| Observation::new(id, x, y, z)).collect(),
            );
            let text = encode(&frame, &EncodeOptions::default()).unwrap();
            let decoded = decode(text.as_bytes()).unwrap();

            prop_assert_eq!(decoded.len(), frame.len());
            for (a, b) in frame.observations.iter().zip(decoded.observations.iter()) {
                prop_assert_eq!(a.id, b.id);
                prop_assert!(a.position.distance(&b.position) < 1e-5);
            }
        }
    }
}
