//! Frame decoder
//!
//! Decoding is a pure function of the payload bytes. Errors that make the
//! whole payload unusable (bad UTF-8, broken JSON, `pose` of the wrong type)
//! fail the frame. A single malformed record is skipped and counted in
//! `Frame::skipped_records`; the remaining records still decode.

use posesync_core::{Frame, Observation, PoseError, PoseResult, Vec3};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Field carrying the observation array
pub const POSE_FIELD: &str = "pose";

/// One point record as it appears on the wire.
///
/// `z` is optional and defaults to 0.0; `id`, `x` and `y` are required.
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: u32,
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

/// Decode one complete payload into a frame.
///
/// A payload without a `pose` field (or with `"pose": null`) is not an
/// error: it yields an empty frame and a warning.
pub fn decode(bytes: &[u8]) -> PoseResult<Frame> {
    let text = std::str::from_utf8(bytes).map_err(|e| PoseError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
        len: bytes.len(),
    })?;

    let mut root: Map<String, Value> = serde_json::from_str(text).map_err(malformed)?;

    let records = match root.remove(POSE_FIELD) {
        None | Some(Value::Null) => {
            warn!(bytes = bytes.len(), "payload has no pose field, treating as empty frame");
            return Ok(Frame::empty());
        }
        Some(Value::Array(records)) => records,
        Some(other) => {
            return Err(PoseError::UnexpectedShape(format!(
                "pose must be an array, found {}",
                json_type(&other)
            )))
        }
    };

    let mut frame = Frame {
        observations: Vec::with_capacity(records.len()),
        skipped_records: 0,
    };

    for (index, record) in records.into_iter().enumerate() {
        match decode_record(record) {
            Ok(observation) => frame.observations.push(observation),
            Err(reason) => {
                debug!(index, %reason, "skipping malformed pose record");
                frame.skipped_records += 1;
            }
        }
    }

    Ok(frame)
}

fn decode_record(record: Value) -> Result<Observation, String> {
    let wire: WireRecord = serde_json::from_value(record).map_err(|e| e.to_string())?;
    let position = Vec3::new(wire.x, wire.y, wire.z);
    if !position.is_finite() {
        return Err(format!("record {} has a non-finite coordinate", wire.id));
    }
    Ok(Observation {
        id: wire.id,
        position,
    })
}

fn malformed(err: serde_json::Error) -> PoseError {
    use serde_json::error::Category;

    let reason = match err.classify() {
        Category::Eof => "truncated payload",
        Category::Syntax => "invalid JSON syntax",
        Category::Data => "payload is not a JSON object",
        Category::Io => "read failure",
    };
    PoseError::MalformedPayload {
        line: err.line(),
        column: err.column(),
        reason: reason.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
