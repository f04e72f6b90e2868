//! posesync Wire - Pose payload format
//!
//! A payload is a UTF-8 JSON object carrying an array of point records:
//!
//! ```text
//! {"ts":"2025-11-05T21:23:10.123Z","pose":[{"id":0,"x":0.52,"y":0.48,"z":-0.12}, ...]}
//! ```
//!
//! `ts` is optional and ignored on decode.

pub mod decode;
pub mod encode;

pub use decode::*;
pub use encode::*;
