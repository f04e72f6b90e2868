//! posesync Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every stage of the pipeline:
//! - Time primitives (Timestamp, SessionClock)
//! - Geometry (Vec3)
//! - Observations and frames as they come off the wire
//! - Session configuration
//! - The error taxonomy

pub mod config;
pub mod error;
pub mod geometry;
pub mod observation;
pub mod time;

pub use config::*;
pub use error::*;
pub use geometry::*;
pub use observation::*;
pub use time::*;
