//! posesync Test Harness
//!
//! This crate provides:
//! - A scripted WebSocket peer that plays the pose server's role
//! - Synthetic full-body poses, with optional random dropout
//! - The `pose-replay` broadcast tool

pub mod peer;
pub mod synthetic;

pub use peer::*;
pub use synthetic::*;
