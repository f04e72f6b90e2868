//! posesync Visual - Turning sparse observations into continuous motion
//!
//! Observations arrive at the peer's rate and are sometimes missing for a
//! while. Rendering happens at the host's rate. This crate bridges the two:
//!
//! - Every slot is smoothed toward its latest target, never snapped
//! - A slot that stops being observed is held, then faded, then hidden
//! - Every tick emits one sample per slot, visible or not

pub mod reconciler;
pub mod smoothing;
pub mod tracked;
pub mod visibility;

pub use reconciler::*;
pub use smoothing::*;
pub use tracked::*;
pub use visibility::*;
