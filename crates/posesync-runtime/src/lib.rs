//! posesync Runtime
//!
//! The host-facing surface. A [`PoseSession`] owns one connection, its
//! receive thread and the point reconciler; the host only calls
//! [`PoseSession::tick`] once per rendered frame and
//! [`PoseSession::shutdown`] when done.
//!
//! ```no_run
//! use posesync_runtime::{PoseSession, SessionConfig};
//!
//! let mut session = PoseSession::connect(SessionConfig::new("ws://127.0.0.1:8765"))?;
//! for sample in session.tick_now() {
//!     if sample.alpha > 0.0 {
//!         // draw sample.position with sample.alpha
//!     }
//! }
//! session.shutdown();
//! # Ok::<(), posesync_core::PoseError>(())
//! ```

pub mod config;
pub mod lifecycle;
pub mod session;
pub mod telemetry;

pub use config::*;
pub use lifecycle::*;
pub use session::*;
pub use telemetry::*;
