//! posesync Transport - Receiving frames off a persistent connection
//!
//! This crate provides:
//! - A single-slot "latest frame wins" mailbox
//! - Bounded reassembly of fragmented messages
//! - The `ChunkSource` seam and its WebSocket implementation
//! - The ingest sink that decodes complete messages into the mailbox
//! - The cancellable background receive loop

pub mod assembler;
pub mod cancel;
pub mod ingest;
pub mod mailbox;
pub mod receiver;
pub mod source;
pub mod websocket;

pub use assembler::*;
pub use cancel::*;
pub use ingest::*;
pub use mailbox::*;
pub use receiver::*;
pub use source::*;
pub use websocket::{websocket_config, WebSocketSource};
