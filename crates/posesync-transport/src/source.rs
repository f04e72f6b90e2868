//! The seam between the receive loop and the underlying connection

use async_trait::async_trait;

use posesync_core::PoseResult;

/// One unit read off the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Payload bytes; `fin` marks the last chunk of a logical message
    Data { bytes: Vec<u8>, fin: bool },
    /// Keepalive or other control traffic with no payload for the pipeline
    Control,
    /// The peer closed the connection
    Closed { code: Option<u16>, reason: String },
}

impl Chunk {
    /// A complete, unfragmented message
    pub fn message(bytes: impl Into<Vec<u8>>) -> Self {
        Chunk::Data {
            bytes: bytes.into(),
            fin: true,
        }
    }

    /// A non-final fragment
    pub fn fragment(bytes: impl Into<Vec<u8>>) -> Self {
        Chunk::Data {
            bytes: bytes.into(),
            fin: false,
        }
    }
}

/// A persistent connection the receive loop pulls chunks from.
///
/// `next_chunk` must be cancel-safe: the receive loop drops the in-flight
/// future when cancellation is requested.
#[async_trait]
pub trait ChunkSource: Send {
    /// Wait for the next chunk. Errors are fatal to the connection.
    async fn next_chunk(&mut self) -> PoseResult<Chunk>;

    /// Run the cooperative close handshake. Callers bound this with a timeout.
    async fn close(&mut self) -> PoseResult<()>;

    /// Human-readable peer description for diagnostics
    fn peer(&self) -> &str;
}
