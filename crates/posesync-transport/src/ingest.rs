//! Ingest: the entry point the receiver feeds complete messages into

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use posesync_core::Frame;

use crate::{LatestFrameMailbox, ReceiverExit};

/// Bytes of payload shown in trace-level previews
const PREVIEW_CHARS: usize = 160;

/// Receiver of complete messages and connection lifecycle notifications
pub trait FrameSink: Send + Sync {
    /// Hand over one complete message
    fn submit_raw_bytes(&self, bytes: &[u8]);

    /// The receive loop has ended and will not submit again
    fn on_connection_closed(&self, exit: &ReceiverExit);
}

/// Ingest counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub messages: u64,
    pub bytes: u64,
    pub frames_published: u64,
    pub empty_frames: u64,
    pub decode_errors: u64,
    pub skipped_records: u64,
}

/// Decodes submitted messages and publishes them to the mailbox.
///
/// Decode errors drop the message and never reach the receive loop.
#[derive(Debug)]
pub struct Ingest {
    mailbox: Arc<LatestFrameMailbox<Frame>>,
    open: AtomicBool,
    messages: AtomicU64,
    bytes: AtomicU64,
    frames_published: AtomicU64,
    empty_frames: AtomicU64,
    decode_errors: AtomicU64,
    skipped_records: AtomicU64,
}

impl Ingest {
    pub fn new(mailbox: Arc<LatestFrameMailbox<Frame>>) -> Self {
        Self {
            mailbox,
            open: AtomicBool::new(true),
            messages: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            empty_frames: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            skipped_records: AtomicU64::new(0),
        }
    }

    pub fn mailbox(&self) -> &Arc<LatestFrameMailbox<Frame>> {
        &self.mailbox
    }

    /// Has the connection feeding this ingest closed?
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            messages: self.messages.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            empty_frames: self.empty_frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            skipped_records: self.skipped_records.load(Ordering::Relaxed),
        }
    }
}

impl FrameSink for Ingest {
    fn submit_raw_bytes(&self, bytes: &[u8]) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        match posesync_wire::decode(bytes) {
            Ok(frame) => {
                if frame.skipped_records > 0 {
                    self.skipped_records
                        .fetch_add(frame.skipped_records as u64, Ordering::Relaxed);
                }
                if frame.is_empty() {
                    self.empty_frames.fetch_add(1, Ordering::Relaxed);
                }
                self.mailbox.publish(frame);
                self.frames_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(kind = %err.kind(), bytes = bytes.len(), error = %err, "dropping undecodable frame");
                trace!(preview = %preview(bytes), "undecodable payload");
            }
        }
    }

    fn on_connection_closed(&self, exit: &ReceiverExit) {
        self.open.store(false, Ordering::Release);
        debug!(?exit, "ingest closed");
    }
}

fn preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest() -> Ingest {
        Ingest::new(Arc::new(LatestFrameMailbox::new()))
    }

    #[test]
    fn test_valid_payload_is_published() {
        let ingest = ingest();
        ingest.submit_raw_bytes(br#"{"pose":[{"id":1,"x":0.1,"y":0.2,"z":0.3}]}"#);

        let frame = ingest.mailbox().take_latest().expect("frame published");
        assert_eq!(frame.observations[0].id, 1);

        let stats = ingest.stats();
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.decode_errors, 0);
    }

    #[test]
    fn test_decode_error_drops_frame_and_keeps_previous() {
        let ingest = ingest();
        ingest.submit_raw_bytes(br#"{"pose":[{"id":2,"x":0.1,"y":0.2}]}"#);
        ingest.submit_raw_bytes(b"{\"pose\":[");

        // The good frame is still the latest one
        let frame = ingest.mailbox().take_latest().unwrap();
        assert_eq!(frame.observations[0].id, 2);

        let stats = ingest.stats();
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.messages, 2);
    }

    #[test]
    fn test_missing_pose_publishes_empty_frame() {
        let ingest = ingest();
        ingest.submit_raw_bytes(br#"{"ts":"x"}"#);

        assert_eq!(ingest.mailbox().take_latest(), Some(Frame::empty()));
        assert_eq!(ingest.stats().empty_frames, 1);
    }

    #[test]
    fn test_close_marks_ingest_closed() {
        let ingest = ingest();
        assert!(ingest.is_open());
        ingest.on_connection_closed(&ReceiverExit::Cancelled);
        assert!(!ingest.is_open());
    }

    #[test]
    fn test_preview_truncates() {
        let long = "a".repeat(400);
        let shown = preview(long.as_bytes());
        assert_eq!(shown.len(), PREVIEW_CHARS + 3);
    }
}
