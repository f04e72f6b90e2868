//! Fragment reassembly
//!
//! Chunks of one logical message are appended to a single reusable buffer
//! until a chunk marked final arrives. The buffer never grows past its cap:
//! a message that would exceed it is a framing error, and the connection it
//! arrived on is considered unusable.

use bytes::BytesMut;

use posesync_core::{PoseError, PoseResult};

/// Bounded message accumulator
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    cap: usize,
    /// Last push completed a message; clear before the next one
    complete: bool,
}

impl FrameAssembler {
    /// Create an assembler bounded to `cap` bytes per message
    pub fn new(cap: usize) -> Self {
        Self {
            // Grows on demand up to `cap`, then the allocation is reused
            buf: BytesMut::new(),
            cap,
            complete: false,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Bytes accumulated for the message in progress
    pub fn pending_len(&self) -> usize {
        if self.complete {
            0
        } else {
            self.buf.len()
        }
    }

    /// Append one chunk.
    ///
    /// Returns the complete message when `fin` is set. The returned slice is
    /// valid until the next call; the buffer is recycled then.
    pub fn push(&mut self, chunk: &[u8], fin: bool) -> PoseResult<Option<&[u8]>> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }

        let size = self.buf.len() + chunk.len();
        if size > self.cap {
            self.buf.clear();
            return Err(PoseError::FrameTooLarge {
                size,
                limit: self.cap,
            });
        }

        self.buf.extend_from_slice(chunk);

        if fin {
            self.complete = true;
            Ok(Some(&self.buf[..]))
        } else {
            Ok(None)
        }
    }

    /// Drop any partially assembled message
    pub fn reset(&mut self) {
        self.buf.clear();
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_message() {
        let mut assembler = FrameAssembler::new(64);
        let msg = assembler.push(b"{\"pose\":[]}", true).unwrap();
        assert_eq!(msg, Some(&b"{\"pose\":[]}"[..]));
    }

    #[test]
    fn test_fragments_accumulate_until_final() {
        let mut assembler = FrameAssembler::new(64);

        assert_eq!(assembler.push(b"{\"po", false).unwrap(), None);
        assert_eq!(assembler.push(b"se\":", false).unwrap(), None);
        assert_eq!(assembler.pending_len(), 8);

        let msg = assembler.push(b"[]}", true).unwrap().map(|m| m.to_vec());
        assert_eq!(msg.as_deref(), Some(&b"{\"pose\":[]}"[..]));

        // Next message starts from an empty buffer
        let msg = assembler.push(b"{}", true).unwrap().map(|m| m.to_vec());
        assert_eq!(msg.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_overflow_before_completion() {
        let mut assembler = FrameAssembler::new(10);

        assert!(assembler.push(b"123456", false).unwrap().is_none());
        let err = assembler.push(b"7890X", false).unwrap_err();
        assert_eq!(err, PoseError::FrameTooLarge { size: 11, limit: 10 });
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_exactly_at_cap_is_accepted() {
        let mut assembler = FrameAssembler::new(4);
        assert_eq!(assembler.push(b"abcd", true).unwrap(), Some(&b"abcd"[..]));
    }
}
