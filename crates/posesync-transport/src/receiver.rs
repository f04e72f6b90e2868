//! The receive loop
//!
//! Pulls chunks from a [`ChunkSource`], reassembles them into messages and
//! hands every complete message to a [`FrameSink`]. Exactly one loop runs per
//! connection, on the receive thread. The loop ends when cancellation is
//! requested, the peer closes, or the connection fails; in every case the
//! sink is told once via `on_connection_closed`.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use posesync_core::PoseError;

use crate::{CancelSignal, Chunk, ChunkSource, FrameAssembler, FrameSink};

/// Why the receive loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverExit {
    /// Shutdown was requested locally
    Cancelled,
    /// The peer closed the connection
    PeerClosed { code: Option<u16>, reason: String },
    /// The connection failed and cannot be used further
    Failed(PoseError),
}

impl ReceiverExit {
    pub fn error(&self) -> Option<&PoseError> {
        match self {
            ReceiverExit::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Receive loop parameters
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    /// Per-message byte cap enforced during reassembly
    pub frame_buffer_cap: usize,
    /// Upper bound on the cooperative close handshake
    pub close_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            frame_buffer_cap: posesync_core::DEFAULT_FRAME_BUFFER_CAP,
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Run the receive loop to completion
pub async fn run_receiver<S>(
    source: &mut S,
    sink: &dyn FrameSink,
    config: ReceiverConfig,
    cancel: &CancelSignal,
) -> ReceiverExit
where
    S: ChunkSource + ?Sized,
{
    let exit = receive(source, sink, config, cancel).await;

    match &exit {
        ReceiverExit::Cancelled => {
            debug!(peer = source.peer(), "receiver cancelled");
            close_bounded(source, config.close_timeout).await;
        }
        ReceiverExit::PeerClosed { code, reason } => {
            info!(peer = source.peer(), ?code, %reason, "peer closed connection");
            close_bounded(source, config.close_timeout).await;
        }
        ReceiverExit::Failed(err) => {
            error!(peer = source.peer(), kind = %err.kind(), error = %err, "receiver failed");
        }
    }

    sink.on_connection_closed(&exit);
    exit
}

async fn receive<S>(
    source: &mut S,
    sink: &dyn FrameSink,
    config: ReceiverConfig,
    cancel: &CancelSignal,
) -> ReceiverExit
where
    S: ChunkSource + ?Sized,
{
    let mut assembler = FrameAssembler::new(config.frame_buffer_cap);

    loop {
        if cancel.is_cancelled() {
            return ReceiverExit::Cancelled;
        }

        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReceiverExit::Cancelled,
            chunk = source.next_chunk() => chunk,
        };

        match chunk {
            Ok(Chunk::Data { bytes, fin }) => match assembler.push(&bytes, fin) {
                Ok(Some(message)) => sink.submit_raw_bytes(message),
                Ok(None) => {}
                Err(err) => return ReceiverExit::Failed(err),
            },
            Ok(Chunk::Control) => {}
            Ok(Chunk::Closed { code, reason }) => {
                if assembler.pending_len() > 0 {
                    debug!(pending = assembler.pending_len(), "discarding partial message on close");
                }
                return ReceiverExit::PeerClosed { code, reason };
            }
            Err(err) => return ReceiverExit::Failed(err),
        }
    }
}

async fn close_bounded<S>(source: &mut S, limit: Duration)
where
    S: ChunkSource + ?Sized,
{
    match tokio::time::timeout(limit, source.close()).await {
        Ok(Ok(())) => debug!(peer = source.peer(), "close handshake complete"),
        Ok(Err(err)) => warn!(peer = source.peer(), error = %err, "close handshake failed"),
        Err(_) => warn!(
            peer = source.peer(),
            timeout_ms = limit.as_millis() as u64,
            "close handshake timed out"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use posesync_core::PoseResult;

    /// Plays back a fixed script, then stays pending forever
    struct ScriptedSource {
        script: VecDeque<PoseResult<Chunk>>,
        closed: bool,
        hang_on_close: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<PoseResult<Chunk>>) -> Self {
            Self {
                script: script.into(),
                closed: false,
                hang_on_close: false,
            }
        }
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        async fn next_chunk(&mut self) -> PoseResult<Chunk> {
            match self.script.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> PoseResult<()> {
            if self.hang_on_close {
                std::future::pending::<()>().await;
            }
            self.closed = true;
            Ok(())
        }

        fn peer(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
    }

    impl FrameSink for RecordingSink {
        fn submit_raw_bytes(&self, bytes: &[u8]) {
            self.messages.lock().push(bytes.to_vec());
        }

        fn on_connection_closed(&self, _exit: &ReceiverExit) {
            assert!(!self.closed.swap(true, Ordering::SeqCst), "closed twice");
        }
    }

    fn config(cap: usize) -> ReceiverConfig {
        ReceiverConfig {
            frame_buffer_cap: cap,
            close_timeout: Duration::from_millis(100),
        }
    }

    fn closed() -> PoseResult<Chunk> {
        Ok(Chunk::Closed {
            code: Some(1000),
            reason: "bye".into(),
        })
    }

    #[tokio::test]
    async fn test_messages_delivered_in_order() {
        let mut source = ScriptedSource::new(vec![
            Ok(Chunk::message("a")),
            Ok(Chunk::Control),
            Ok(Chunk::fragment("b")),
            Ok(Chunk::message("c")),
            closed(),
        ]);
        let sink = RecordingSink::default();

        let exit = run_receiver(&mut source, &sink, config(64), &CancelSignal::new()).await;

        assert_eq!(
            exit,
            ReceiverExit::PeerClosed {
                code: Some(1000),
                reason: "bye".into()
            }
        );
        assert_eq!(*sink.messages.lock(), vec![b"a".to_vec(), b"bc".to_vec()]);
        assert!(sink.closed.load(Ordering::SeqCst));
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_fragment_overflow_fails_connection() {
        let mut source = ScriptedSource::new(vec![
            Ok(Chunk::fragment(vec![b'x'; 8])),
            Ok(Chunk::message(vec![b'x'; 8])),
            Ok(Chunk::message("never")),
        ]);
        let sink = RecordingSink::default();

        let exit = run_receiver(&mut source, &sink, config(10), &CancelSignal::new()).await;

        assert_eq!(
            exit,
            ReceiverExit::Failed(PoseError::FrameTooLarge { size: 16, limit: 10 })
        );
        assert!(sink.messages.lock().is_empty());
        assert!(sink.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_transport_error_fails_connection() {
        let mut source = ScriptedSource::new(vec![
            Ok(Chunk::message("a")),
            Err(PoseError::ConnectionReset),
        ]);
        let sink = RecordingSink::default();

        let exit = run_receiver(&mut source, &sink, config(64), &CancelSignal::new()).await;

        assert_eq!(exit.error(), Some(&PoseError::ConnectionReset));
        assert_eq!(sink.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let mut source = ScriptedSource::new(vec![Ok(Chunk::message("a"))]);
        let sink = RecordingSink::default();
        let cancel = CancelSignal::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let exit = tokio::time::timeout(
            Duration::from_secs(1),
            run_receiver(&mut source, &sink, config(64), &cancel),
        )
        .await
        .expect("receiver did not stop");

        assert_eq!(exit, ReceiverExit::Cancelled);
        assert_eq!(sink.messages.lock().len(), 1);
        assert!(source.closed);
    }

    #[tokio::test]
    async fn test_close_handshake_is_bounded() {
        let mut source = ScriptedSource::new(vec![]);
        source.hang_on_close = true;
        let sink = RecordingSink::default();
        let cancel = CancelSignal::new();
        cancel.cancel();

        let exit = tokio::time::timeout(
            Duration::from_secs(1),
            run_receiver(&mut source, &sink, config(64), &cancel),
        )
        .await
        .expect("close timeout not honored");

        assert_eq!(exit, ReceiverExit::Cancelled);
        assert!(sink.closed.load(Ordering::SeqCst));
    }
}
