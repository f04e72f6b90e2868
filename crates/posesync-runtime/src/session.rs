//! Pose session: the Lifecycle Controller
//!
//! Owns the receive thread, the mailbox it publishes into, and the point
//! reconciler the host ticks. The receive thread runs its own single-threaded
//! tokio runtime, so the host never needs one.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use posesync_core::{Frame, PoseConfig, PoseError, PoseResult, SessionClock, Timestamp};
use posesync_transport::{
    run_receiver, CancelSignal, FrameSink, Ingest, IngestStats, LatestFrameMailbox, MailboxStats,
    ReceiverConfig, ReceiverExit, WebSocketSource,
};
use posesync_visual::{PointReconciler, PointSample, ReconcileStats};

use crate::{parse_endpoint, Lifecycle, LifecycleState, SessionConfig};

/// Name of the receive thread
pub const RECEIVER_THREAD_NAME: &str = "posesync-rx";

/// Combined pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub mailbox: MailboxStats,
    pub ingest: IngestStats,
    pub reconcile: ReconcileStats,
}

/// One pose stream from connect to teardown
pub struct PoseSession {
    endpoint: Option<String>,
    config: PoseConfig,
    lifecycle: Arc<Lifecycle>,
    ingest: Arc<Ingest>,
    reconciler: PointReconciler,
    clock: SessionClock,
    cancel: CancelSignal,
    receiver: Option<JoinHandle<()>>,
}

impl PoseSession {
    /// Create an idle session for `config`
    pub fn new(config: SessionConfig) -> PoseResult<Self> {
        config.validate()?;
        let mut session = Self::build(config.pose)?;
        session.endpoint = Some(config.endpoint);
        Ok(session)
    }

    /// Create and connect, blocking until the handshake completes or fails
    pub fn connect(config: SessionConfig) -> PoseResult<Self> {
        let mut session = Self::new(config)?;
        session.start()?;
        Ok(session)
    }

    /// A session with no connection of its own. The host feeds it through
    /// [`submit_raw_bytes`](Self::submit_raw_bytes).
    pub fn offline(config: PoseConfig) -> PoseResult<Self> {
        Self::build(config)
    }

    fn build(config: PoseConfig) -> PoseResult<Self> {
        let reconciler = PointReconciler::new(&config)?;
        let mailbox = Arc::new(LatestFrameMailbox::new());
        Ok(Self {
            endpoint: None,
            config,
            lifecycle: Arc::new(Lifecycle::new()),
            ingest: Arc::new(Ingest::new(mailbox)),
            reconciler,
            clock: SessionClock::new(),
            cancel: CancelSignal::new(),
            receiver: None,
        })
    }

    /// Open the connection and start the receive thread.
    ///
    /// Blocks for at most the configured connect timeout. On failure the
    /// session is left `Failed` with the error recorded.
    pub fn start(&mut self) -> PoseResult<()> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                return Err(PoseError::InvalidEndpoint {
                    endpoint: String::new(),
                    reason: "offline session has no endpoint".into(),
                })
            }
        };
        parse_endpoint(&endpoint)?;

        if !self.lifecycle.transition(LifecycleState::Connecting) {
            return Err(PoseError::ConnectFailed(format!(
                "session is {}, not idle",
                self.lifecycle.state()
            )));
        }
        info!(endpoint = %endpoint, "connecting");

        match self.spawn_receiver(endpoint.clone()) {
            Ok(handle) => {
                self.receiver = Some(handle);
                // The receive thread may already have failed or seen a close
                if self.lifecycle.transition(LifecycleState::Connected) {
                    info!(endpoint = %endpoint, "connected");
                }
                Ok(())
            }
            Err(err) => {
                error!(endpoint = %endpoint, kind = %err.kind(), error = %err, "connect failed");
                self.lifecycle.fail(err.clone());
                Err(err)
            }
        }
    }

    fn spawn_receiver(&self, endpoint: String) -> PoseResult<JoinHandle<()>> {
        let (ready_tx, ready_rx) = oneshot::channel::<PoseResult<()>>();
        let ingest = self.ingest.clone();
        let lifecycle = self.lifecycle.clone();
        let cancel = self.cancel.clone();
        let connect_timeout = self.config.connect_timeout;
        let receiver_config = ReceiverConfig {
            frame_buffer_cap: self.config.frame_buffer_cap,
            close_timeout: self.config.close_timeout,
        };

        let handle = thread::Builder::new()
            .name(RECEIVER_THREAD_NAME.into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PoseError::ConnectFailed(format!(
                            "receiver runtime: {}",
                            e
                        ))));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let connected = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(PoseError::ConnectFailed("cancelled".into())),
                        result = tokio::time::timeout(
                            connect_timeout,
                            WebSocketSource::connect(&endpoint, receiver_config.frame_buffer_cap),
                        ) => result.unwrap_or_else(|_| {
                            Err(PoseError::ConnectTimeout(connect_timeout.as_millis() as u64))
                        }),
                    };

                    let mut source = match connected {
                        Ok(source) => source,
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    let exit =
                        run_receiver(&mut source, ingest.as_ref(), receiver_config, &cancel).await;
                    match exit {
                        ReceiverExit::Failed(err) => {
                            lifecycle.fail(err);
                        }
                        ReceiverExit::PeerClosed { .. } => {
                            // The close handshake already ran on this thread
                            lifecycle.begin_close();
                            lifecycle.finish_close();
                        }
                        ReceiverExit::Cancelled => {}
                    }
                });
            })
            .map_err(|e| PoseError::ConnectFailed(format!("spawn receiver thread: {}", e)))?;

        // Called from the host thread, never from inside a runtime
        match ready_rx.blocking_recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            // The thread died before reporting back
            Err(_) => {
                let _ = handle.join();
                Err(PoseError::ReceiverPanicked)
            }
        }
    }

    /// Advance the reconciler to `now`, consuming the latest frame if any.
    ///
    /// Returns one sample per slot.
    pub fn tick(&mut self, now: Timestamp) -> &[PointSample] {
        let frame = self.ingest.mailbox().take_latest();
        self.reconciler.tick(frame.as_ref(), now)
    }

    /// [`tick`](Self::tick) at the session clock's current time
    pub fn tick_now(&mut self) -> &[PointSample] {
        let now = self.clock.now();
        self.tick(now)
    }

    /// Feed one complete message from a host-owned transport
    pub fn submit_raw_bytes(&self, bytes: &[u8]) {
        self.ingest.submit_raw_bytes(bytes);
    }

    /// The host-owned transport closed; tear the session down
    pub fn on_connection_closed(&mut self) {
        self.ingest.on_connection_closed(&ReceiverExit::PeerClosed {
            code: None,
            reason: String::new(),
        });
        self.shutdown();
    }

    /// Latest frame waiting for the next tick, without consuming it
    pub fn has_pending_frame(&self) -> bool {
        self.ingest.mailbox().has_pending()
    }

    /// Publish a decoded frame directly, bypassing the decoder
    pub fn publish_frame(&self, frame: Frame) {
        self.ingest.mailbox().publish(frame);
    }

    /// Is the stream feeding this session still delivering frames?
    ///
    /// False once the receive loop has ended for any reason, or once the
    /// host reported its own transport closed.
    pub fn is_stream_open(&self) -> bool {
        self.ingest.is_open()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The error that failed the session, if any
    pub fn last_error(&self) -> Option<PoseError> {
        self.lifecycle.last_error()
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            mailbox: self.ingest.mailbox().stats(),
            ingest: self.ingest.stats(),
            reconcile: self.reconciler.stats(),
        }
    }

    /// Tear the session down from any state.
    ///
    /// Signals cancellation, waits for the receive thread (which runs the
    /// bounded close handshake) and ends in `Closed`. Errors are logged, not
    /// returned. Safe to call any number of times.
    pub fn shutdown(&mut self) {
        let first = self.lifecycle.begin_close();
        self.cancel.cancel();

        if let Some(handle) = self.receiver.take() {
            debug!("waiting for receive thread");
            if handle.join().is_err() {
                warn!(error = %PoseError::ReceiverPanicked, "teardown error");
                self.lifecycle.fail(PoseError::ReceiverPanicked);
            }
        }

        if self.lifecycle.finish_close() || first {
            info!(endpoint = self.endpoint.as_deref().unwrap_or("offline"), "session closed");
        }
    }
}

impl Drop for PoseSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PoseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseSession")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("slots", &self.reconciler.slot_count())
            .finish()
    }
}

/// Give the receive thread a moment to observe remote activity.
///
/// Polls `done` every few milliseconds until it returns true or `limit`
/// passes. Used by hosts and tests that need to wait on the remote side
/// without ticking.
pub fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + limit;
    loop {
        if done() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
