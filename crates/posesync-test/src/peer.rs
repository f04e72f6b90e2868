//! Scripted WebSocket peer
//!
//! Accepts exactly one client on a loopback port and plays a fixed script of
//! actions against it on its own thread, so it can drive a blocking client
//! from a plain `#[test]`.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// How long the peer waits for a client to connect
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the peer keeps reading after its script ends
const LINGER_TIMEOUT: Duration = Duration::from_secs(10);

/// One scripted step
#[derive(Debug, Clone)]
pub enum PeerAction {
    /// Send a text message
    Text(String),
    /// Send a binary message
    Binary(Vec<u8>),
    /// Wait before the next step
    Pause(Duration),
    /// Start the close handshake, then wait for the client's reply
    Close,
    /// Drop the connection without a close handshake
    Drop,
}

/// What the peer observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerReport {
    /// A client connected and completed the handshake
    pub accepted: bool,
    /// Messages sent successfully
    pub sent: usize,
    /// The client sent a close frame
    pub client_closed: bool,
    /// First error hit while playing the script
    pub error: Option<String>,
}

/// A WebSocket server playing a script against one client
pub struct TestPeer {
    addr: SocketAddr,
    handle: Option<JoinHandle<PeerReport>>,
}

impl TestPeer {
    /// Bind a loopback port and start serving `script`
    pub fn spawn(script: Vec<PeerAction>) -> io::Result<Self> {
        let listener = StdTcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let handle = thread::Builder::new()
            .name("posesync-test-peer".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        return PeerReport {
                            error: Some(format!("runtime: {}", e)),
                            ..PeerReport::default()
                        }
                    }
                };
                runtime.block_on(serve(listener, script))
            })?;

        Ok(Self {
            addr,
            handle: Some(handle),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Endpoint a client should connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the script to finish and the client to go away
    pub fn join(mut self) -> PeerReport {
        match self.handle.take().map(|h| h.join()) {
            Some(Ok(report)) => report,
            Some(Err(_)) => PeerReport {
                error: Some("peer thread panicked".into()),
                ..PeerReport::default()
            },
            None => PeerReport::default(),
        }
    }
}

/// An endpoint nothing is listening on
pub fn unused_endpoint() -> io::Result<String> {
    let listener = StdTcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("ws://{}", addr))
}

async fn serve(listener: StdTcpListener, script: Vec<PeerAction>) -> PeerReport {
    let mut report = PeerReport::default();

    let listener = match TcpListener::from_std(listener) {
        Ok(l) => l,
        Err(e) => {
            report.error = Some(format!("listener: {}", e));
            return report;
        }
    };

    let stream = match tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            report.error = Some(format!("accept: {}", e));
            return report;
        }
        Err(_) => {
            report.error = Some("no client connected".into());
            return report;
        }
    };

    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            report.error = Some(format!("handshake: {}", e));
            return report;
        }
    };
    report.accepted = true;

    for action in script {
        let sent = match action {
            PeerAction::Text(text) => ws.send(Message::Text(text)).await,
            PeerAction::Binary(data) => ws.send(Message::Binary(data)).await,
            PeerAction::Pause(d) => {
                tokio::time::sleep(d).await;
                continue;
            }
            PeerAction::Close => {
                if let Err(e) = ws.close(None).await {
                    report.error.get_or_insert(format!("close: {}", e));
                }
                break;
            }
            PeerAction::Drop => {
                drop(ws);
                return report;
            }
        };

        match sent {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.error.get_or_insert(format!("send: {}", e));
                break;
            }
        }
    }

    linger(&mut ws, &mut report).await;
    report
}

/// Read until the client closes or the stream ends
async fn linger<S>(ws: &mut WebSocketStream<S>, report: &mut PeerReport)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let deadline = tokio::time::Instant::now() + LINGER_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) => report.client_closed = true,
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                report.error.get_or_insert("client never closed".into());
                break;
            }
        }
    }
}
