//! pose-replay: broadcast synthetic pose frames to every connected client
//!
//! Stands in for the pose server during development. Every client receives
//! the same stream; a client that falls behind skips to the newest frame.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use posesync_test::SyntheticPose;
use posesync_wire::EncodeOptions;

#[derive(Parser, Debug)]
#[command(name = "pose-replay", about = "Broadcast synthetic pose frames over WebSocket")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "POSE_REPLAY_BIND", default_value = "127.0.0.1:8765")]
    bind: SocketAddr,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Probability that any single point is missing from a frame
    #[arg(long, default_value_t = 0.0)]
    dropout: f64,

    /// Decimal digits kept per coordinate
    #[arg(long, default_value_t = 4)]
    digits: u32,

    /// Attach a wall-clock timestamp to each frame
    #[arg(long)]
    timestamps: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let listener = match TcpListener::bind(args.bind).await {
        Ok(l) => l,
        Err(e) => {
            error!(bind = %args.bind, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(bind = %args.bind, fps = args.fps, "pose-replay listening");

    // Capacity 1: slow clients only ever see the newest frame
    let (tx, _) = broadcast::channel::<Arc<String>>(1);
    tokio::spawn(broadcast_loop(tx.clone(), args));

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(serve_client(stream, peer, tx.subscribe()));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

async fn broadcast_loop(tx: broadcast::Sender<Arc<String>>, args: Args) {
    let mut generator = SyntheticPose::new().with_dropout(args.dropout, 0x5eed);
    let period = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let start = Instant::now();

    loop {
        interval.tick().await;
        let t = start.elapsed().as_secs_f32();

        let mut options = EncodeOptions {
            round_digits: Some(args.digits),
            timestamp: None,
        };
        if args.timestamps {
            options = options.with_timestamp(format!("{:.3}", t));
        }

        match generator.payload_at(t, &options) {
            // No receivers is fine
            Ok(payload) => {
                let _ = tx.send(Arc::new(payload));
            }
            Err(e) => warn!(error = %e, "failed to encode frame"),
        }
    }
}

async fn serve_client(stream: TcpStream, peer: SocketAddr, mut rx: broadcast::Receiver<Arc<String>>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "handshake failed");
            return;
        }
    };
    info!(%peer, "client connected");

    let (mut sink, mut incoming) = ws.split();
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(payload) => {
                    if let Err(e) = sink.send(Message::Text(payload.as_str().to_owned())).await {
                        debug!(%peer, error = %e, "send failed");
                        break;
                    }
                    sent += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(%peer, skipped, "client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%peer, frames = sent, "client disconnected");
}
