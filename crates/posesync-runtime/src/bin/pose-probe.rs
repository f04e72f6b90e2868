//! pose-probe: connect to a pose stream and report what a host would render
//!
//! Ticks at a fixed rate like a render loop and logs a summary once per
//! second.

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};

use posesync_core::PoseConfig;
use posesync_runtime::{init_tracing, LogFormat, PoseSession, SessionConfig};
use posesync_visual::VisibilityStage;

#[derive(Parser, Debug)]
#[command(name = "pose-probe", about = "Connect to a pose stream and log visible points")]
struct Args {
    /// WebSocket endpoint of the pose server
    #[arg(env = "POSE_ENDPOINT", default_value = "ws://127.0.0.1:8765")]
    endpoint: String,

    /// Ticks per second
    #[arg(long, default_value_t = 60)]
    hz: u32,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Use the low-latency preset
    #[arg(long)]
    low_latency: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(if args.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let pose = if args.low_latency {
        PoseConfig::low_latency()
    } else {
        PoseConfig::blazepose()
    };
    let config = SessionConfig::new(args.endpoint.clone()).with_pose(pose);

    let mut session = match PoseSession::connect(config) {
        Ok(session) => session,
        Err(err) => {
            error!(endpoint = %args.endpoint, kind = %err.kind(), error = %err, "could not connect");
            return ExitCode::FAILURE;
        }
    };

    let period = Duration::from_secs_f64(1.0 / args.hz.max(1) as f64);
    let started = Instant::now();
    let mut next_report = started + Duration::from_secs(1);

    loop {
        let tick_start = Instant::now();
        let samples = session.tick_now();

        if tick_start >= next_report {
            next_report += Duration::from_secs(1);
            let count = |stage: VisibilityStage| samples.iter().filter(|s| s.stage == stage).count();
            let visible = samples.iter().filter(|s| s.is_visible()).count();
            let (fresh, held, fading) = (
                count(VisibilityStage::Fresh),
                count(VisibilityStage::Held),
                count(VisibilityStage::Fading),
            );
            let stats = session.stats();
            info!(
                visible,
                fresh,
                held,
                fading,
                frames = stats.ingest.frames_published,
                superseded = stats.mailbox.superseded,
                decode_errors = stats.ingest.decode_errors,
                bytes = stats.ingest.bytes,
                "status"
            );
        }

        // A closed stream has delivered its last frame
        if !session.is_stream_open() {
            break;
        }
        if args
            .seconds
            .is_some_and(|limit| started.elapsed() >= Duration::from_secs(limit))
        {
            break;
        }

        if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    let failure = session.last_error();
    session.shutdown();

    match failure {
        Some(err) => {
            error!(kind = %err.kind(), error = %err, "stream failed");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}
