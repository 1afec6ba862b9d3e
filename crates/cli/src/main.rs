mod adapters;

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::select;
use tracing_subscriber::EnvFilter;

use levelcam::ingest::SnapshotStage;
use levelcam::{
    Event, EventBus, EventKind, LevelPipeline, LevelReporter, MonitorConfig, RtspClient,
    SessionState, SnapshotMode,
};

use adapters::{AnnexBPassthrough, StdoutPublisher};

#[derive(Parser)]
#[command(
    name = "levelcam",
    version,
    about = "Gauge level monitor for RTSP cameras"
)]
struct Args {
    /// TOML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Camera URL, overrides `session.url`
    #[arg(long, global = true)]
    url: Option<String>,

    /// Overrides `session.reconnect_delay_secs`
    #[arg(long, global = true)]
    reconnect_delay_secs: Option<f64>,

    /// Log filter (`info`, `levelcam=debug`, ...). Defaults to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream from the camera and report what arrives
    Probe {
        /// How long to stream
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,

        /// Append the received H.264 as an Annex-B file
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Run raw detector values from stdin, one per line, through the level pipeline
    Replay,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let config = load_config(&args)?;
    match args.command {
        Command::Probe {
            duration_secs,
            dump,
        } => probe(config, Duration::from_secs(duration_secs), dump),
        Command::Replay => replay(config),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(url) = &args.url {
        config.session.url = url.clone();
    }
    if let Some(secs) = args.reconnect_delay_secs {
        config.session.reconnect_delay =
            Duration::try_from_secs_f64(secs).context("--reconnect-delay-secs")?;
    }
    Ok(config)
}

enum Tick {
    State(SessionState),
    Frame(Arc<[u8]>),
    Done,
}

fn probe(config: MonitorConfig, duration: Duration, dump: Option<PathBuf>) -> Result<()> {
    config.validate()?;
    let mut dump = dump
        .map(|path| {
            File::options()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening {}", path.display()))
        })
        .transpose()?;

    let bus = EventBus::new();
    let (frame_tx, frames) = crossbeam_channel::unbounded();
    let _frames_sub = bus.subscribe(EventKind::SnapshotReceived, move |event| {
        if let Event::SnapshotReceived(bytes) = event {
            frame_tx.send(bytes.clone())?;
        }
        Ok(())
    });

    let client = RtspClient::new(config.session.clone())?;
    let states = client.subscribe_state();
    let stage = SnapshotStage::new(AnnexBPassthrough::default(), &bus, SnapshotMode::Continuous);
    client.start(Box::new(stage))?;

    let deadline = crossbeam_channel::after(duration);
    let (mut sessions, mut access_units, mut bytes) = (0u64, 0u64, 0u64);
    loop {
        let tick = select! {
            recv(states) -> state => state.map_or(Tick::Done, Tick::State),
            recv(frames) -> frame => frame.map_or(Tick::Done, Tick::Frame),
            recv(deadline) -> _ => Tick::Done,
        };
        match tick {
            Tick::State(state) => {
                if state == SessionState::Streaming {
                    sessions += 1;
                }
                tracing::info!(%state, "session state");
            }
            Tick::Frame(frame) => {
                access_units += 1;
                bytes += frame.len() as u64;
                if let Some(file) = dump.as_mut() {
                    file.write_all(&frame)?;
                }
            }
            Tick::Done => break,
        }
    }

    client.shutdown()?;
    println!(
        "{}: {sessions} session(s), {access_units} access unit(s), {bytes} bytes in {duration:?}",
        client.target()
    );
    Ok(())
}

fn replay(config: MonitorConfig) -> Result<()> {
    config.level.validate()?;
    let mut pipeline = LevelPipeline::new(config.level.clone());
    let reporter = LevelReporter::new(Arc::new(StdoutPublisher), config.publish.clone());

    let (mut read, mut published) = (0u64, 0u64);
    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        let value = line.trim();
        if value.is_empty() || value.starts_with('#') {
            continue;
        }
        let raw: f64 = value
            .parse()
            .with_context(|| format!("line {}: not a number: {value:?}", index + 1))?;
        read += 1;

        if let Some(sample) = pipeline.process(raw)
            && reporter.report(&sample)?
        {
            published += 1;
        }
    }

    tracing::info!(read, published, "replay finished");
    Ok(())
}
