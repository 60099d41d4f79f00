// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! WiCare - headless fall-detection monitor
//!
//! Connects to a WiCare board, keeps the connection healthy and logs state,
//! alert and calibration changes until interrupted.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use wicare::config::TomlSettingsStore;
use wicare::connectivity::SimulatedTransport;
use wicare::core::EventPayload;
use wicare::{Config, ConnectionState, Session, TransportMode, NAME, VERSION};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Streaming,
    Polling,
}

impl From<Mode> for TransportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Streaming => TransportMode::Streaming,
            Mode::Polling => TransportMode::Polling,
        }
    }
}

/// WiCare - WiFi CSI fall-detection monitor
#[derive(Parser, Debug)]
#[command(name = "wicare")]
#[command(author = "WiCare Project")]
#[command(version = VERSION)]
#[command(about = "Headless WiFi CSI fall-detection monitor")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device host, overrides the stored settings
    #[arg(long)]
    host: Option<String>,

    /// Device port
    #[arg(long)]
    port: Option<u32>,

    /// Transport mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Demo mode with a simulated board
    #[arg(long)]
    demo: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Expose manual Safe/Fall overrides
    #[arg(long)]
    debug_controls: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} - fall-detection monitor", NAME, VERSION);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    if args.debug_controls {
        config.alerts.debug_controls = true;
    }
    info!("Configuration loaded from {:?}", config_path);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config, args))
}

async fn run_headless(config: Config, args: Args) -> Result<()> {
    let store = Arc::new(TomlSettingsStore::with_fallback(
        Config::device_settings_path(),
        config.device.clone(),
    ));
    let recheck_every = Duration::from_secs(config.connectivity.recheck_interval_secs.max(1));

    let mut builder = Session::builder(config).settings_store(store);
    if args.demo {
        info!("Demo mode: simulated board");
        builder = builder.transport(Arc::new(SimulatedTransport::new(true)));
    }
    let session = builder.build()?;

    let mut events = session.subscribe_events();
    let logger = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    debug!("Event log lagged, {} events skipped", missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event.payload {
                EventPayload::SystemState(state) => info!("System state: {:?}", state),
                EventPayload::Alert(update) => warn!("Alert: {:?}", update),
                EventPayload::Connection { state, reason } => match reason {
                    Some(reason) => info!("Device {:?}: {}", state, reason),
                    None => info!("Device {:?}", state),
                },
                EventPayload::TransportDegraded { reason } => warn!("Transport degraded: {}", reason),
                EventPayload::Calibration(run) => debug!("Calibration {:?} {}%", run.status, run.progress),
                EventPayload::Sample(_) => {}
            }
        }
    });

    if args.host.is_some() || args.port.is_some() || args.mode.is_some() {
        let current = session.device_config();
        let host = args.host.unwrap_or(current.host);
        let port = args.port.unwrap_or(current.port as u32);
        let mode = args.mode.map(TransportMode::from).unwrap_or(current.transport_mode);
        session.update_config(&host, port, mode).await?;
    } else {
        session.start().await;
    }

    info!("Monitoring {}", session.device_config());
    info!("   Press Ctrl+C to shutdown");

    let mut recheck = interval(recheck_every);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
    recheck.tick().await;

    loop {
        tokio::select! {
            _ = recheck.tick() => {
                if session.connection_state() == ConnectionState::Disconnected {
                    session.recheck().await;
                } else {
                    let stats = session.stats();
                    debug!("{} samples, mean {:.1}, peak {:.1}", stats.count, stats.mean, stats.max_abs);
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    info!("Shutdown signal received, cleaning up...");
    session.shutdown();
    logger.abort();
    info!("{} shutdown complete", NAME);

    Ok(())
}
