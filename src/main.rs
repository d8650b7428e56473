//! # PACSAT Telemetry
//!
//! Reads the sensors, beacons live telemetry and keeps the WOD file.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse the command line and load configuration
//!    - Set up logging with tracing subscriber
//!    - Connect to the TNC and start the receive task
//!    - Send the start-up time beacon
//!
//! 2. **Main Loop**
//!    - Sample sensors and send live telemetry every `sample_period_s`
//!    - Append the latest sample to the WOD file every `persist_period_s`
//!    - Roll the WOD file into the queue directory once it is too big
//!
//! 3. **Shutdown**
//!    - SIGINT, SIGTERM or SIGQUIT, or too many WOD file errors
//!    - SIGHUP is logged and ignored
//!    - Log final counters and exit 0
//!
//! Expected output:
//! ```text
//! INFO pacsat_telem: PACSAT telemetry v0.1.0 starting...
//! INFO pacsat_telem::link: Connected to TNC at 127.0.0.1:8000
//! INFO pacsat_telem::scheduler: Scheduler running: sample every 10s, WOD every 60s to /tmp/wod
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use pacsat_telem::config::Config;
use pacsat_telem::link::{AgwLink, NullLink, TransportSink};
use pacsat_telem::scheduler::{Clock, Scheduler, SchedulerStats, StopReason, SystemClock};
use pacsat_telem::telemetry::{SensorSource, StaticSensorSource};
use pacsat_telem::wod::WodReader;

/// Log file name used when `logging.directory` is set
const LOG_FILE_NAME: &str = "pacsat-telem.log";

/// Example PACSAT telemetry capture
#[derive(Debug, Parser)]
#[command(name = "pacsat-telem", version, about)]
struct Cli {
    /// Configuration file (built-in defaults if omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use this data directory, rather than the configured one
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    dir: Option<String>,

    /// Print additional status and progress messages
    #[arg(short, long)]
    verbose: bool,

    /// Print the records of a WOD file as JSON lines and exit
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = cli.dir {
        config.wod.data_dir = dir;
    }
    config.validate()?;

    let _log_guard = init_logging(
        cli.verbose || config.logging.verbose,
        config.logging.directory.as_deref(),
    );

    if let Some(path) = cli.dump {
        return dump_wod(&path);
    }

    info!("PACSAT telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    fs::create_dir_all(&config.wod.data_dir)
        .with_context(|| format!("Failed to create data directory {}", config.wod.data_dir))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(watch_signals(shutdown_tx));

    let clock = SystemClock;
    let source = StaticSensorSource::new();

    let (reason, stats) = if config.link.enabled {
        let (link, mut frames) = AgwLink::connect(&config.link)
            .await
            .context("FATAL. Could not start the TNC link")?;

        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                debug!(
                    "Received frame {} > {} ({} bytes)",
                    frame.call_from,
                    frame.call_to,
                    frame.data.len()
                );
            }
        });

        // Let the TNC settle before the first frame
        tokio::time::sleep(Duration::from_millis(config.link.settle_ms)).await;

        run_scheduler(&config, source, link, &clock, shutdown_rx).await
    } else {
        info!("Radio link disabled, telemetry is only logged");
        run_scheduler(&config, source, NullLink::new(), &clock, shutdown_rx).await
    };

    match reason {
        StopReason::Shutdown => info!("Shutting down..."),
        StopReason::ErrorBudgetExhausted => info!("Stopped after too many WOD file errors"),
    }
    info!("Final counters: {}", serde_json::to_string(&stats)?);

    Ok(())
}

async fn run_scheduler<S: SensorSource, T: TransportSink>(
    config: &Config,
    source: S,
    sink: T,
    clock: &SystemClock,
    shutdown: watch::Receiver<bool>,
) -> (StopReason, SchedulerStats) {
    let mut scheduler = Scheduler::new(config, source, sink, clock.now());

    if !scheduler.send_time(clock.now()).await {
        warn!("Start-up time beacon was not sent");
    }

    let idle = Duration::from_millis(config.scheduler.idle_sleep_ms);
    let reason = scheduler.run(clock, shutdown, idle).await;
    (reason, scheduler.stats().clone())
}

/// Initialize tracing; the guard must live until exit when logging to a file
fn init_logging(verbose: bool, directory: Option<&str>) -> Option<WorkerGuard> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Signals the process listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Interrupt,
    Terminate,
    Quit,
    Hangup,
}

impl Signal {
    fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Hangup => "SIGHUP",
        }
    }

    /// Whether the signal ends the run; a hangup is only logged
    fn stops(self) -> bool {
        !matches!(self, Signal::Hangup)
    }
}

/// Flip the shutdown flag on the first termination signal
async fn watch_signals(shutdown: watch::Sender<bool>) {
    let mut signals = match SignalListener::new() {
        Ok(signals) => signals,
        Err(e) => {
            warn!("Could not listen for signals: {}", e);
            // Keep the sender alive; dropping it would stop the scheduler
            std::future::pending::<()>().await;
            return;
        }
    };

    loop {
        match signals.recv().await {
            Ok(signal) if signal.stops() => {
                info!("{} received, exiting ...", signal.name());
                let _ = shutdown.send(true);
                return;
            }
            Ok(signal) => info!("{} received, continuing", signal.name()),
            Err(e) => {
                warn!("Signal listener failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
struct SignalListener {
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Install the handlers; from here on these signals no longer kill the process
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> std::io::Result<Signal> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| Signal::Interrupt),
            _ = self.terminate.recv() => Ok(Signal::Terminate),
            _ = self.quit.recv() => Ok(Signal::Quit),
            _ = self.hangup.recv() => Ok(Signal::Hangup),
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> std::io::Result<Signal> {
        tokio::signal::ctrl_c().await.map(|_| Signal::Interrupt)
    }
}

fn dump_wod(path: &Path) -> Result<()> {
    let reader = WodReader::open(path)
        .with_context(|| format!("Failed to read WOD file {}", path.display()))?;

    for record in reader {
        println!("{}", serde_json::to_string(&record?)?);
    }

    Ok(())
}
