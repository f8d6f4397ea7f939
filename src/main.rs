//! CLI entry point for the trip meter.
//!
//! Runs a single trip, fed either live from JSON Lines on stdin or from a
//! recorded sample log, and keeps the trip log in a local database.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use trip_meter::{
    clock::{Clock, FixedClock, SystemClock},
    config::AppConfig,
    fetch::{BasicClient, Bearer},
    observer::{ChannelObserver, Dashboard, JsonLinesObserver, LogObserver, present},
    session::{FeedEnd, TripSession},
    source::{load_samples, spawn_line_reader},
    store::{CsvStore, PersistenceWorker, SqliteStore, TripStore},
};

#[derive(Parser)]
#[command(name = "trip_meter")]
#[command(about = "Live speed, distance and time for a single trip", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a live trip from JSON Lines location fixes on stdin
    Track {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Replay a recorded sample log as one trip
    Replay {
        /// Path to file or URL to fetch (JSON Lines or CSV, optionally gzipped)
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        output: OutputArgs,

        /// Pace the replay by the recorded timestamps and time it by the wall clock
        #[arg(long, default_value_t = false)]
        realtime: bool,

        /// Deliver every recorded fix, ignoring interval and displacement hints
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// SQLite database to append trip records to
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// CSV file to append trip records to
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Do not write to the SQLite database
    #[arg(long, default_value_t = false)]
    no_db: bool,

    /// Print each drive update as a JSON line instead of the dashboard
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/trip_meter.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("trip_meter.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Track { output } => track(config, output).await?,
        Commands::Replay {
            source,
            output,
            realtime,
            raw,
        } => replay(config, &source, output, realtime, raw).await?,
    }

    Ok(())
}

/// Runs a live trip until stdin closes or Ctrl+C is pressed.
#[tracing::instrument(skip_all)]
async fn track(config: AppConfig, output: OutputArgs) -> Result<()> {
    let location = config.location;
    info!(
        interval_ms = location.interval.as_millis() as u64,
        fastest_interval_ms = location.fastest_interval.as_millis() as u64,
        min_displacement_m = location.min_displacement_m,
        "Location request"
    );

    let (mut session, presenter) =
        build_session(SystemClock, &config, &output, Some(Duration::from_secs(1)))?;
    // The reader thread is detached: a read blocked on an idle terminal must
    // not keep the process alive after the trip stops.
    let (mut samples, _reader) =
        spawn_line_reader(std::io::BufReader::new(std::io::stdin()), 64);

    session.start_trip();
    info!("Reading fixes from stdin. Press Ctrl+C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    match session.feed_until(&mut samples, ctrl_c).await {
        FeedEnd::SourceClosed => info!("Location source closed"),
        FeedEnd::StopRequested => info!("Stop requested"),
    }

    drop(samples);
    finish(session, presenter).await
}

/// Replays a recorded log as one trip.
#[tracing::instrument(skip(config, output))]
async fn replay(
    config: AppConfig,
    source: &str,
    output: OutputArgs,
    realtime: bool,
    raw: bool,
) -> Result<()> {
    let samples = match config.log_token.as_deref() {
        Some(token) => load_samples(source, &Bearer::new(BasicClient::new(), token)?).await?,
        None => load_samples(source, &BasicClient::new()).await?,
    };

    let recorded = samples.len();
    let samples = if raw {
        samples
    } else {
        config.location.throttle(samples)
    };
    info!(recorded, delivered = samples.len(), "Sample log ready");

    if samples.is_empty() {
        warn!("No usable fixes in sample log");
    }

    if realtime {
        let (mut session, presenter) =
            build_session(SystemClock, &config, &output, Some(Duration::from_secs(1)))?;
        session.start_trip();

        let mut previous: Option<DateTime<Utc>> = None;
        for sample in samples {
            if let Some(gap) = previous.and_then(|p| (sample.timestamp - p).to_std().ok()) {
                tokio::time::sleep(gap).await;
            }
            previous = Some(sample.timestamp);
            session.push(sample);
        }

        finish(session, presenter).await
    } else {
        let clock = FixedClock::new(samples.first().map(|s| s.timestamp).unwrap_or_else(Utc::now));
        let (mut session, presenter) = build_session(clock.clone(), &config, &output, None)?;
        session.start_trip();

        for sample in samples {
            clock.set(sample.timestamp);
            session.push(sample);
        }

        finish(session, presenter).await
    }
}

type Presenter = JoinHandle<Result<Dashboard>>;

/// Wires stores and observers around a fresh session.
fn build_session<C: Clock + Clone + 'static>(
    clock: C,
    config: &AppConfig,
    output: &OutputArgs,
    tick: Option<Duration>,
) -> Result<(TripSession<C>, Option<Presenter>)> {
    let mut stores: Vec<Box<dyn TripStore>> = Vec::new();
    if !output.no_db {
        let db_path = output.db.as_ref().unwrap_or(&config.db_path);
        info!(db = %db_path.display(), "Writing trip log to SQLite");
        stores.push(Box::new(SqliteStore::open(db_path)?));
    }
    if let Some(csv_path) = output.csv.as_ref().or(config.csv_path.as_ref()) {
        info!(csv = %csv_path.display(), "Writing trip log to CSV");
        stores.push(Box::new(CsvStore::new(csv_path)?));
    }

    let mut session = TripSession::new(clock.clone()).with_observer(LogObserver);
    if !stores.is_empty() {
        session = session.with_persistence(PersistenceWorker::spawn(
            stores,
            config.persist_queue_capacity,
        ));
    }

    if output.json {
        session.register(Box::new(JsonLinesObserver::new(std::io::stdout())));
        return Ok((session, None));
    }

    let (observer, events) = ChannelObserver::new();
    session.register(Box::new(observer));
    let presenter = tokio::spawn(present(events, clock, tick, std::io::stdout()));

    Ok((session, Some(presenter)))
}

async fn finish<C: Clock + Clone>(
    session: TripSession<C>,
    presenter: Option<Presenter>,
) -> Result<()> {
    let summary = session.shutdown().await?;
    if let Some(presenter) = presenter {
        presenter.await??;
    }

    if let Some(summary) = summary {
        info!(
            distance_m = %summary.distance_display(),
            duration = %summary.elapsed_display(),
            latitude = summary.sample.latitude,
            longitude = summary.sample.longitude,
            "Trip saved"
        );
    }
    Ok(())
}
