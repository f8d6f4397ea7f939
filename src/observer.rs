//! Presentation side of a trip.
//!
//! Observers are registered on a [`TripSession`](crate::session::TripSession)
//! and called synchronously, in registration order, once per snapshot.
//! [`ChannelObserver`] turns those calls into [`TripEvent`]s on a tokio channel
//! for consumers living on another task, such as [`present`].

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::aggregator::TripSnapshot;
use crate::clock::Clock;
use crate::format::{format_duration, two_places};
use crate::record::DriveUpdate;

/// Something that wants to hear about trip progress.
pub trait TripObserver: Send {
    fn on_trip_started(&mut self, _trip_start: DateTime<Utc>) {}

    /// Called once per processed sample. Errors are logged by the caller and
    /// otherwise ignored.
    fn on_update(&mut self, update: &DriveUpdate) -> Result<()>;

    fn on_trip_stopped(&mut self, _summary: Option<&TripSnapshot>) {}
}

/// Messages carried by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    Started { trip_start: DateTime<Utc> },
    Update(DriveUpdate),
    Stopped { summary: Option<TripSnapshot> },
}

/// Forwards every observer call onto an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TripEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TripEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TripEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow!("trip event receiver dropped"))
    }
}

impl TripObserver for ChannelObserver {
    fn on_trip_started(&mut self, trip_start: DateTime<Utc>) {
        let _ = self.send(TripEvent::Started { trip_start });
    }

    fn on_update(&mut self, update: &DriveUpdate) -> Result<()> {
        self.send(TripEvent::Update(update.clone()))
    }

    fn on_trip_stopped(&mut self, summary: Option<&TripSnapshot>) {
        let _ = self.send(TripEvent::Stopped {
            summary: summary.cloned(),
        });
    }
}

/// Logs every update through `tracing`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl TripObserver for LogObserver {
    fn on_trip_started(&mut self, trip_start: DateTime<Utc>) {
        info!(%trip_start, "Trip started");
    }

    fn on_update(&mut self, update: &DriveUpdate) -> Result<()> {
        debug!(
            speed = update.speed,
            has_accuracy = update.has_accuracy,
            max_speed = update.max_speed,
            average_speed = update.average_speed,
            total_distance = update.total_distance,
            total_time = update.total_time,
            "Drive update"
        );
        Ok(())
    }

    fn on_trip_stopped(&mut self, summary: Option<&TripSnapshot>) {
        match summary {
            Some(s) => info!(
                distance_m = %two_places(s.total_distance_m),
                max_speed_kmh = %two_places(s.max_speed_kmh),
                average_speed_kmh = %two_places(s.average_speed_kmh),
                duration = %format_duration(s.elapsed_ms),
                pace_min_per_km = %two_places(s.pace_min_per_km()),
                "Trip stopped"
            ),
            None => info!("Trip stopped before any fix arrived"),
        }
    }
}

/// Writes each update as one JSON object per line.
pub struct JsonLinesObserver<W> {
    out: W,
}

impl<W: Write + Send> JsonLinesObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TripObserver for JsonLinesObserver<W> {
    fn on_update(&mut self, update: &DriveUpdate) -> Result<()> {
        serde_json::to_writer(&mut self.out, update)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// The four text lines of the trip screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub average_speed: String,
    pub distance: String,
    pub max_speed: String,
    pub time: String,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            average_speed: "Average speed: 0.00".to_string(),
            distance: "Total Kms: 0.00".to_string(),
            max_speed: "Max speed: 0.00".to_string(),
            time: "Total time: 00:00:00".to_string(),
        }
    }
}

impl Dashboard {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Applies an update. Updates without accuracy, or before any average
    /// speed exists, leave the screen as it was.
    ///
    /// Returns whether anything was redrawn.
    pub fn apply(&mut self, update: &DriveUpdate) -> bool {
        if !update.has_accuracy || update.average_speed == 0.0 {
            return false;
        }
        self.average_speed = format!("Average speed: {}", two_places(update.average_speed));
        self.distance = format!("Total Kms: {}", two_places(update.total_distance / 1000.0));
        self.max_speed = format!("Max speed: {}", two_places(update.max_speed));
        self.time = format!("Total time: {}", format_duration(update.total_time));
        true
    }

    /// Refreshes only the time line.
    pub fn tick(&mut self, elapsed_ms: i64) {
        self.time = format!("Total time: {}", format_duration(elapsed_ms));
    }

    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.time, self.distance, self.average_speed, self.max_speed
        )
    }
}

impl TripObserver for Dashboard {
    fn on_trip_started(&mut self, _trip_start: DateTime<Utc>) {
        self.reset();
    }

    fn on_update(&mut self, update: &DriveUpdate) -> Result<()> {
        self.apply(update);
        Ok(())
    }
}

/// Drives a [`Dashboard`] from a channel of trip events, writing a fresh
/// rendering to `out` whenever the screen changes.
///
/// With `tick` set, the time line is also refreshed at that interval from
/// `clock`, the way a running stopwatch would; a zero `tick` disables it.
/// Returns the final screen once
/// the trip stops or the sender is dropped.
pub async fn present<C: Clock>(
    mut rx: mpsc::UnboundedReceiver<TripEvent>,
    clock: C,
    tick: Option<Duration>,
    mut out: impl Write + Send,
) -> Result<Dashboard> {
    // A zero period would make `interval` panic; treat it as no ticking.
    let tick = tick.filter(|period| !period.is_zero());
    let mut dashboard = Dashboard::default();
    let mut trip_start: Option<DateTime<Utc>> = None;
    let mut ticker = tokio::time::interval(tick.unwrap_or(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let redraw = tokio::select! {
            event = rx.recv() => match event {
                Some(TripEvent::Started { trip_start: start }) => {
                    trip_start = Some(start);
                    dashboard.reset();
                    true
                }
                Some(TripEvent::Update(update)) => dashboard.apply(&update),
                Some(TripEvent::Stopped { .. }) | None => break,
            },
            _ = ticker.tick(), if tick.is_some() && trip_start.is_some() => {
                if let Some(start) = trip_start {
                    dashboard.tick((clock.now() - start).num_milliseconds());
                }
                true
            }
        };

        if redraw {
            writeln!(out, "{}\n", dashboard.render())?;
            out.flush()?;
        }
    }

    Ok(dashboard)
}
