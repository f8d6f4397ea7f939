//! Trip control surface.
//!
//! A [`TripSession`] is what the user-facing layer talks to: it starts and
//! stops trips, takes samples from the location source, and fans each
//! resulting snapshot out to persistence and to registered observers. Every
//! trip gets a fresh [`TripAggregator`]; nothing carries over between trips.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aggregator::{TripAggregator, TripSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::observer::TripObserver;
use crate::record::{DriveUpdate, TripRecord};
use crate::sample::Sample;
use crate::store::PersistenceWorker;

/// Why [`TripSession::feed_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEnd {
    SourceClosed,
    StopRequested,
}

pub struct TripSession<C: Clock + Clone = SystemClock> {
    clock: C,
    trip: Option<TripAggregator<C>>,
    last_snapshot: Option<TripSnapshot>,
    trips_started: u64,
    persistence: Option<PersistenceWorker>,
    observers: Vec<Box<dyn TripObserver>>,
}

impl<C: Clock + Clone> TripSession<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            trip: None,
            last_snapshot: None,
            trips_started: 0,
            persistence: None,
            observers: Vec::new(),
        }
    }

    pub fn with_persistence(mut self, worker: PersistenceWorker) -> Self {
        self.persistence = Some(worker);
        self
    }

    pub fn with_observer(mut self, observer: impl TripObserver + 'static) -> Self {
        self.register(Box::new(observer));
        self
    }

    /// Adds an observer; it sees every snapshot from the next sample on.
    pub fn register(&mut self, observer: Box<dyn TripObserver>) {
        self.observers.push(observer);
    }

    pub fn is_running(&self) -> bool {
        self.trip.is_some()
    }

    /// Start instant of the running trip.
    pub fn trip_start(&self) -> Option<DateTime<Utc>> {
        self.trip.as_ref().map(|t| t.trip_start())
    }

    /// Starts a trip and returns its start instant.
    ///
    /// Does nothing if a trip is already running, returning that trip's start.
    pub fn start_trip(&mut self) -> DateTime<Utc> {
        if let Some(trip) = &self.trip {
            debug!("Trip already running");
            return trip.trip_start();
        }

        let trip = TripAggregator::start(self.clock.clone());
        let trip_start = trip.trip_start();
        self.trip = Some(trip);
        self.last_snapshot = None;
        self.trips_started += 1;

        info!(trip = self.trips_started, %trip_start, "Starting trip");
        for observer in self.observers.iter_mut() {
            observer.on_trip_started(trip_start);
        }
        trip_start
    }

    /// Feeds one sample into the running trip.
    ///
    /// Accepted snapshots are queued for persistence; every snapshot goes to
    /// the observers. Returns `None` when no trip is running.
    pub fn push(&mut self, sample: Sample) -> Option<TripSnapshot> {
        let Some(trip) = self.trip.as_mut() else {
            debug!("No trip running, ignoring sample");
            return None;
        };

        let snapshot = trip.on_sample(sample);

        if snapshot.accepted {
            if let Some(worker) = &self.persistence {
                worker.submit(TripRecord::from(&snapshot));
            }
        } else {
            debug!(
                has_accuracy = sample.has_accuracy,
                speed = sample.speed_mps,
                "Sample carried no usable speed"
            );
        }

        let update = DriveUpdate::from(&snapshot);
        for observer in self.observers.iter_mut() {
            if let Err(e) = observer.on_update(&update) {
                warn!(error = %e, "Observer failed to take drive update");
            }
        }

        self.last_snapshot = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Pushes samples from `samples` until the source closes or `stop`
    /// resolves.
    ///
    /// `stop` is polled for the whole run, so a stop request is never missed
    /// while a sample is being processed. Samples already queued are drained
    /// before the stop request is honored.
    pub async fn feed_until(
        &mut self,
        samples: &mut mpsc::Receiver<Sample>,
        stop: impl Future,
    ) -> FeedEnd {
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                sample = samples.recv() => match sample {
                    Some(sample) => {
                        self.push(sample);
                    }
                    None => return FeedEnd::SourceClosed,
                },
                _ = &mut stop => return FeedEnd::StopRequested,
            }
        }
    }

    /// Ends the running trip, discarding its state.
    ///
    /// Returns the last snapshot of the trip as its summary. Stopping when no
    /// trip is running does nothing.
    pub fn stop_trip(&mut self) -> Option<TripSnapshot> {
        if self.trip.take().is_none() {
            debug!("No trip to stop");
            return None;
        }

        let summary = self.last_snapshot.take();
        info!(trip = self.trips_started, "Trip stopped");
        for observer in self.observers.iter_mut() {
            observer.on_trip_stopped(summary.as_ref());
        }
        summary
    }

    /// Stops any running trip and waits for queued records to be written.
    pub async fn shutdown(mut self) -> Result<Option<TripSnapshot>> {
        let summary = self.stop_trip();
        if let Some(worker) = self.persistence.take() {
            worker.shutdown().await?;
        }
        Ok(summary)
    }
}
