//! Streaming trip statistics.
//!
//! [`TripAggregator`] turns a sequence of [`Sample`]s into running totals and
//! emits one [`TripSnapshot`] per sample. It owns its [`AggregationState`]
//! exclusively; callers must serialize access to `on_sample`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::format::{format_duration, two_places};
use crate::geo::distance_between;
use crate::sample::Sample;

/// Running totals for one trip.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationState {
    /// Previous fix whose speed was nonzero and accurate.
    pub last_accepted: Option<Sample>,
    pub distance_m: f64,
    pub current_speed_kmh: f64,
    pub max_speed_kmh: f64,
    /// Decayed running average: each accepted sample halves the weight of
    /// everything before it.
    pub average_speed_kmh: f64,
    pub trip_start: DateTime<Utc>,
}

impl AggregationState {
    pub fn new(trip_start: DateTime<Utc>) -> Self {
        Self {
            last_accepted: None,
            distance_m: 0.0,
            current_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            average_speed_kmh: 0.0,
            trip_start,
        }
    }
}

/// Readout of trip totals at the moment one sample was processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripSnapshot {
    pub max_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub total_distance_m: f64,
    pub elapsed_ms: i64,
    /// False when the sample was inaccurate or stationary and the totals
    /// were carried over unchanged.
    pub accepted: bool,
    pub sample: Sample,
}

impl TripSnapshot {
    pub fn distance_km(&self) -> f64 {
        self.total_distance_m / 1000.0
    }

    /// Minutes per kilometer, or `0.0` before any distance has been covered.
    ///
    /// Distance is rounded to hundredths of a kilometer first, so the first
    /// few meters of a trip still report zero.
    pub fn pace_min_per_km(&self) -> f64 {
        let km = (self.distance_km() * 100.0).round() / 100.0;
        if km > 0.0 {
            self.elapsed_ms as f64 / 60_000.0 / km
        } else {
            0.0
        }
    }

    pub fn elapsed_display(&self) -> String {
        format_duration(self.elapsed_ms)
    }

    pub fn distance_display(&self) -> String {
        two_places(self.total_distance_m)
    }
}

/// Consumes samples for a single trip.
pub struct TripAggregator<C: Clock = SystemClock> {
    clock: C,
    state: AggregationState,
}

impl TripAggregator<SystemClock> {
    /// Starts a trip timed by the wall clock.
    pub fn start_now() -> Self {
        Self::start(SystemClock)
    }
}

impl<C: Clock> TripAggregator<C> {
    /// Starts a trip with `trip_start` fixed to the clock's current time.
    pub fn start(clock: C) -> Self {
        let state = AggregationState::new(clock.now());
        Self { clock, state }
    }

    /// Discards all totals and starts over from the clock's current time.
    pub fn restart(&mut self) -> DateTime<Utc> {
        self.state = AggregationState::new(self.clock.now());
        self.state.trip_start
    }

    pub fn trip_start(&self) -> DateTime<Utc> {
        self.state.trip_start
    }

    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.clock.now() - self.state.trip_start).num_milliseconds()
    }

    /// Folds one sample into the trip and returns the resulting snapshot.
    ///
    /// Inaccurate or zero-speed samples leave every total untouched; the
    /// snapshot still carries them so observers can show the lost signal.
    pub fn on_sample(&mut self, sample: Sample) -> TripSnapshot {
        let elapsed_ms = self.elapsed_ms();

        if !sample.is_usable() {
            return self.snapshot(sample, elapsed_ms, false);
        }

        let state = &mut self.state;
        state.current_speed_kmh = sample.speed_kmh();
        state.max_speed_kmh = state.max_speed_kmh.max(state.current_speed_kmh);

        if let Some(prev) = &state.last_accepted {
            state.distance_m += distance_between(prev, &sample);
        }

        state.average_speed_kmh = (state.current_speed_kmh + state.average_speed_kmh) / 2.0;
        state.last_accepted = Some(sample);

        self.snapshot(sample, elapsed_ms, true)
    }

    fn snapshot(&self, sample: Sample, elapsed_ms: i64, accepted: bool) -> TripSnapshot {
        TripSnapshot {
            max_speed_kmh: self.state.max_speed_kmh,
            average_speed_kmh: self.state.average_speed_kmh,
            total_distance_m: self.state.distance_m,
            elapsed_ms,
            accepted,
            sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::geo::offset_north;
    use chrono::{Duration, TimeZone};

    const LAT: f64 = 42.3601;
    const LON: f64 = -71.0589;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn fix(lat: f64, speed: f64, accurate: bool, clock: &FixedClock) -> Sample {
        Sample::new(lat, LON, speed, accurate, clock.now())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_two_sample_scenario() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());

        clock.advance(Duration::seconds(2));
        let first = trip.on_sample(fix(LAT, 10.0, true, &clock));
        assert_eq!(two_places(first.max_speed_kmh), "36.00");
        assert_eq!(first.distance_display(), "0.00");
        assert_eq!(first.elapsed_ms, 2_000);

        clock.advance(Duration::seconds(5));
        let second = trip.on_sample(fix(offset_north(LAT, 100.0), 20.0, true, &clock));
        assert_eq!(two_places(second.max_speed_kmh), "72.00");
        assert_eq!(second.distance_display(), "100.00");
        assert_eq!(two_places(second.average_speed_kmh), "54.00");
        assert_eq!(second.elapsed_ms, 7_000);
    }

    #[test]
    fn test_first_accurate_sample_adds_no_distance() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());

        let snap = trip.on_sample(fix(LAT, 5.0, true, &clock));
        assert!(snap.accepted);
        assert_eq!(snap.total_distance_m, 0.0);
        assert_eq!(trip.state().last_accepted, Some(snap.sample));
    }

    #[test]
    fn test_rejected_samples_leave_totals_unchanged() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        trip.on_sample(fix(LAT, 10.0, true, &clock));
        trip.on_sample(fix(offset_north(LAT, 50.0), 12.0, true, &clock));
        let before = trip.state().clone();

        let inaccurate = trip.on_sample(fix(offset_north(LAT, 500.0), 40.0, false, &clock));
        let stationary = trip.on_sample(fix(offset_north(LAT, 900.0), 0.0, true, &clock));

        assert_eq!(trip.state(), &before);
        for snap in [inaccurate, stationary] {
            assert!(!snap.accepted);
            assert_eq!(snap.total_distance_m, before.distance_m);
            assert_eq!(snap.max_speed_kmh, before.max_speed_kmh);
            assert_eq!(snap.average_speed_kmh, before.average_speed_kmh);
        }
    }

    #[test]
    fn test_rejected_sample_is_carried_in_snapshot() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());

        let raw = fix(LAT, 7.0, false, &clock);
        let snap = trip.on_sample(raw);
        assert_eq!(snap.sample, raw);
        assert!(trip.state().last_accepted.is_none());
    }

    #[test]
    fn test_max_speed_tracks_maximum() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        let speeds = [3.0, 11.0, 7.5, 11.0, 2.0, 15.25, 1.0];

        let mut expected_max: f64 = 0.0;
        for (i, speed) in speeds.iter().enumerate() {
            let snap = trip.on_sample(fix(offset_north(LAT, i as f64 * 10.0), *speed, true, &clock));
            expected_max = expected_max.max(speed * 3.6);
            assert_close(snap.max_speed_kmh, expected_max);
            assert!(trip.state().max_speed_kmh >= trip.state().current_speed_kmh);
        }
    }

    #[test]
    fn test_distance_is_non_decreasing() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        let mut last = 0.0;

        for i in 0..20 {
            let accurate = i % 3 != 0;
            let speed = if i % 5 == 0 { 0.0 } else { 4.0 };
            // Wander back and forth; distance still only grows.
            let lat = offset_north(LAT, if i % 2 == 0 { 0.0 } else { 30.0 });
            let snap = trip.on_sample(fix(lat, speed, accurate, &clock));

            assert!(snap.total_distance_m >= last);
            if !snap.accepted {
                assert_eq!(snap.total_distance_m, last);
            }
            last = snap.total_distance_m;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn test_average_is_decayed_not_arithmetic_mean() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        let speeds_kmh = [36.0, 72.0, 18.0];

        let mut expected = 0.0;
        let mut snap = None;
        for (i, kmh) in speeds_kmh.iter().enumerate() {
            expected = (kmh + expected) / 2.0;
            snap = Some(trip.on_sample(fix(offset_north(LAT, i as f64), kmh / 3.6, true, &clock)));
        }
        let avg = snap.unwrap().average_speed_kmh;

        // 36 -> 18, 72 -> 45, 18 -> 31.5
        assert_close(avg, expected);
        assert_close(avg, 31.5);
        let mean = speeds_kmh.iter().sum::<f64>() / speeds_kmh.len() as f64;
        assert!((avg - mean).abs() > 1.0);
    }

    #[test]
    fn test_restart_resets_state() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        trip.on_sample(fix(LAT, 10.0, true, &clock));
        trip.on_sample(fix(offset_north(LAT, 20.0), 10.0, true, &clock));

        clock.advance(Duration::minutes(3));
        let started = trip.restart();

        assert_eq!(started, t0() + Duration::minutes(3));
        assert_eq!(trip.state(), &AggregationState::new(started));
        assert_eq!(trip.elapsed_ms(), 0);
    }

    #[test]
    fn test_pace_zero_distance_is_zero() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        clock.advance(Duration::minutes(10));

        let snap = trip.on_sample(fix(LAT, 3.0, true, &clock));
        assert_eq!(snap.total_distance_m, 0.0);
        assert_eq!(snap.pace_min_per_km(), 0.0);
    }

    #[test]
    fn test_pace_minutes_per_km() {
        let clock = FixedClock::new(t0());
        let mut trip = TripAggregator::start(clock.clone());
        trip.on_sample(fix(LAT, 3.0, true, &clock));

        clock.advance(Duration::minutes(10));
        let snap = trip.on_sample(fix(offset_north(LAT, 2_000.0), 3.0, true, &clock));
        assert_close(snap.pace_min_per_km(), 5.0);
    }

    #[test]
    fn test_empty_trip_readout() {
        let clock = FixedClock::new(t0());
        let trip = TripAggregator::start(clock.clone());

        assert_eq!(format_duration(trip.elapsed_ms()), "00:00:00");
        assert_eq!(two_places(trip.state().distance_m), "0.00");
    }
}
