use std::time::Duration;
use tracing::warn;

use crate::geo::distance_between;
use crate::sample::Sample;

/// Delivery hints for a location source.
///
/// These shape which fixes reach a trip; the aggregator itself never looks
/// at them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    /// Preferred spacing between fixes.
    pub interval: Duration,
    /// Fixes closer together than this are dropped.
    pub fastest_interval: Duration,
    /// Fixes closer than this many meters to the last delivered one are dropped.
    pub min_displacement_m: f64,
}

impl Default for LocationRequest {
    fn default() -> Self {
        let interval = Duration::from_secs(2);
        Self {
            interval,
            fastest_interval: interval / 2,
            min_displacement_m: 5.0,
        }
    }
}

impl LocationRequest {
    /// Whether `next` would be delivered after `last`.
    pub fn admits(&self, last: Option<&Sample>, next: &Sample) -> bool {
        let Some(last) = last else {
            return true;
        };

        let gap = (next.timestamp - last.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);
        gap >= self.fastest_interval && distance_between(last, next) >= self.min_displacement_m
    }

    /// Filters a recorded log the way the platform would have delivered it.
    ///
    /// Fixes that go back in time are dropped as well.
    pub fn throttle(&self, samples: impl IntoIterator<Item = Sample>) -> Vec<Sample> {
        let mut delivered: Vec<Sample> = Vec::new();

        for sample in samples {
            let last = delivered.last();
            if let Some(last) = last {
                if sample.timestamp < last.timestamp {
                    warn!(
                        timestamp = %sample.timestamp,
                        previous = %last.timestamp,
                        "Dropping out-of-order sample"
                    );
                    continue;
                }
            }
            if self.admits(last, &sample) {
                delivered.push(sample);
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn fix(meters: f64, secs: i64) -> Sample {
        Sample::new(offset_north(42.0, meters), -71.0, 5.0, true, t(secs))
    }

    #[test]
    fn test_defaults() {
        let req = LocationRequest::default();
        assert_eq!(req.interval, Duration::from_secs(2));
        assert_eq!(req.fastest_interval, Duration::from_secs(1));
        assert_eq!(req.min_displacement_m, 5.0);
    }

    #[test]
    fn test_first_fix_always_admitted() {
        assert!(LocationRequest::default().admits(None, &fix(0.0, 0)));
    }

    #[test]
    fn test_admits_checks_time_and_distance() {
        let req = LocationRequest::default();
        let last = fix(0.0, 0);

        assert!(req.admits(Some(&last), &fix(10.0, 2)));
        assert!(!req.admits(Some(&last), &fix(10.0, 0)));
        assert!(!req.admits(Some(&last), &fix(2.0, 2)));
    }

    #[test]
    fn test_throttle_drops_close_and_backwards_fixes() {
        let req = LocationRequest::default();
        let log = vec![
            fix(0.0, 0),
            fix(1.0, 2),   // too close
            fix(20.0, 4),
            fix(40.0, 3),  // goes back in time
            fix(60.0, 6),
        ];

        let delivered = req.throttle(log);
        let times: Vec<_> = delivered.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![t(0), t(4), t(6)]);
    }
}
