//! Payloads handed to the persistence and presentation sides of a trip.

use serde::{Deserialize, Serialize};

use crate::aggregator::TripSnapshot;
use crate::format::{format_duration, two_places};

/// One row in the local trip log.
///
/// Numeric totals are stored pre-formatted to two decimals, the same way they
/// are shown to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Distance covered so far, in meters.
    pub distance: String,
    pub avg_speed: String,
    pub latitude: f64,
    pub longitude: f64,
    pub max_speed: String,
    /// Elapsed trip time as `HH:MM:SS`.
    pub total_duration: String,
}

impl From<&TripSnapshot> for TripRecord {
    fn from(snapshot: &TripSnapshot) -> Self {
        Self {
            distance: two_places(snapshot.total_distance_m),
            avg_speed: two_places(snapshot.average_speed_kmh),
            latitude: snapshot.sample.latitude,
            longitude: snapshot.sample.longitude,
            max_speed: two_places(snapshot.max_speed_kmh),
            total_duration: format_duration(snapshot.elapsed_ms),
        }
    }
}

/// Live update pushed to whatever is displaying the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveUpdate {
    pub max_speed: f64,
    pub average_speed: f64,
    pub has_accuracy: bool,
    /// Raw speed of the triggering fix, meters per second.
    pub speed: f64,
    /// Meters.
    pub total_distance: f64,
    /// Milliseconds since the trip started.
    pub total_time: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&TripSnapshot> for DriveUpdate {
    fn from(snapshot: &TripSnapshot) -> Self {
        Self {
            max_speed: snapshot.max_speed_kmh,
            average_speed: snapshot.average_speed_kmh,
            has_accuracy: snapshot.sample.has_accuracy,
            speed: snapshot.sample.speed_mps,
            total_distance: snapshot.total_distance_m,
            total_time: snapshot.elapsed_ms,
            latitude: snapshot.sample.latitude,
            longitude: snapshot.sample.longitude,
        }
    }
}
