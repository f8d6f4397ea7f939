//! Raw location fixes as delivered by a location source.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single location fix.
///
/// Samples are immutable once read; the aggregator consumes each one exactly
/// once and only keeps the last accepted fix around for distance measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in meters per second.
    #[serde(rename = "speed")]
    pub speed_mps: f64,
    /// True only when the fix carries a reliable speed reading.
    pub has_accuracy: bool,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        speed_mps: f64,
        has_accuracy: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            has_accuracy,
            timestamp,
        }
    }

    /// Whether this fix moves the trip totals.
    pub fn is_usable(&self) -> bool {
        self.has_accuracy && self.speed_mps != 0.0
    }

    /// Speed converted to kilometers per hour.
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }

    /// Rejects fixes that are not structurally valid.
    ///
    /// Used by sample readers at the source boundary; the aggregator accepts
    /// anything that made it this far.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() || !self.speed_mps.is_finite()
        {
            bail!("non-finite value in sample at {}", self.timestamp);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            bail!("latitude {} out of range", self.latitude);
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            bail!("longitude {} out of range", self.longitude);
        }
        if self.speed_mps < 0.0 {
            bail!("negative speed {}", self.speed_mps);
        }
        Ok(())
    }
}
