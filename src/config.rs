//! Runtime configuration.
//!
//! Values come from the process environment (a `.env` file is loaded first by
//! the binary); command-line flags override them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::source::LocationRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// SQLite trip log (`TRIP_DB_PATH`).
    pub db_path: PathBuf,
    /// Optional CSV trip log (`TRIP_CSV_PATH`).
    pub csv_path: Option<PathBuf>,
    pub location: LocationRequest,
    /// Records allowed to wait for the persistence worker (`PERSIST_QUEUE_CAPACITY`).
    pub persist_queue_capacity: usize,
    /// Bearer token sent when replaying logs over HTTP (`TRIP_LOG_TOKEN`).
    pub log_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("trips.db"),
            csv_path: None,
            location: LocationRequest::default(),
            persist_queue_capacity: 256,
            log_token: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults
    /// for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let interval = parse::<u64>(&lookup, "LOCATION_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.location.interval);
        let fastest_interval = parse::<u64>(&lookup, "LOCATION_FASTEST_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(interval / 2);
        let min_displacement_m = parse::<f64>(&lookup, "LOCATION_MIN_DISPLACEMENT_M")?
            .unwrap_or(defaults.location.min_displacement_m);

        Ok(Self {
            db_path: lookup("TRIP_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            csv_path: lookup("TRIP_CSV_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            location: LocationRequest {
                interval,
                fastest_interval,
                min_displacement_m,
            },
            persist_queue_capacity: parse(&lookup, "PERSIST_QUEUE_CAPACITY")?
                .unwrap_or(defaults.persist_queue_capacity),
            log_token: lookup("TRIP_LOG_TOKEN").filter(|t| !t.is_empty()),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has invalid value '{raw}'"))
        })
        .transpose()
}
