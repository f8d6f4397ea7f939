//! Local persistence of trip records.
//!
//! [`TripStore`] is the backend interface; [`CsvStore`] and [`SqliteStore`]
//! implement it. [`PersistenceWorker`] runs the stores on a background task so
//! writes never hold up sample processing.

mod csv_log;
mod sqlite;
mod worker;

pub use self::csv_log::{CsvStore, append_record};
pub use self::sqlite::SqliteStore;
pub use self::worker::PersistenceWorker;

use anyhow::Result;
use async_trait::async_trait;

use crate::record::TripRecord;

/// A destination for trip records.
#[async_trait]
pub trait TripStore: Send {
    /// Stores a single record.
    async fn insert(&mut self, record: &TripRecord) -> Result<()>;

    /// Pushes anything buffered down to storage.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short backend name for log fields.
    fn backend_type(&self) -> &'static str;
}
