use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::{debug, info};

use super::TripStore;
use crate::record::TripRecord;

/// Trip log kept in a local SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS location (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                distance TEXT,
                avg_speed TEXT,
                latitude REAL,
                longitude REAL,
                max_speed TEXT,
                total_duration TEXT
            )",
            [],
        )?;

        info!("SQLite trip store initialized");
        Ok(Self { conn })
    }

    /// Inserts a row, letting SQLite assign the id unless one is given.
    ///
    /// Returns `false` when a row with the same id already exists; the
    /// existing row is left as is.
    pub fn insert_row(&self, id: Option<i64>, record: &TripRecord) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO location
             (id, distance, avg_speed, latitude, longitude, max_speed, total_duration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                record.distance,
                record.avg_speed,
                record.latitude,
                record.longitude,
                record.max_speed,
                record.total_duration,
            ],
        )?;
        debug!(changed, "Trip record written");
        Ok(changed > 0)
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM location", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// All stored records, oldest first.
    pub fn records(&self) -> Result<Vec<TripRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT distance, avg_speed, latitude, longitude, max_speed, total_duration
             FROM location ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TripRecord {
                distance: row.get(0)?,
                avg_speed: row.get(1)?,
                latitude: row.get(2)?,
                longitude: row.get(3)?,
                max_speed: row.get(4)?,
                total_duration: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl TripStore for SqliteStore {
    async fn insert(&mut self, record: &TripRecord) -> Result<()> {
        self.insert_row(None, record)?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}
