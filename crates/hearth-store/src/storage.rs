//! SQLite-backed sample and metadata storage.
//!
//! This module provides [`TimeseriesStore`], the durable home for every
//! sample the hub ingests. The schema is a narrow three-column fact table
//! with a composite uniqueness constraint on `(series_id, timestamp)` and a
//! covering index matching the dominant query shape: one series, time
//! range, ascending.
//!
//! Write discipline: a single writer connection behind a private mutex;
//! every insert, registration, and delete goes through it. Reads open a
//! short-lived read-only connection per query and never touch the write
//! lock; WAL journaling gives them a consistent snapshot alongside an
//! in-flight writer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::downsample::lttb;
use crate::error::{Result, StoreError};
use crate::types::{
    now_timestamp, Datapoint, RangeSummary, Sample, SeriesDescriptor, SeriesSummary,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    series_id TEXT NOT NULL,
    timestamp REAL NOT NULL,
    value     REAL,
    UNIQUE(series_id, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_samples_series_timestamp
    ON samples(series_id, timestamp);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO settings (key, value) VALUES ('sampling_rate_ms', '5000');

CREATE TABLE IF NOT EXISTS external_series (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    units       TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL DEFAULT 'External',
    tags        TEXT NOT NULL DEFAULT '[]',
    description TEXT NOT NULL DEFAULT '',
    gateway     TEXT DEFAULT NULL
);
";

/// Durable, queryable persistence for samples and series metadata.
///
/// Cheap to share: wrap in an [`std::sync::Arc`] and hand clones of the
/// handle to the collector, gateway registry, and query surface.
#[derive(Debug)]
pub struct TimeseriesStore {
    path: PathBuf,
    /// The single writer connection. Every mutation acquires this lock;
    /// callers block (not spin) waiting for it.
    writer: Mutex<Connection>,
    /// Ids of built-in series. External registration for any of these is
    /// rejected so code-defined series can never be shadowed.
    reserved: RwLock<HashSet<String>>,
}

impl TimeseriesStore {
    /// Opens (creating if needed) the store at `path` and initializes the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // auto_vacuum and page_size must be set before the first table is
        // created to take effect on a fresh file. WAL is what lets readers
        // run without the write lock.
        conn.execute_batch(
            "PRAGMA auto_vacuum = FULL;
             PRAGMA page_size = 4096;
             PRAGMA journal_mode = WAL;",
        )?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "opened timeseries store");

        Ok(Self {
            path,
            writer: Mutex::new(conn),
            reserved: RwLock::new(HashSet::new()),
        })
    }

    /// Declares the given ids as built-in. External registrations and
    /// ingestion for these ids will be rejected with
    /// [`StoreError::BuiltinConflict`].
    pub fn reserve_builtin_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reserved = self.reserved.write();
        reserved.extend(ids.into_iter().map(Into::into));
    }

    /// True if `id` names a built-in series.
    #[must_use]
    pub fn is_builtin(&self, id: &str) -> bool {
        self.reserved.read().contains(id)
    }

    fn reader(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Upserts one sample. A second write at the same `(series_id,
    /// timestamp)` replaces the prior value; it is never an error.
    ///
    /// `timestamp` of `None` stamps the row with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error only on a database failure, never on the value.
    pub fn insert(&self, series_id: &str, value: Option<f64>, timestamp: Option<f64>) -> Result<()> {
        let timestamp = timestamp.unwrap_or_else(now_timestamp);

        let conn = self.writer.lock();
        conn.execute(
            "INSERT OR REPLACE INTO samples (series_id, timestamp, value) VALUES (?1, ?2, ?3)",
            params![series_id, timestamp, value],
        )?;

        debug!(series = %series_id, timestamp, "inserted sample");
        Ok(())
    }

    /// Upserts a batch of samples in one transaction: either every row
    /// lands or, on a database failure, none do.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; the batch is then not
    /// applied.
    pub fn insert_batch(&self, datapoints: &[Datapoint]) -> Result<()> {
        if datapoints.is_empty() {
            return Ok(());
        }

        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO samples (series_id, timestamp, value) VALUES (?1, ?2, ?3)",
            )?;
            for dp in datapoints {
                let timestamp = dp.timestamp.unwrap_or_else(now_timestamp);
                stmt.execute(params![dp.series_id, timestamp, dp.value])?;
            }
        }
        tx.commit()?;

        debug!(count = datapoints.len(), "inserted sample batch");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Queries samples in `[start, end]` (inclusive), ascending by
    /// timestamp.
    ///
    /// If `max_points` is given and the result exceeds it, the result is
    /// downsampled with LTTB to exactly `max_points` points.
    pub fn query_range(
        &self,
        series_id: &str,
        start: f64,
        end: f64,
        max_points: Option<usize>,
    ) -> Result<Vec<Sample>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, value FROM samples
             WHERE series_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![series_id, start, end], |row| {
            Ok(Sample::new(row.get(0)?, row.get(1)?))
        })?;
        let data: Vec<Sample> = rows.collect::<rusqlite::Result<_>>()?;

        match max_points {
            Some(cap) if data.len() > cap => Ok(lttb(&data, cap)),
            _ => Ok(data),
        }
    }

    /// Queries the most recent `limit` samples, returned in ascending
    /// (chronological) order.
    pub fn query_latest(&self, series_id: &str, limit: usize) -> Result<Vec<Sample>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, value FROM samples
             WHERE series_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![series_id, limit as i64], |row| {
            Ok(Sample::new(row.get(0)?, row.get(1)?))
        })?;
        let mut data: Vec<Sample> = rows.collect::<rusqlite::Result<_>>()?;
        data.reverse();
        Ok(data)
    }

    /// Queries min and max over non-null values in `[start, end]`.
    ///
    /// Returns `None` when the range holds no non-null rows.
    pub fn query_minmax(
        &self,
        series_id: &str,
        start: f64,
        end: f64,
    ) -> Result<Option<(f64, f64)>> {
        let conn = self.reader()?;
        Self::minmax_on(&conn, series_id, start, end)
    }

    /// Per-series min/max/oldest over a time range.
    ///
    /// Series with no non-null rows in range are omitted from the result.
    /// `oldest` is the value of the chronologically first non-null row,
    /// used by callers to compute trend deltas.
    pub fn query_minmax_batch(
        &self,
        series_ids: &[String],
        start: f64,
        end: f64,
    ) -> Result<HashMap<String, RangeSummary>> {
        let conn = self.reader()?;
        let mut results = HashMap::new();

        for series_id in series_ids {
            let Some((min, max)) = Self::minmax_on(&conn, series_id, start, end)? else {
                continue;
            };

            let oldest: Option<f64> = conn
                .query_row(
                    "SELECT value FROM samples
                     WHERE series_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                       AND value IS NOT NULL
                     ORDER BY timestamp ASC
                     LIMIT 1",
                    params![series_id, start, end],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?
                .flatten();

            // min was non-null, so a non-null row exists in range.
            if let Some(oldest) = oldest {
                results.insert(series_id.clone(), RangeSummary { min, max, oldest });
            }
        }

        Ok(results)
    }

    fn minmax_on(
        conn: &Connection,
        series_id: &str,
        start: f64,
        end: f64,
    ) -> Result<Option<(f64, f64)>> {
        let (min, max): (Option<f64>, Option<f64>) = conn.query_row(
            "SELECT MIN(value), MAX(value) FROM samples
             WHERE series_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
               AND value IS NOT NULL",
            params![series_id, start, end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match (min, max) {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // External series registry
    // ------------------------------------------------------------------

    /// Upserts metadata for an external series.
    ///
    /// Returns `true` when newly registered, `false` when an existing
    /// registration was updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BuiltinConflict`] if the id names a built-in
    /// series; the built-in is left untouched.
    pub fn register_external(&self, descriptor: &SeriesDescriptor) -> Result<bool> {
        if self.is_builtin(&descriptor.id) {
            return Err(StoreError::BuiltinConflict {
                id: descriptor.id.clone(),
            });
        }

        let tags = serde_json::to_string(&descriptor.tags)
            .unwrap_or_else(|_| "[]".to_string());

        let conn = self.writer.lock();
        let existed: bool = conn
            .query_row(
                "SELECT 1 FROM external_series WHERE id = ?1",
                params![descriptor.id],
                |_| Ok(()),
            )
            .map(|()| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;

        conn.execute(
            "INSERT OR REPLACE INTO external_series
                 (id, name, units, category, tags, description, gateway)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                descriptor.id,
                descriptor.name,
                descriptor.units,
                descriptor.category,
                tags,
                descriptor.description,
                descriptor.gateway,
            ],
        )?;

        if !existed {
            info!(series = %descriptor.id, "registered external series");
        }
        Ok(!existed)
    }

    /// Fetches metadata for one external series.
    pub fn get_external(&self, id: &str) -> Result<Option<SeriesDescriptor>> {
        let conn = self.reader()?;
        let descriptor = conn
            .query_row(
                "SELECT id, name, units, category, tags, description, gateway
                 FROM external_series WHERE id = ?1",
                params![id],
                Self::descriptor_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(descriptor)
    }

    /// Lists every registered external series, ordered by name.
    pub fn list_external(&self) -> Result<Vec<SeriesDescriptor>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, units, category, tags, description, gateway
             FROM external_series ORDER BY name",
        )?;
        let rows = stmt.query_map([], Self::descriptor_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Removes an external series registration. Its samples are kept.
    ///
    /// Returns `true` if a registration was deleted.
    pub fn delete_external(&self, id: &str) -> Result<bool> {
        let conn = self.writer.lock();
        let deleted = conn.execute("DELETE FROM external_series WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn descriptor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeriesDescriptor> {
        let tags_json: String = row.get(4)?;
        Ok(SeriesDescriptor {
            id: row.get(0)?,
            name: row.get(1)?,
            units: row.get(2)?,
            category: row.get(3)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            description: row.get(5)?,
            gateway: row.get(6)?,
        })
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Reads a setting, or `None` if unset.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.reader()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(value)
    }

    /// Writes a setting, replacing any prior value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.writer.lock();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Reads every setting.
    pub fn all_settings(&self) -> Result<HashMap<String, String>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Deletes samples older than `older_than`. Returns the deleted count.
    pub fn delete_before(&self, series_id: &str, older_than: f64) -> Result<usize> {
        let conn = self.writer.lock();
        let deleted = conn.execute(
            "DELETE FROM samples WHERE series_id = ?1 AND timestamp < ?2",
            params![series_id, older_than],
        )?;
        Ok(deleted)
    }

    /// Deletes all samples and metadata for a series. Returns the number
    /// of sample rows removed.
    pub fn delete_series(&self, series_id: &str) -> Result<usize> {
        let conn = self.writer.lock();
        let deleted = conn.execute(
            "DELETE FROM samples WHERE series_id = ?1",
            params![series_id],
        )?;
        conn.execute(
            "DELETE FROM external_series WHERE id = ?1",
            params![series_id],
        )?;
        info!(series = %series_id, deleted, "cleared series");
        Ok(deleted)
    }

    /// Deletes samples whose value exceeds `threshold`. Returns the
    /// deleted count.
    pub fn delete_above(&self, series_id: &str, threshold: f64) -> Result<usize> {
        let conn = self.writer.lock();
        let deleted = conn.execute(
            "DELETE FROM samples WHERE series_id = ?1 AND value > ?2",
            params![series_id, threshold],
        )?;
        Ok(deleted)
    }

    /// Deletes samples whose value falls below `threshold`. Returns the
    /// deleted count.
    pub fn delete_below(&self, series_id: &str, threshold: f64) -> Result<usize> {
        let conn = self.writer.lock();
        let deleted = conn.execute(
            "DELETE FROM samples WHERE series_id = ?1 AND value < ?2",
            params![series_id, threshold],
        )?;
        Ok(deleted)
    }

    /// Per-series row count and time bounds, for the maintenance surface.
    pub fn series_summaries(&self) -> Result<Vec<SeriesSummary>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT series_id, COUNT(*), MIN(timestamp), MAX(timestamp)
             FROM samples
             GROUP BY series_id
             ORDER BY series_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SeriesSummary {
                id: row.get(0)?,
                count: row.get(1)?,
                oldest: row.get(2)?,
                newest: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Compacts the database file and reclaims space after bulk deletes.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.writer.lock();
        conn.execute_batch("VACUUM")?;
        info!("vacuum completed");
        Ok(())
    }

    /// Applies WAL journaling and full auto-vacuum to an existing
    /// database file. Runs a VACUUM when the auto-vacuum mode changes,
    /// since that setting only takes effect afterwards.
    pub fn optimize(&self) -> Result<()> {
        let conn = self.writer.lock();

        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            conn.execute_batch("PRAGMA journal_mode = WAL")?;
            info!("enabled WAL journal mode");
        }

        let auto_vacuum: i64 = conn.query_row("PRAGMA auto_vacuum", [], |row| row.get(0))?;
        if auto_vacuum != 1 {
            conn.execute_batch("PRAGMA auto_vacuum = FULL; VACUUM;")?;
            info!("enabled full auto-vacuum");
        }

        Ok(())
    }

    /// Size of the database file in bytes (0 if it cannot be read).
    #[must_use]
    pub fn database_size(&self) -> u64 {
        std::fs::metadata(&self.path).map_or(0, |m| m.len())
    }
}
