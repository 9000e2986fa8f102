//! The hub: composition root and query surface.
//!
//! Wires the store, the local collector, and one gateway connection per
//! configured gateway into a single object, and exposes the API the rest
//! of the system (HTTP layer, CLI, tests) calls.

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use hearth_collector::{register_host_series, Collector, LocalRegistry};
use hearth_gateway::{GatewayConnection, RemoteRegistry};
use hearth_store::{
    coerce_value, now_timestamp, Datapoint, RangeSummary, Sample, SeriesDescriptor,
    TimeseriesStore,
};

use crate::config::HubConfig;
use crate::error::{HubError, Result};

/// Setting key holding the persisted sampling interval.
const SAMPLING_RATE_KEY: &str = "sampling_rate_ms";

/// Accepted sampling interval range in milliseconds.
const SAMPLING_RATE_RANGE: std::ops::RangeInclusive<u64> = 100..=3_600_000;

/// One externally submitted sample with enough metadata to register the
/// series on first sight.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSample {
    /// Series id. Required, must not collide with a built-in series.
    pub id: String,
    /// Display name. Required.
    pub name: String,
    /// Units of measurement. Required.
    pub units: String,
    /// The value: number, numeric string, or bool. Anything else is
    /// stored as null.
    pub value: serde_json::Value,
    /// Source timestamp in epoch seconds; omitted means "now".
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Category override (defaults to `External`).
    #[serde(default)]
    pub category: Option<String>,
    /// Tags for the series metadata.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Description for the series metadata.
    #[serde(default)]
    pub description: Option<String>,
    /// Gateway attribution, overriding any batch-level default.
    #[serde(default)]
    pub gateway: Option<String>,
}

impl IngestSample {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("units", &self.units),
        ] {
            if value.trim().is_empty() {
                return Err(HubError::Malformed {
                    reason: format!("'{field}' must be a non-empty string"),
                });
            }
        }
        Ok(())
    }

    fn descriptor(&self, default_gateway: Option<&str>) -> SeriesDescriptor {
        SeriesDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            units: self.units.clone(),
            category: self
                .category
                .clone()
                .unwrap_or_else(|| "External".to_string()),
            tags: self.tags.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            gateway: self
                .gateway
                .clone()
                .or_else(|| default_gateway.map(str::to_string)),
        }
    }
}

/// The assembled hub.
pub struct Hub {
    store: Arc<TimeseriesStore>,
    locals: Arc<LocalRegistry>,
    remotes: Arc<RemoteRegistry>,
    collector: Collector,
    connections: Vec<GatewayConnection>,
}

impl Hub {
    /// Opens the store and assembles collector and gateway connections
    /// per the given configuration. Nothing runs until [`Hub::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn new(config: HubConfig) -> Result<Self> {
        let store = Arc::new(TimeseriesStore::open(&config.db_path)?);

        let mut locals = LocalRegistry::new();
        register_host_series(&mut locals);
        let locals = Arc::new(locals);
        store.reserve_builtin_ids(locals.ids());

        // A previously persisted interval beats the config file.
        let interval_ms = match store.get_setting(SAMPLING_RATE_KEY)? {
            Some(raw) => raw.parse().unwrap_or(config.sampling_interval_ms),
            None => config.sampling_interval_ms,
        };

        let collector = Collector::new(Arc::clone(&locals), Arc::clone(&store), interval_ms);
        let remotes = Arc::new(RemoteRegistry::new(Arc::clone(&store)));

        let reconnect = std::time::Duration::from_secs(config.reconnect_delay_secs);
        let connections = config
            .gateways
            .iter()
            .map(|gw| {
                GatewayConnection::new(gw.host.clone(), gw.port, Arc::clone(&remotes))
                    .with_reconnect_delay(reconnect)
            })
            .collect();

        Ok(Self {
            store,
            locals,
            remotes,
            collector,
            connections,
        })
    }

    /// Starts the collector loop and every gateway connection.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(
            gateways = self.connections.len(),
            series = self.locals.len(),
            "hub starting"
        );
        let mut handles = vec![self.collector.start()];
        handles.extend(self.connections.iter().map(GatewayConnection::start));
        handles
    }

    /// Requests every background loop to stop.
    pub fn stop(&self) {
        self.collector.stop();
        for conn in &self.connections {
            conn.stop();
        }
        info!("hub stopping");
    }

    /// The underlying store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<TimeseriesStore> {
        &self.store
    }

    /// The remote sensor registry shared with gateway connections.
    #[must_use]
    pub fn remotes(&self) -> &Arc<RemoteRegistry> {
        &self.remotes
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    /// Every known series: built-ins first, then registered external
    /// series (which includes remote sensors).
    pub fn list_series(&self) -> Result<Vec<SeriesDescriptor>> {
        let mut all = self.locals.descriptors();
        all.extend(self.store.list_external()?);
        Ok(all)
    }

    /// Samples in `[start, end]`, optionally downsampled to `max_points`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::SeriesNotFound`] for an id no registry knows;
    /// a known series with no rows in range returns an empty vec.
    pub fn get_range(
        &self,
        id: &str,
        start: f64,
        end: f64,
        max_points: Option<usize>,
    ) -> Result<Vec<Sample>> {
        self.require_known(id)?;
        Ok(self.store.query_range(id, start, end, max_points)?)
    }

    /// The most recent `limit` samples in chronological order.
    pub fn get_latest(&self, id: &str, limit: usize) -> Result<Vec<Sample>> {
        self.require_known(id)?;
        Ok(self.store.query_latest(id, limit)?)
    }

    /// The current live value of a series.
    ///
    /// Built-ins are read from hardware on the spot; remote sensors come
    /// from the live cache. A registered external series without a live
    /// source yields `None`.
    pub fn get_current(&self, id: &str) -> Result<Option<f64>> {
        if let Some(series) = self.locals.get(id) {
            return Ok(series.read());
        }
        if self.remotes.contains(id) {
            return Ok(self.remotes.current_value(id));
        }
        if self.store.get_external(id)?.is_some() {
            return Ok(None);
        }
        Err(HubError::SeriesNotFound { id: id.to_string() })
    }

    /// Min/max/oldest summaries for many series at once. Series with no
    /// non-null data in range are omitted.
    pub fn get_minmax_batch(
        &self,
        ids: &[String],
        start: f64,
        end: f64,
    ) -> Result<std::collections::HashMap<String, RangeSummary>> {
        Ok(self.store.query_minmax_batch(ids, start, end)?)
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Ingests one external sample, registering the series on first
    /// sight. Returns `true` if the series was newly registered.
    ///
    /// # Errors
    ///
    /// [`HubError::Malformed`] for missing required fields;
    /// a built-in id conflict surfaces as a store error and nothing is
    /// written.
    pub fn ingest(&self, sample: &IngestSample) -> Result<bool> {
        sample.validate()?;

        let created = self.store.register_external(&sample.descriptor(None))?;
        let value = coerce_value(&sample.value);
        let timestamp = sample.timestamp.unwrap_or_else(now_timestamp);
        self.store.insert(&sample.id, value, Some(timestamp))?;

        debug!(series = %sample.id, created, "ingested external sample");
        Ok(created)
    }

    /// Ingests a batch of external samples atomically.
    ///
    /// `default_gateway` attributes every sample that does not carry its
    /// own `gateway`. The whole batch is checked before anything is
    /// written: one malformed sample or built-in collision rejects the
    /// batch.
    pub fn ingest_batch(
        &self,
        samples: &[IngestSample],
        default_gateway: Option<&str>,
    ) -> Result<usize> {
        for sample in samples {
            sample.validate()?;
            if self.store.is_builtin(&sample.id) {
                return Err(hearth_store::StoreError::BuiltinConflict {
                    id: sample.id.clone(),
                }
                .into());
            }
        }

        let mut batch = Vec::with_capacity(samples.len());
        for sample in samples {
            self.store
                .register_external(&sample.descriptor(default_gateway))?;
            batch.push(Datapoint {
                series_id: sample.id.clone(),
                value: coerce_value(&sample.value),
                timestamp: sample.timestamp,
            });
        }
        self.store.insert_batch(&batch)?;

        debug!(count = batch.len(), "ingested external batch");
        Ok(batch.len())
    }

    // ------------------------------------------------------------------
    // Collection control
    // ------------------------------------------------------------------

    /// Runs one manual collection of every built-in series, skipping
    /// unreadable ones. Returns the number of samples written.
    pub fn collect_now(&self) -> Result<usize> {
        Ok(self.collector.collect_now()?)
    }

    /// Current sampling interval in milliseconds.
    #[must_use]
    pub fn sampling_interval_ms(&self) -> u64 {
        self.collector.interval_ms()
    }

    /// Updates and persists the sampling interval.
    ///
    /// # Errors
    ///
    /// [`HubError::Malformed`] if the interval is outside 100ms..=1h.
    pub fn set_sampling_interval_ms(&self, interval_ms: u64) -> Result<()> {
        if !SAMPLING_RATE_RANGE.contains(&interval_ms) {
            return Err(HubError::Malformed {
                reason: format!(
                    "sampling interval must be within {}..={} ms, got {interval_ms}",
                    SAMPLING_RATE_RANGE.start(),
                    SAMPLING_RATE_RANGE.end()
                ),
            });
        }

        self.store
            .set_setting(SAMPLING_RATE_KEY, &interval_ms.to_string())?;
        self.collector.set_interval_ms(interval_ms);
        Ok(())
    }

    fn require_known(&self, id: &str) -> Result<()> {
        if self.locals.contains(id)
            || self.remotes.contains(id)
            || self.store.get_external(id)?.is_some()
        {
            Ok(())
        } else {
            Err(HubError::SeriesNotFound { id: id.to_string() })
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("builtin_series", &self.locals.len())
            .field("gateways", &self.connections.len())
            .finish_non_exhaustive()
    }
}
