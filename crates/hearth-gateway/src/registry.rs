//! Remote sensor registry.
//!
//! Tracks every sensor announced by connected gateways: a live-value cache
//! for "current value" queries, plus persistent metadata registration in
//! the store so remote series show up alongside everything else.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use hearth_proto::{Reading, SensorInfo};
use hearth_store::{Datapoint, SeriesDescriptor, StoreError, TimeseriesStore};

/// Live cache and store bridge for remote sensors.
///
/// Shared between all gateway connections and the query surface. The
/// cache maps each announced id to its freshest value and sits under
/// its own lock, independent of the store's write lock; a slow database
/// write never blocks a current-value read.
pub struct RemoteRegistry {
    sensors: Mutex<HashMap<String, Option<f64>>>,
    store: Arc<TimeseriesStore>,
}

impl RemoteRegistry {
    /// Creates a registry persisting through the given store.
    #[must_use]
    pub fn new(store: Arc<TimeseriesStore>) -> Self {
        Self {
            sensors: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Handles a discovery reply: caches each sensor and registers its
    /// metadata in the store.
    ///
    /// Idempotent; a re-announcement refreshes metadata and keeps the
    /// cached live value. A sensor whose id collides with a built-in
    /// series is logged and skipped, never an error for the rest of the
    /// inventory.
    pub fn on_discovered(&self, gateway_id: &str, announced: Vec<SensorInfo>) {
        info!(
            gateway = %gateway_id,
            count = announced.len(),
            "gateway announced sensors"
        );

        // Metadata registration goes through the store's write lock and
        // can stall behind an in-flight batch. The cache lock is never
        // held across it: live reads and data batches must not wait on a
        // store write.
        let mut accepted = Vec::with_capacity(announced.len());
        for info in announced {
            match self.store.register_external(&descriptor_for(&info, gateway_id)) {
                Ok(_) => accepted.push(info.id),
                Err(StoreError::BuiltinConflict { id }) => {
                    warn!(series = %id, "remote sensor shadows a built-in series, skipped");
                }
                Err(e) => {
                    error!(series = %info.id, error = %e, "failed to register remote sensor");
                }
            }
        }

        let mut sensors = self.sensors.lock();
        for id in accepted {
            sensors.entry(id).or_insert(None);
        }
    }

    /// Handles a data message: refreshes the live cache and persists
    /// readings under their source timestamps.
    ///
    /// Readings for unknown ids are dropped. Null values are neither
    /// cached nor stored; a remote null means "no reading", not a
    /// sampled gap. A failed batch write is logged and dropped, the
    /// stream keeps going.
    pub fn on_data(&self, readings: &[Reading]) {
        let mut batch = Vec::new();
        {
            let mut sensors = self.sensors.lock();
            for reading in readings {
                let Some(slot) = sensors.get_mut(&reading.id) else {
                    debug!(series = %reading.id, "reading for unknown sensor dropped");
                    continue;
                };

                if reading.value.is_some() {
                    *slot = reading.value;
                }

                if let (Some(value), Some(ts)) = (reading.value, reading.ts) {
                    batch.push(Datapoint::new(reading.id.clone(), Some(value), ts));
                }
            }
        }

        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.store.insert_batch(&batch) {
            error!(error = %e, count = batch.len(), "remote reading batch dropped");
        }
    }

    /// Most recent live value for a sensor.
    #[must_use]
    pub fn current_value(&self, id: &str) -> Option<f64> {
        self.sensors.lock().get(id).copied().flatten()
    }

    /// True if `id` names a known remote sensor.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sensors.lock().contains_key(id)
    }

    /// Number of known remote sensors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.lock().len()
    }

    /// True if no sensor has been announced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.lock().is_empty()
    }
}

impl std::fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRegistry")
            .field("sensors", &self.len())
            .finish_non_exhaustive()
    }
}

fn descriptor_for(info: &SensorInfo, gateway_id: &str) -> SeriesDescriptor {
    let locality = if info.is_local { "gateway-local" } else { "lora" };
    let display = if info.name.is_empty() {
        &info.id
    } else {
        &info.name
    };
    SeriesDescriptor {
        id: info.id.clone(),
        name: format!("{} {display}", info.node_id),
        units: info.units.clone(),
        category: "Remote Sensors".to_string(),
        tags: vec![
            "remote".to_string(),
            "sensor".to_string(),
            info.node_id.clone(),
            gateway_id.to_string(),
            locality.to_string(),
        ],
        description: format!(
            "{display} from {} {} on {}",
            if info.is_local { "gateway-local" } else { "remote" },
            info.sensor_class,
            info.node_id
        ),
        gateway: Some(gateway_id.to_string()),
    }
}
