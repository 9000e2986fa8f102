//! The periodic sampling loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hearth_store::{now_timestamp, Datapoint, Result, TimeseriesStore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::registry::LocalRegistry;

/// Longest single sleep inside a cycle wait. Keeps shutdown responsive
/// even with an hour-long sampling interval.
const WAIT_SLICE: Duration = Duration::from_millis(500);

/// Samples every registered built-in series on a timer.
///
/// One cycle reads each series once and writes the whole batch with a
/// single shared timestamp. Unreadable series contribute nulls; one bad
/// sensor never blocks the rest of the cycle.
pub struct Collector {
    registry: Arc<LocalRegistry>,
    store: Arc<TimeseriesStore>,
    interval_ms: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl Collector {
    /// Creates a collector. Nothing runs until [`Collector::start`].
    #[must_use]
    pub fn new(
        registry: Arc<LocalRegistry>,
        store: Arc<TimeseriesStore>,
        interval_ms: u64,
    ) -> Self {
        Self {
            registry,
            store,
            interval_ms: Arc::new(AtomicU64::new(interval_ms)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current sampling interval in milliseconds.
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    /// Updates the sampling interval. Takes effect on the next cycle.
    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.interval_ms.store(interval_ms, Ordering::Relaxed);
        info!(interval_ms, "sampling interval updated");
    }

    /// Reads every series and stores the batch under one timestamp.
    /// Unreadable series are stored as nulls.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch write fails; nothing is stored then.
    pub fn collect_cycle(&self) -> Result<()> {
        let timestamp = now_timestamp();
        let batch: Vec<Datapoint> = self
            .registry
            .iter()
            .map(|series| Datapoint::new(series.id(), series.read(), timestamp))
            .collect();

        self.store.insert_batch(&batch)?;
        debug!(count = batch.len(), "collection cycle stored");
        Ok(())
    }

    /// Reads every series immediately and stores only the readable ones,
    /// under one shared timestamp. Returns the number of samples written.
    ///
    /// Unlike the timer path this skips nulls: a manual collection is a
    /// "give me fresh values" request, not a gap marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch write fails.
    pub fn collect_now(&self) -> Result<usize> {
        let timestamp = now_timestamp();
        let batch: Vec<Datapoint> = self
            .registry
            .iter()
            .filter_map(|series| {
                series
                    .read()
                    .map(|value| Datapoint::new(series.id(), Some(value), timestamp))
            })
            .collect();

        self.store.insert_batch(&batch)?;
        info!(count = batch.len(), "manual collection stored");
        Ok(batch.len())
    }

    /// Starts the timer loop on the tokio runtime.
    ///
    /// The loop waits one interval, collects, and repeats until
    /// [`Collector::stop`]. The interval cell is re-read at the top of
    /// every wait, and waits are sliced so a stop is observed promptly.
    pub fn start(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let interval_ms = Arc::clone(&self.interval_ms);
        let running = Arc::clone(&self.running);

        info!(
            series = registry.len(),
            interval_ms = interval_ms.load(Ordering::Relaxed),
            "collector started"
        );

        tokio::spawn(async move {
            let worker = Self {
                registry,
                store,
                interval_ms: Arc::clone(&interval_ms),
                running: Arc::clone(&running),
            };

            while running.load(Ordering::SeqCst) {
                let target = Duration::from_millis(interval_ms.load(Ordering::Relaxed));
                let mut waited = Duration::ZERO;
                while running.load(Ordering::SeqCst) && waited < target {
                    let step = (target - waited).min(WAIT_SLICE);
                    sleep(step).await;
                    waited += step;
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(e) = worker.collect_cycle() {
                    error!(error = %e, "collection cycle failed");
                }
            }
            info!("collector stopped");
        })
    }

    /// Requests the timer loop to stop. The loop exits within one wait
    /// slice; in-flight cycles complete.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// True while the timer loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("interval_ms", &self.interval_ms())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
