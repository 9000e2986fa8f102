//! Registry of built-in series.

use std::collections::HashMap;
use std::sync::Arc;

use hearth_store::SeriesDescriptor;
use tracing::warn;

use crate::series::LocalSeries;

/// Holds every built-in series, registered explicitly at startup.
///
/// Registration order is preserved; it determines listing order and the
/// order series are read each collection cycle.
#[derive(Default)]
pub struct LocalRegistry {
    order: Vec<Arc<dyn LocalSeries>>,
    by_id: HashMap<String, usize>,
}

impl LocalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a series. A second registration under the same id is
    /// logged and ignored; the first one wins.
    pub fn register(&mut self, series: Arc<dyn LocalSeries>) {
        let id = series.id().to_string();
        if self.by_id.contains_key(&id) {
            warn!(series = %id, "duplicate built-in series registration ignored");
            return;
        }
        self.by_id.insert(id, self.order.len());
        self.order.push(series);
    }

    /// Looks up a series by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn LocalSeries>> {
        self.by_id.get(id).map(|&idx| &self.order[idx])
    }

    /// True if `id` names a registered series.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Ids of every registered series, in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.order.iter().map(|s| s.id().to_string()).collect()
    }

    /// Descriptors for every registered series, in registration order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<SeriesDescriptor> {
        self.order.iter().map(|s| s.descriptor()).collect()
    }

    /// Iterates registered series in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LocalSeries>> {
        self.order.iter()
    }

    /// Number of registered series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for LocalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRegistry")
            .field("series", &self.ids())
            .finish()
    }
}
