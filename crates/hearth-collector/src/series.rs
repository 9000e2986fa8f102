//! The built-in series trait.

use hearth_store::SeriesDescriptor;

/// A code-defined series whose current value can be read on demand.
///
/// Implementations must be cheap to call and must never block for long:
/// the collector reads every registered series in one pass per cycle.
/// A source that cannot be read right now returns `None`; the caller
/// decides whether that becomes a stored null (timer path) or is skipped
/// (manual collection).
pub trait LocalSeries: Send + Sync {
    /// Globally unique series id.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Units of measurement.
    fn units(&self) -> &str;

    /// Category for grouping in the UI.
    fn category(&self) -> &str {
        "Host"
    }

    /// Searchable tags.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Reads the current value, or `None` if the source is unavailable.
    fn read(&self) -> Option<f64>;

    /// Metadata for this series, in the same shape external series use.
    fn descriptor(&self) -> SeriesDescriptor {
        SeriesDescriptor {
            id: self.id().to_string(),
            name: self.name().to_string(),
            units: self.units().to_string(),
            category: self.category().to_string(),
            tags: self.tags(),
            description: self.description().to_string(),
            gateway: None,
        }
    }
}
