//! Core types for the time-series store.
//!
//! - [`Sample`]: one stored `(timestamp, value)` pair
//! - [`Datapoint`]: one pending write, addressed by series id
//! - [`SeriesDescriptor`]: metadata for a series
//! - [`RangeSummary`] / [`SeriesSummary`]: aggregate query results

use serde::{Deserialize, Serialize};

/// Returns the current wall-clock time as epoch seconds.
#[must_use]
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A single stored sample.
///
/// `value` of `None` is a stored null, distinct from the absence of a row:
/// it records that the series was sampled but the source had nothing to
/// report at that instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Epoch seconds.
    pub timestamp: f64,
    /// The measured value, or `None` for a stored null.
    pub value: Option<f64>,
}

impl Sample {
    /// Creates a new sample.
    #[must_use]
    pub const fn new(timestamp: f64, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

/// One pending write for [`crate::TimeseriesStore::insert_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    /// Target series id.
    pub series_id: String,
    /// The value to store (`None` stores a null).
    pub value: Option<f64>,
    /// Epoch seconds; `None` means "now" at insert time.
    pub timestamp: Option<f64>,
}

impl Datapoint {
    /// Creates a datapoint with an explicit timestamp.
    #[must_use]
    pub fn new(series_id: impl Into<String>, value: Option<f64>, timestamp: f64) -> Self {
        Self {
            series_id: series_id.into(),
            value,
            timestamp: Some(timestamp),
        }
    }
}

/// Metadata describing a series.
///
/// Built-in series materialize this from code; external series persist it
/// in the metadata table and update it on every fully-described ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    /// Globally unique, immutable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Units of measurement (e.g. `°F`, `%`).
    #[serde(default)]
    pub units: String,
    /// Category for grouping in the UI.
    #[serde(default = "default_category")]
    pub category: String,
    /// Searchable tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Gateway id this series arrives through, if any.
    #[serde(default)]
    pub gateway: Option<String>,
}

fn default_category() -> String {
    "External".to_string()
}

/// Min/max/oldest aggregate over one series in a time range.
///
/// `oldest` is the value of the chronologically first non-null row in the
/// range. Callers use it to compute a trend delta; it is not interpolated
/// to the range boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    /// Minimum non-null value in range.
    pub min: f64,
    /// Maximum non-null value in range.
    pub max: f64,
    /// Value of the earliest non-null row in range.
    pub oldest: f64,
}

/// Per-series row counts for the maintenance surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    /// Series id.
    pub id: String,
    /// Number of stored rows.
    pub count: u64,
    /// Timestamp of the oldest row.
    pub oldest: f64,
    /// Timestamp of the newest row.
    pub newest: f64,
}

/// Coerces an arbitrary JSON value into a storable sample value.
///
/// Numbers pass through, numeric strings are parsed, booleans map to
/// 1.0/0.0. Anything unconvertible becomes `None` (a stored null) rather
/// than an error; bad values never fail an insert.
#[must_use]
pub fn coerce_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod coerce_tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn numbers_pass_through() {
            assert_eq!(coerce_value(&json!(72.5)), Some(72.5));
            assert_eq!(coerce_value(&json!(-3)), Some(-3.0));
        }

        #[test]
        fn numeric_strings_parse() {
            assert_eq!(coerce_value(&json!("42.25")), Some(42.25));
            assert_eq!(coerce_value(&json!(" 7 ")), Some(7.0));
        }

        #[test]
        fn booleans_map_to_unit_values() {
            assert_eq!(coerce_value(&json!(true)), Some(1.0));
            assert_eq!(coerce_value(&json!(false)), Some(0.0));
        }

        #[test]
        fn unconvertible_values_become_null() {
            assert_eq!(coerce_value(&json!(null)), None);
            assert_eq!(coerce_value(&json!("not a number")), None);
            assert_eq!(coerce_value(&json!(["nested"])), None);
            assert_eq!(coerce_value(&json!({"k": 1})), None);
        }
    }

    mod descriptor_tests {
        use super::*;

        #[test]
        fn descriptor_defaults_fill_in() {
            let desc: SeriesDescriptor =
                serde_json::from_str(r#"{"id":"garage_temp","name":"Garage Temperature"}"#)
                    .unwrap();

            assert_eq!(desc.units, "");
            assert_eq!(desc.category, "External");
            assert!(desc.tags.is_empty());
            assert_eq!(desc.gateway, None);
        }
    }

    #[test]
    fn now_timestamp_is_reasonable() {
        let ts = now_timestamp();
        // After 2020, before 2100.
        assert!(ts > 1_577_836_800.0);
        assert!(ts < 4_102_444_800.0);
    }
}
