//! Embedded time-series storage for hearth.
//!
//! `hearth-store` persists timestamped numeric samples into a compact SQLite
//! database and serves the read side of the hub: range queries with optional
//! shape-preserving downsampling, latest-N queries, and cheap min/max/oldest
//! summaries. It also owns the metadata registry for dynamically discovered
//! ("external") series.
//!
//! Concurrency discipline: all writes funnel through one exclusive writer
//! connection; reads open short-lived read-only connections and rely on WAL
//! journaling for a consistent snapshot alongside an in-flight writer.
//!
//! # Example
//!
//! ```no_run
//! use hearth_store::{Datapoint, TimeseriesStore};
//!
//! let store = TimeseriesStore::open("timeseries.db").unwrap();
//! store.insert("cpu_temperature", Some(131.2), None).unwrap();
//!
//! let samples = store
//!     .query_range("cpu_temperature", 0.0, f64::MAX, Some(500))
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod downsample;
pub mod error;
pub mod storage;
pub mod types;

pub use downsample::lttb;
pub use error::{Result, StoreError};
pub use storage::TimeseriesStore;
pub use types::{
    coerce_value, now_timestamp, Datapoint, RangeSummary, Sample, SeriesDescriptor, SeriesSummary,
};
