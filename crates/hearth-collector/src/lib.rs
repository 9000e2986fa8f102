//! Built-in series and the local sampling loop.
//!
//! A built-in series is a [`LocalSeries`] implementation registered in code
//! at startup; its current value is read on demand and sampled on a timer.
//! An unreadable source is not an error: `read` returns `None` and the
//! timer path stores a null so gaps stay visible in history.
//!
//! The [`Collector`] drives the loop. Its interval lives in an atomic cell
//! that is re-read every cycle, so a runtime interval change takes effect
//! on the next tick without restarting anything.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collector;
pub mod host;
pub mod registry;
pub mod series;

pub use collector::Collector;
pub use host::{register_host_series, HostSampler};
pub use registry::LocalRegistry;
pub use series::LocalSeries;
