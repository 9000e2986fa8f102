//! The hearth hub: local collection, gateway ingestion, and the query
//! surface, assembled over one shared time-series store.
//!
//! The [`Hub`] is the composition root. It opens the store, registers the
//! built-in host series (reserving their ids against external
//! registration), builds one [`hearth_gateway::GatewayConnection`] per
//! configured gateway, and exposes queries and ingestion to callers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hub;

pub use config::{GatewayEndpoint, HubConfig};
pub use error::{HubError, Result};
pub use hub::{Hub, IngestSample};
