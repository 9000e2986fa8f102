//! Gateway ingestion: auto-reconnecting TCP clients for remote sensor
//! gateways.
//!
//! A gateway bridges remote sensor nodes (LoRa or gateway-local) onto the
//! network and speaks a line-delimited JSON protocol (`hearth-proto`).
//! This crate owns the client side: [`GatewayConnection`] keeps one link
//! alive per gateway, and [`RemoteRegistry`] turns what the gateways
//! announce and stream into registered series, live values, and stored
//! samples.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod registry;
pub mod state;

pub use client::GatewayConnection;
pub use registry::RemoteRegistry;
pub use state::{AtomicLinkState, LinkState};
