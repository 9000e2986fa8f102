//! # hearth-proto
//!
//! Wire protocol for the hearth gateway ingestion link: newline-terminated
//! compact JSON objects exchanged over a plain TCP socket. The format is a
//! persisted contract with remote gateway firmware and must stay
//! byte-compatible across releases.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod messages;

pub use error::ProtoError;
pub use messages::{ClientMessage, GatewayMessage, Reading, SensorInfo};
