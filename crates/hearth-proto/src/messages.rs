//! Protocol message definitions.
//!
//! Each message is one JSON object per line, tagged by a `type` field.
//! The client drives the session: `discover` then `subscribe`; the gateway
//! answers with a single `sensors` reply followed by a stream of `data`
//! messages. Unknown `type` values decode to [`GatewayMessage::Unknown`]
//! so newer gateway firmware never breaks older hubs.

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, Result};

/// Messages sent from the hub to a gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the gateway to report its sensor set.
    Discover,
    /// Ask the gateway to start streaming readings.
    Subscribe,
}

/// Messages sent from a gateway to the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Discovery reply listing every sensor the gateway can stream.
    Sensors {
        /// Identifier of the replying gateway instance.
        gateway_id: String,
        /// The sensors available through this gateway.
        sensors: Vec<SensorInfo>,
    },
    /// A batch of sensor readings. An empty batch is a heartbeat.
    Data {
        /// Readings in this batch.
        readings: Vec<Reading>,
    },
    /// Any message type this build does not understand. Ignored, never an
    /// error, so remote firmware can add message types freely.
    #[serde(other)]
    Unknown,
}

/// Metadata for one sensor reported during discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorInfo {
    /// Globally unique sensor id (e.g. `patio_bme280_temperature`).
    pub id: String,
    /// The node that owns the sensor (e.g. `patio`).
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Display name of the reading (e.g. `Temperature`). Empty means
    /// "use the id".
    #[serde(default)]
    pub name: String,
    /// Units of measurement (e.g. `°F`).
    #[serde(default)]
    pub units: String,
    /// Name of the sensor hardware class (e.g. `BME280`).
    #[serde(default = "default_sensor_class")]
    pub sensor_class: String,
    /// True if the sensor is wired to the gateway itself rather than
    /// reached over a radio link.
    #[serde(default)]
    pub is_local: bool,
}

fn default_node_id() -> String {
    "unknown".to_string()
}

fn default_sensor_class() -> String {
    "Unknown".to_string()
}

/// One sensor reading inside a `data` message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Sensor id this reading belongs to.
    pub id: String,
    /// The value, or `None` if the sensor could not be read.
    #[serde(default)]
    pub value: Option<f64>,
    /// Source timestamp in epoch seconds, taken when the reading was
    /// sampled on the remote node (not when it was forwarded).
    #[serde(default)]
    pub ts: Option<f64>,
}

impl ClientMessage {
    /// Serialize to a compact JSON line (without the trailing newline).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtoError::Serialize)
    }
}

impl GatewayMessage {
    /// Serialize to a compact JSON line (without the trailing newline).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtoError::Serialize)
    }

    /// Parse a received line.
    pub fn from_json(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim()).map_err(ProtoError::Parse)
    }
}
