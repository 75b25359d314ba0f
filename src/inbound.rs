//! ==============================================================================
//! inbound.rs - push events from the remote database
//! ==============================================================================
//!
//! purpose:
//!     one event type for everything the subscription can deliver, and the
//!     decoding that turns raw json documents into typed pairs.
//!
//! document shapes:
//!     sensors:  [{"type": "temp", "value": 22.5, "status": "Normal"}, ...]
//!               (or an object of such documents keyed by id)
//!     control:  {"HEAT_LAMP": true, "LED": false, "Water_pump": false, "fan_moter": true}
//!
//! coercion rules:
//!     - missing / non-numeric "value"   -> 0.0
//!     - missing "status"                -> "Unknown"
//!     - unknown sensor "type"           -> skipped
//!     - missing actuator in a full control snapshot -> false
//!
//! ==============================================================================

use crate::domain::{coerce_reading, coerce_switch, ActuatorKey, SensorKey};
use serde_json::{Map, Value};

pub const UNKNOWN_STATUS: &str = "Unknown";

/// A single delivery from the push collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// whole sensors collection
    SensorDocuments(Vec<Value>),
    /// one sensor document changed
    SensorChanged(Value),
    /// whole control document
    ControlDocument(Map<String, Value>),
    /// one child of the control document changed
    ControlChanged { key: String, value: Value },
}

/// Reading before the session stamps its arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    pub sensor: SensorKey,
    pub value: f64,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub readings: Vec<DecodedReading>,
    pub actuators: Vec<(ActuatorKey, bool)>,
}

impl Decoded {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty() && self.actuators.is_empty()
    }
}

impl InboundEvent {
    /// Wrap a sensors node as returned by the REST api (array, object or null).
    pub fn from_sensor_tree(tree: Value) -> Self {
        let docs = match tree {
            Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).collect(),
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        };
        InboundEvent::SensorDocuments(docs)
    }

    /// Wrap a control node; anything that is not an object counts as empty.
    pub fn from_control_tree(tree: Value) -> Self {
        match tree {
            Value::Object(map) => InboundEvent::ControlDocument(map),
            _ => InboundEvent::ControlDocument(Map::new()),
        }
    }

    pub fn decode(&self) -> Decoded {
        let mut out = Decoded::default();
        match self {
            InboundEvent::SensorDocuments(docs) => {
                out.readings = docs.iter().filter_map(decode_sensor_document).collect();
            }
            InboundEvent::SensorChanged(doc) => {
                out.readings.extend(decode_sensor_document(doc));
            }
            InboundEvent::ControlDocument(map) => {
                out.actuators = ActuatorKey::ALL
                    .into_iter()
                    .map(|key| (key, coerce_switch(map.get(key.remote_key()))))
                    .collect();
            }
            InboundEvent::ControlChanged { key, value } => match ActuatorKey::from_remote(key) {
                Some(actuator) => out.actuators.push((actuator, coerce_switch(Some(value)))),
                None => tracing::debug!(key = %key, "ignoring unknown control key"),
            },
        }
        out
    }
}

fn decode_sensor_document(doc: &Value) -> Option<DecodedReading> {
    let tag = doc.get("type").and_then(Value::as_str).unwrap_or_default();
    let Some(sensor) = SensorKey::from_wire(tag) else {
        tracing::debug!(tag, "skipping sensor document of unknown type");
        return None;
    };

    let status = doc
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_STATUS)
        .to_string();

    Some(DecodedReading {
        sensor,
        value: coerce_reading(doc.get("value")),
        status,
    })
}
