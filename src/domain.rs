//! ==============================================================================
//! domain.rs - sensor and actuator vocabulary
//! ==============================================================================
//!
//! purpose:
//!     the one canonical place for "what kinds of things exist".
//!     sensor kinds and actuator kinds are closed enums, each knowing its
//!     wire name in the remote database and how it is presented.
//!
//! relationships:
//!     - used by: inbound.rs (decoding documents), history.rs (per-sensor buffers)
//!     - used by: toggle.rs (per-actuator state), session.rs (view rendering)
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// value substituted for a missing or non-numeric reading
pub const MISSING_READING: f64 = 0.0;

// ==============================================================================
// sensor keys
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKey {
    Temperature,
    Humidity,
    WaterLevel,
    Ph,
    Illuminance,
}

impl SensorKey {
    pub const ALL: [SensorKey; 5] = [
        SensorKey::Temperature,
        SensorKey::Humidity,
        SensorKey::WaterLevel,
        SensorKey::Ph,
        SensorKey::Illuminance,
    ];

    /// resolve the `type` field of a sensor document
    ///
    /// accepts the short tags the field devices write ("temp", "illum", ...)
    /// as well as the long names.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "temp" | "temperature" => Some(SensorKey::Temperature),
            "humi" | "hum" | "humidity" => Some(SensorKey::Humidity),
            "water" | "water_level" | "waterlevel" => Some(SensorKey::WaterLevel),
            "ph" => Some(SensorKey::Ph),
            "illum" | "lux" | "illuminance" => Some(SensorKey::Illuminance),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKey::Temperature => "temperature",
            SensorKey::Humidity => "humidity",
            SensorKey::WaterLevel => "water_level",
            SensorKey::Ph => "ph",
            SensorKey::Illuminance => "illuminance",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SensorKey::Temperature => "Temperature",
            SensorKey::Humidity => "Humidity",
            SensorKey::WaterLevel => "Water Level",
            SensorKey::Ph => "pH",
            SensorKey::Illuminance => "Illuminance",
        }
    }

    /// unit suffix, spacing included
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKey::Temperature => "°C",
            SensorKey::Humidity => "%",
            SensorKey::WaterLevel => " cm",
            SensorKey::Ph => " pH",
            SensorKey::Illuminance => " lx",
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        format!("{}{}", trim_float(value), self.unit())
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKey::from_wire(s).ok_or_else(|| UnknownKey(s.to_string()))
    }
}

// ==============================================================================
// actuator keys
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKey {
    HeatLamp,
    Led,
    WaterPump,
    Fan,
}

impl ActuatorKey {
    pub const ALL: [ActuatorKey; 4] = [
        ActuatorKey::HeatLamp,
        ActuatorKey::Led,
        ActuatorKey::WaterPump,
        ActuatorKey::Fan,
    ];

    /// child name under the control document
    pub fn remote_key(&self) -> &'static str {
        match self {
            ActuatorKey::HeatLamp => "HEAT_LAMP",
            ActuatorKey::Led => "LED",
            ActuatorKey::WaterPump => "Water_pump",
            ActuatorKey::Fan => "fan_moter",
        }
    }

    pub fn from_remote(key: &str) -> Option<Self> {
        ActuatorKey::ALL.into_iter().find(|a| a.remote_key() == key)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorKey::HeatLamp => "heat_lamp",
            ActuatorKey::Led => "led",
            ActuatorKey::WaterPump => "water_pump",
            ActuatorKey::Fan => "fan",
        }
    }
}

impl fmt::Display for ActuatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActuatorKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase().replace('-', "_");
        ActuatorKey::ALL
            .into_iter()
            .find(|a| a.as_str() == lowered || a.remote_key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key: {0}")]
pub struct UnknownKey(pub String);

// ==============================================================================
// readings
// ==============================================================================

/// one decoded sample, folded into a history buffer and then dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub sensor: SensorKey,
    pub value: f64,
    /// free text from the device ("Normal", "Warning", "Alert", ...)
    pub status: String,
    /// logical arrival order, stamped by the session
    pub received_at: u64,
}

impl SensorReading {
    pub fn is_alert(&self) -> bool {
        status_is_alert(&self.status)
    }
}

/// "Warning" or "Alert", any case, on any sensor.
///
/// Field devices themselves only flag illuminance on "Warning" and pH on
/// "Alert"; here either word raises the alert for whichever sensor sent it.
pub fn status_is_alert(status: &str) -> bool {
    let s = status.trim();
    s.eq_ignore_ascii_case("warning") || s.eq_ignore_ascii_case("alert")
}

// ==============================================================================
// coercion helpers
// ==============================================================================

/// numeric coercion for document values
///
/// numbers and numeric strings pass through; everything else, including
/// non-finite results, becomes `MISSING_READING`.
pub fn coerce_reading(value: Option<&serde_json::Value>) -> f64 {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(MISSING_READING)
}

/// boolean coercion for control document values, defaulting to off
pub fn coerce_switch(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Some(serde_json::Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1")
        }
        _ => false,
    }
}

// "22.0" -> "22", "22.50" -> "22.5"
fn trim_float(value: f64) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensor_tags_resolve() {
        assert_eq!(SensorKey::from_wire("temp"), Some(SensorKey::Temperature));
        assert_eq!(SensorKey::from_wire("ILLUM"), Some(SensorKey::Illuminance));
        assert_eq!(SensorKey::from_wire("water_level"), Some(SensorKey::WaterLevel));
        assert_eq!(SensorKey::from_wire("co2"), None);
    }

    #[test]
    fn actuator_keys_parse_both_spellings() {
        assert_eq!("heat_lamp".parse::<ActuatorKey>(), Ok(ActuatorKey::HeatLamp));
        assert_eq!("water-pump".parse::<ActuatorKey>(), Ok(ActuatorKey::WaterPump));
        assert_eq!("fan_moter".parse::<ActuatorKey>(), Ok(ActuatorKey::Fan));
        assert!("sprinkler".parse::<ActuatorKey>().is_err());
        assert_eq!(ActuatorKey::from_remote("Water_pump"), Some(ActuatorKey::WaterPump));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(coerce_reading(Some(&json!(22.5))), 22.5);
        assert_eq!(coerce_reading(Some(&json!(" 6.8 "))), 6.8);
        assert_eq!(coerce_reading(Some(&json!("n/a"))), MISSING_READING);
        assert_eq!(coerce_reading(Some(&json!(null))), MISSING_READING);
        assert_eq!(coerce_reading(Some(&json!("NaN"))), MISSING_READING);
        assert_eq!(coerce_reading(None), MISSING_READING);
    }

    #[test]
    fn switch_coercion() {
        assert!(coerce_switch(Some(&json!(true))));
        assert!(coerce_switch(Some(&json!(1))));
        assert!(coerce_switch(Some(&json!("ON"))));
        assert!(!coerce_switch(Some(&json!("off"))));
        assert!(!coerce_switch(Some(&json!({"nested": true}))));
        assert!(!coerce_switch(None));
    }

    #[test]
    fn display_formatting() {
        assert_eq!(SensorKey::Temperature.format_value(22.5), "22.5°C");
        assert_eq!(SensorKey::WaterLevel.format_value(78.0), "78 cm");
        assert_eq!(SensorKey::Illuminance.format_value(850.25), "850.25 lx");
    }

    #[test]
    fn alert_statuses() {
        assert!(status_is_alert("Warning"));
        assert!(status_is_alert("ALERT"));
        assert!(!status_is_alert("Normal"));
    }
}
