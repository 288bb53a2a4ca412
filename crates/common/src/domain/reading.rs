use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header naming the schema of a message body.
pub const PAYLOAD_TYPE_HEADER: &str = "Payload-Type";

/// Value of the `Payload-Type` header carried by every published reading.
pub const SENSOR_READING_PAYLOAD_TYPE: &str = "sensor_reading.v1";

/// Metric measured by a sensor.
///
/// Serialized as the upper-case tags `TEMPERATURE` / `HUMIDITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorType {
    Temperature,
    Humidity,
}

impl SensorType {
    /// Human readable name used in log lines ("Temperature", "Humidity").
    pub fn label(&self) -> &'static str {
        match self {
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Humidity",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single normalized measurement from one sensor.
///
/// The metric is decided by the UDP port the reading arrived on and the
/// warehouse id by the edge process configuration; neither comes from the
/// wire. Readings are never modified after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub warehouse_id: String,
    pub sensor_id: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
}

impl SensorReading {
    pub fn new(
        warehouse_id: impl Into<String>,
        sensor_id: impl Into<String>,
        value: f64,
        sensor_type: SensorType,
    ) -> Self {
        Self {
            warehouse_id: warehouse_id.into(),
            sensor_id: sensor_id.into(),
            value,
            sensor_type,
        }
    }

    /// Encode as the JSON message body published to the transport stream.
    pub fn to_json_bytes(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DomainError::SerializationError(e.to_string()))
    }

    /// Decode a message body produced by [`SensorReading::to_json_bytes`].
    pub fn from_json_slice(payload: &[u8]) -> DomainResult<Self> {
        serde_json::from_slice(payload).map_err(|e| DomainError::DeserializationError(e.to_string()))
    }
}

/// Trait for publishing sensor readings to the transport stream
///
/// Implementations should:
/// - Serialize the reading (JSON)
/// - Publish it keyed by sensor id and wait for the broker acknowledgment
/// - Return an error if the broker rejects or never confirms the message
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorReadingProducer: Send + Sync {
    /// Publish one reading; a single attempt, retries belong to the caller.
    async fn publish(&self, reading: &SensorReading) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_body_uses_wire_field_names_and_tags() {
        let reading = SensorReading::new("WH-001", "S1", 42.3, SensorType::Temperature);

        let body: serde_json::Value =
            serde_json::from_slice(&reading.to_json_bytes().unwrap()).unwrap();

        assert_eq!(body["warehouseId"], "WH-001");
        assert_eq!(body["sensorId"], "S1");
        assert_eq!(body["value"], 42.3);
        assert_eq!(body["type"], "TEMPERATURE");
    }

    #[test]
    fn test_published_reading_decodes_to_identical_fields() {
        let reading = SensorReading::new("WH-7", "hum1", 60.0, SensorType::Humidity);

        let decoded = SensorReading::from_json_slice(&reading.to_json_bytes().unwrap()).unwrap();

        assert_eq!(decoded, reading);
    }

    #[test]
    fn test_decode_rejects_unknown_sensor_type() {
        let payload = br#"{"warehouseId":"WH","sensorId":"S","value":1.0,"type":"PRESSURE"}"#;

        let result = SensorReading::from_json_slice(payload);

        assert!(matches!(result, Err(DomainError::DeserializationError(_))));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let payload = br#"{"warehouseId":"WH","value":1.0,"type":"HUMIDITY"}"#;

        assert!(SensorReading::from_json_slice(payload).is_err());
    }

    #[test]
    fn test_sensor_type_display() {
        assert_eq!(SensorType::Temperature.to_string(), "Temperature");
        assert_eq!(SensorType::Humidity.to_string(), "Humidity");
    }
}
