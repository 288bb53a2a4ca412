use anyhow::Context;
use async_nats::HeaderMap;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use common::{
    DomainError, DomainResult, JetStreamPublisher, SensorReading, SensorReadingProducer,
    PAYLOAD_TYPE_HEADER, SENSOR_READING_PAYLOAD_TYPE,
};
use std::sync::Arc;
use tracing::{debug, instrument};

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const PUBLISHED_AT_HEADER: &str = "Published-At";

/// NATS JetStream producer for sensor readings.
///
/// Each reading is published as JSON on `{stream}.{sensor_id}`, so the
/// subject plays the role of the record key.
pub struct JetStreamSensorReadingProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    stream: String,
}

impl JetStreamSensorReadingProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, stream: String) -> Self {
        debug!(stream = %stream, "created sensor reading producer");
        Self { jetstream, stream }
    }

    fn subject_for(&self, sensor_id: &str) -> String {
        format!("{}.{}", self.stream, subject_token(sensor_id))
    }
}

/// Map a sensor id onto a single valid subject token.
///
/// Subject separators, wildcards and whitespace become `_`; an empty id
/// becomes `_`. The message body always keeps the original id.
fn subject_token(sensor_id: &str) -> String {
    if sensor_id.is_empty() {
        return "_".to_string();
    }
    sensor_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

fn reading_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE_HEADER, "application/json");
    headers.insert(PAYLOAD_TYPE_HEADER, SENSOR_READING_PAYLOAD_TYPE);
    let published_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    headers.insert(PUBLISHED_AT_HEADER, published_at.as_str());
    headers
}

#[async_trait]
impl SensorReadingProducer for JetStreamSensorReadingProducer {
    #[instrument(
        name = "publish_reading",
        skip_all,
        fields(sensor_id = %reading.sensor_id, sensor_type = %reading.sensor_type)
    )]
    async fn publish(&self, reading: &SensorReading) -> DomainResult<()> {
        let payload = reading.to_json_bytes()?;
        let subject = self.subject_for(&reading.sensor_id);

        debug!(subject = %subject, size_bytes = payload.len(), "publishing sensor reading");

        self.jetstream
            .publish(subject.clone(), reading_headers(), payload.into())
            .await
            .with_context(|| format!("failed to publish reading on '{}'", subject))
            .map_err(DomainError::BrokerError)?;

        debug!(subject = %subject, "sensor reading acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::{MockJetStreamPublisher, SensorType};

    fn producer(mock: MockJetStreamPublisher) -> JetStreamSensorReadingProducer {
        JetStreamSensorReadingProducer::new(Arc::new(mock), "sensor_readings".to_string())
    }

    #[tokio::test]
    async fn test_publish_keys_by_sensor_id_with_json_body() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .withf(|subject: &String, headers: &HeaderMap, payload: &Bytes| {
                let body: serde_json::Value = serde_json::from_slice(payload).unwrap();
                subject == "sensor_readings.S1"
                    && headers.get(CONTENT_TYPE_HEADER).map(|v| v.as_str())
                        == Some("application/json")
                    && headers.get(PAYLOAD_TYPE_HEADER).map(|v| v.as_str())
                        == Some(SENSOR_READING_PAYLOAD_TYPE)
                    && headers.get(PUBLISHED_AT_HEADER).is_some()
                    && body["warehouseId"] == "WH-001"
                    && body["sensorId"] == "S1"
                    && body["value"] == 42.3
                    && body["type"] == "TEMPERATURE"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let reading = SensorReading::new("WH-001", "S1", 42.3, SensorType::Temperature);

        let result = producer(mock_jetstream).publish(&reading).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_publish_failure_is_broker_error() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("no responders")));

        let reading = SensorReading::new("WH-001", "S1", 1.0, SensorType::Humidity);

        let err = producer(mock_jetstream).publish(&reading).await.unwrap_err();

        assert!(matches!(err, DomainError::BrokerError(_)));
        assert!(err.to_string().contains("sensor_readings.S1"));
    }

    #[tokio::test]
    async fn test_subject_sanitized_but_body_keeps_original_id() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .withf(|subject: &String, _headers: &HeaderMap, payload: &Bytes| {
                let body: serde_json::Value = serde_json::from_slice(payload).unwrap();
                subject == "sensor_readings.rack_1___b" && body["sensorId"] == "rack.1.* b"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let reading = SensorReading::new("WH-001", "rack.1.* b", 1.0, SensorType::Temperature);

        assert!(producer(mock_jetstream).publish(&reading).await.is_ok());
    }

    #[test]
    fn test_subject_token() {
        assert_eq!(subject_token("S1"), "S1");
        assert_eq!(subject_token("a.b>c d"), "a_b_c_d");
        assert_eq!(subject_token(""), "_");
    }
}
