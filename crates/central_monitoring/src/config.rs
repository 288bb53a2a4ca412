use central_monitoring::{CentralMonitorConfig, TrustedPayloadTypes};
use common::{StreamSettings, ThresholdConfig, SENSOR_READING_PAYLOAD_TYPE};
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream readings are consumed from
    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    /// Replica count of the stream; must match the warehouse setting
    #[serde(default = "default_nats_stream_replicas")]
    pub nats_stream_replicas: usize,

    /// Durable consumer name shared by all monitor instances
    #[serde(default = "default_consumer_group_id")]
    pub consumer_group_id: String,

    /// Comma-separated `Payload-Type` values accepted for decoding; `*` accepts any
    #[serde(default = "default_trusted_payload_types")]
    pub trusted_payload_types: String,

    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Timeout for connecting to NATS at startup
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Thresholds
    #[serde(default = "default_temperature_threshold")]
    pub temperature_threshold: f64,

    #[serde(default = "default_humidity_threshold")]
    pub humidity_threshold: f64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_stream() -> String {
    "sensor_readings".to_string()
}

fn default_nats_stream_replicas() -> usize {
    1
}

fn default_consumer_group_id() -> String {
    "central-monitoring".to_string()
}

fn default_trusted_payload_types() -> String {
    SENSOR_READING_PAYLOAD_TYPE.to_string()
}

fn default_nats_batch_size() -> usize {
    30
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    5
}

fn default_temperature_threshold() -> f64 {
    35.0
}

fn default_humidity_threshold() -> f64 {
    50.0
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "central-monitoring".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("MONITORING"))
            .build()?
            .try_deserialize()
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings::new(self.nats_stream.clone(), self.nats_stream_replicas)
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig::new(self.temperature_threshold, self.humidity_threshold)
    }

    pub fn monitor_config(&self) -> CentralMonitorConfig {
        CentralMonitorConfig {
            stream: self.nats_stream.clone(),
            consumer_group_id: self.consumer_group_id.clone(),
            trusted_payload_types: TrustedPayloadTypes::parse(&self.trusted_payload_types),
            batch_size: self.nats_batch_size,
            batch_wait: Duration::from_secs(self.nats_batch_wait_secs),
        }
    }
}
