use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use warehouse::WarehouseGatewayConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Identifier stamped on every reading published by this process
    #[serde(default = "default_id")]
    pub id: String,

    /// UDP port receiving temperature datagrams
    #[serde(default = "default_temperature_port")]
    pub temperature_port: u16,

    /// UDP port receiving humidity datagrams
    #[serde(default = "default_humidity_port")]
    pub humidity_port: u16,

    /// Address both UDP listeners bind to
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    /// Per-listener fan-out buffer, in lines
    #[serde(default = "default_listener_buffer_capacity")]
    pub listener_buffer_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream readings are published to
    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    /// Replica count used when the stream has to be created
    #[serde(default = "default_nats_stream_replicas")]
    pub nats_stream_replicas: usize,

    /// Publish attempts per reading, including the first
    #[serde(default = "default_publish_max_attempts")]
    pub publish_max_attempts: u32,

    #[serde(default = "default_publish_retry_delay_ms")]
    pub publish_retry_delay_ms: u64,

    /// Timeout for connecting to NATS at startup
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_id() -> String {
    "WH-001".to_string()
}

fn default_temperature_port() -> u16 {
    3344
}

fn default_humidity_port() -> u16 {
    3355
}

fn default_bind_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_listener_buffer_capacity() -> usize {
    1024
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

fn default_publish_max_attempts() -> u32 {
    3
}

fn default_publish_retry_delay_ms() -> u64 {
    200
}

fn default_startup_timeout_secs() -> u64 {
    5
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "warehouse-service".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("WAREHOUSE"))
            .build()?
            .try_deserialize()
    }

    pub fn gateway_config(&self) -> WarehouseGatewayConfig {
        WarehouseGatewayConfig {
            warehouse_id: self.id.clone(),
            bind_host: self.bind_host,
            temperature_port: self.temperature_port,
            humidity_port: self.humidity_port,
            listener_buffer_capacity: self.listener_buffer_capacity,
            publish_max_attempts: self.publish_max_attempts,
            publish_retry_delay: Duration::from_millis(self.publish_retry_delay_ms),
        }
    }
}
