use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};

/// Logging and tracing settings shared by both services.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    /// Export spans and logs over OTLP in addition to stdout.
    pub otel_enabled: bool,
    pub otel_endpoint: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: log_level.into(),
            ..Default::default()
        }
    }

    pub fn with_otel(mut self, enabled: bool, endpoint: impl Into<String>) -> Self {
        self.otel_enabled = enabled;
        self.otel_endpoint = endpoint.into();
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "sensor-service".to_string(),
            log_level: "info".to_string(),
            otel_enabled: false,
            otel_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

/// Providers kept alive until shutdown so pending exports get flushed.
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}
