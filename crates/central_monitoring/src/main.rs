mod config;

use central_monitoring::CentralMonitor;
use common::{
    init_telemetry, shutdown_telemetry, NatsClient, TelemetryConfig, TelemetryProviders,
};
use config::ServiceConfig;
use sensor_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(
        &TelemetryConfig::new(config.otel_service_name.clone(), config.log_level.clone())
            .with_otel(config.otel_enabled, config.otel_endpoint.clone()),
    ) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(otel_enabled = config.otel_enabled, "Starting central monitoring service");
    debug!("Configuration: {:?}", config);

    info!("Initializing NATS...");
    let nats_client = match NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    // The monitor may start before any warehouse has created the stream.
    if let Err(e) = nats_client.ensure_stream(&config.stream_settings()).await
    {
        error!("Failed to ensure stream: {:#}", e);
        std::process::exit(1);
    }

    let monitor = match CentralMonitor::new(
        nats_client.create_consumer_client(),
        Arc::new(config.thresholds()),
        config.monitor_config(),
    )
    .await
    {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Failed to create central monitor: {:#}", e);
            std::process::exit(1);
        }
    };

    // Closers run last-registered first: the NATS connection is closed
    // before telemetry is shut down.
    let runner = Runner::new()
        .with_named_process("central_monitor", monitor.into_runner_process())
        .with_named_closer("telemetry", move || async move {
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_named_closer("nats", move || async move { nats_client.close().await })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}
