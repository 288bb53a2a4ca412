mod config;

use common::{
    init_telemetry, shutdown_telemetry, NatsClient, StreamSettings, TelemetryConfig,
    TelemetryProviders,
};
use config::ServiceConfig;
use sensor_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use warehouse::{JetStreamSensorReadingProducer, WarehouseGateway};

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

    info!(
        warehouse_id = %config.id,
        otel_enabled = config.otel_enabled,
        "Starting warehouse service"
    );
    debug!("Configuration: {:?}", config);

    let nats_client = match connect_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    let producer = Arc::new(JetStreamSensorReadingProducer::new(
        nats_client.create_publisher_client(),
        config.nats_stream.clone(),
    ));

    let gateway = match WarehouseGateway::new(config.gateway_config(), producer).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to start warehouse gateway: {:#}", e);
            std::process::exit(1);
        }
    };

    // Closers run last-registered first: the NATS connection is flushed
    // before telemetry is shut down.
    let runner = Runner::new()
        .with_named_process("warehouse_gateway", gateway.into_runner_process())
        .with_named_closer("telemetry", move || async move {
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_named_closer("nats", move || async move { nats_client.close().await })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn connect_nats(config: &ServiceConfig) -> anyhow::Result<NatsClient> {
    info!("Initializing NATS...");
    let client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;
    client
        .ensure_stream(&StreamSettings::new(
            config.nats_stream.clone(),
            config.nats_stream_replicas,
        ))
        .await?;
    Ok(client)
}
