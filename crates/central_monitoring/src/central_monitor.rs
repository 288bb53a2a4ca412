use crate::domain::ThresholdEvaluator;
use crate::nats::{SensorReadingService, TrustedPayloadTypes};
use common::{
    ConsumeLoggingLayer, ConsumeLoggingService, JetStreamConsumer, ThresholdConfig,
    TowerConsumer, TowerConsumerConfig,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CentralMonitorConfig {
    pub stream: String,
    /// Durable consumer name; monitors sharing it split the stream.
    pub consumer_group_id: String,
    pub trusted_payload_types: TrustedPayloadTypes,
    pub batch_size: usize,
    pub batch_wait: Duration,
}

type MonitorService = ConsumeLoggingService<SensorReadingService>;

/// Central side of the pipeline: consumes readings from the stream and
/// evaluates each against the configured thresholds.
pub struct CentralMonitor {
    consumer: TowerConsumer<MonitorService>,
}

impl CentralMonitor {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        thresholds: Arc<ThresholdConfig>,
        config: CentralMonitorConfig,
    ) -> anyhow::Result<Self> {
        info!(
            stream = %config.stream,
            consumer_group_id = %config.consumer_group_id,
            temperature_threshold = thresholds.temperature_threshold,
            humidity_threshold = thresholds.humidity_threshold,
            "Initializing central monitor"
        );

        let evaluator = Arc::new(ThresholdEvaluator::new(thresholds));
        let service = ServiceBuilder::new()
            .layer(ConsumeLoggingLayer::new())
            .service(SensorReadingService::new(
                evaluator,
                config.trusted_payload_types,
            ));

        let consumer = TowerConsumer::new(
            jetstream,
            TowerConsumerConfig::for_stream(
                &config.stream,
                &config.consumer_group_id,
                config.batch_size,
                config.batch_wait,
            ),
            service,
        )
        .await?;

        Ok(Self { consumer })
    }

    /// Consume until `ctx` is cancelled.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!("Central monitoring service started");
        self.consumer.run(ctx).await?;
        info!("Central monitoring service stopped");
        Ok(())
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
           + Send
           + 'static {
        move |ctx| Box::pin(self.run(ctx))
    }
}
