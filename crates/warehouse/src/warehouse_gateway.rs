use crate::domain::{LineSource, ReadingPublisher, ReadingPublisherConfig};
use crate::udp::{UdpListener, DEFAULT_BUFFER_CAPACITY};
use anyhow::Context;
use common::{SensorReadingProducer, SensorType};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct WarehouseGatewayConfig {
    pub warehouse_id: String,
    pub bind_host: IpAddr,
    pub temperature_port: u16,
    pub humidity_port: u16,
    pub listener_buffer_capacity: usize,
    pub publish_max_attempts: u32,
    pub publish_retry_delay: Duration,
}

impl WarehouseGatewayConfig {
    pub fn new(warehouse_id: impl Into<String>, temperature_port: u16, humidity_port: u16) -> Self {
        Self {
            warehouse_id: warehouse_id.into(),
            bind_host: IpAddr::from([0, 0, 0, 0]),
            temperature_port,
            humidity_port,
            listener_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            publish_max_attempts: 3,
            publish_retry_delay: Duration::from_millis(200),
        }
    }
}

/// Edge side of the pipeline: one UDP listener per metric feeding a single
/// reading publisher.
pub struct WarehouseGateway {
    warehouse_id: String,
    listeners: Vec<UdpListener>,
    sources: Vec<LineSource>,
    publisher: ReadingPublisher,
}

impl WarehouseGateway {
    /// Bind both listeners.
    ///
    /// Fails if either port cannot be bound; nothing is left running in that
    /// case.
    pub async fn new(
        config: WarehouseGatewayConfig,
        producer: Arc<dyn SensorReadingProducer>,
    ) -> anyhow::Result<Self> {
        info!(warehouse_id = %config.warehouse_id, "Initializing warehouse gateway");

        let ports = [
            (SensorType::Temperature, config.temperature_port),
            (SensorType::Humidity, config.humidity_port),
        ];

        let mut listeners: Vec<UdpListener> = Vec::with_capacity(ports.len());
        let mut sources = Vec::with_capacity(ports.len());
        for (sensor_type, port) in ports {
            let mut listener = UdpListener::new(
                sensor_type,
                SocketAddr::new(config.bind_host, port),
                config.listener_buffer_capacity,
            );
            // Subscribe before binding so no datagram is missed.
            let receiver = listener.subscribe()?;
            if let Err(e) = listener.start().await {
                for started in listeners.iter_mut() {
                    started.shutdown().await;
                }
                return Err(e).with_context(|| format!("failed to start {} listener", sensor_type));
            }
            sources.push(LineSource::new(sensor_type, receiver));
            listeners.push(listener);
        }

        let publisher = ReadingPublisher::new(
            producer,
            ReadingPublisherConfig {
                warehouse_id: config.warehouse_id.clone(),
                max_attempts: config.publish_max_attempts,
                retry_delay: config.publish_retry_delay,
            },
        );

        Ok(Self {
            warehouse_id: config.warehouse_id,
            listeners,
            sources,
            publisher,
        })
    }

    /// Bound address of each listener.
    pub fn local_addrs(&self) -> Vec<(SensorType, SocketAddr)> {
        self.listeners
            .iter()
            .filter_map(|listener| {
                listener
                    .local_addr()
                    .map(|addr| (listener.sensor_type(), addr))
            })
            .collect()
    }

    /// Publish until `ctx` is cancelled, then stop the listeners and drain.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let Self {
            warehouse_id,
            mut listeners,
            sources,
            publisher,
        } = self;

        info!("Warehouse service started. Warehouse ID: {}", warehouse_id);

        let stop_listeners = async {
            ctx.cancelled().await;
            info!(warehouse_id = %warehouse_id, "stopping UDP listeners");
            for listener in listeners.iter_mut() {
                listener.shutdown().await;
            }
        };

        tokio::join!(publisher.run(sources), stop_listeners);

        info!(warehouse_id = %warehouse_id, "Warehouse service stopped");
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
