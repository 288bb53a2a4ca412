#![cfg(feature = "integration-tests")]

use anyhow::Result;
use async_nats::jetstream::{self, consumer::pull};
use central_monitoring::{CentralMonitor, CentralMonitorConfig, TrustedPayloadTypes};
use common::{
    EventCapture, NatsClient, SensorType, StreamSettings, ThresholdConfig,
    SENSOR_READING_PAYLOAD_TYPE,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use warehouse::{JetStreamSensorReadingProducer, WarehouseGateway, WarehouseGatewayConfig};

const STREAM: &str = "sensor_readings";
const MONITOR_GROUP: &str = "central-monitoring";

/// NATS image with JetStream enabled
#[derive(Debug, Clone)]
struct NatsWithJetStream {
    ports: Vec<ContainerPort>,
}

impl Default for NatsWithJetStream {
    fn default() -> Self {
        Self {
            ports: vec![ContainerPort::Tcp(4222)],
        }
    }
}

impl Image for NatsWithJetStream {
    fn name(&self) -> &str {
        "nats"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::seconds(3)]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        vec!["--js"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &self.ports
    }
}

async fn start_nats() -> Result<(ContainerAsync<NatsWithJetStream>, String)> {
    let nats = NatsWithJetStream::default().start().await?;
    let host = nats.get_host().await?;
    let port = nats.get_host_port_ipv4(4222).await?;
    Ok((nats, format!("nats://{}:{}", host, port)))
}

async fn eventually<F, Fut>(mut condition: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    for _ in 0..100 {
        if condition().await? {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(false)
}

fn alarm_lines(capture: &EventCapture) -> Vec<String> {
    let mut alarms: Vec<String> = capture
        .messages_at(Level::ERROR)
        .into_iter()
        .filter(|message| message.starts_with("ALARM:"))
        .collect();
    alarms.sort();
    alarms
}

#[tokio::test]
async fn test_udp_to_alarm_pipeline() -> Result<()> {
    // Spawned tasks log through the global subscriber.
    let capture = EventCapture::new();
    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(capture.clone()))?;

    let (_nats, nats_url) = start_nats().await?;
    let thresholds = ThresholdConfig::new(40.0, 60.0);

    // Warehouse edge process
    let edge_client = NatsClient::connect(&nats_url, Duration::from_secs(10)).await?;
    edge_client
        .ensure_stream(&StreamSettings::new(STREAM, 1))
        .await?;
    let producer = Arc::new(JetStreamSensorReadingProducer::new(
        edge_client.create_publisher_client(),
        STREAM.to_string(),
    ));
    let gateway = WarehouseGateway::new(
        WarehouseGatewayConfig {
            bind_host: IpAddr::from([127, 0, 0, 1]),
            ..WarehouseGatewayConfig::new("WH-001", 0, 0)
        },
        producer,
    )
    .await?;
    let addrs = gateway.local_addrs();
    let addr_of = |sensor_type: SensorType| {
        addrs
            .iter()
            .find(|(t, _)| *t == sensor_type)
            .map(|(_, addr)| *addr)
            .unwrap()
    };

    // Central monitoring process
    let central_client = NatsClient::connect(&nats_url, Duration::from_secs(10)).await?;
    let monitor = CentralMonitor::new(
        central_client.create_consumer_client(),
        Arc::new(thresholds),
        CentralMonitorConfig {
            stream: STREAM.to_string(),
            consumer_group_id: MONITOR_GROUP.to_string(),
            trusted_payload_types: TrustedPayloadTypes::parse(SENSOR_READING_PAYLOAD_TYPE),
            batch_size: 10,
            batch_wait: Duration::from_millis(500),
        },
    )
    .await?;

    let ctx = CancellationToken::new();
    let edge = tokio::spawn(gateway.run(ctx.clone()));
    let central = tokio::spawn(monitor.run(ctx.clone()));

    let sender = UdpSocket::bind("127.0.0.1:0").await?;
    let temperature = addr_of(SensorType::Temperature);
    let humidity = addr_of(SensorType::Humidity);
    sender.send_to(b"sensorId=S1;value=42.3", temperature).await?;
    sender.send_to(b"sensorId=S2;value=39.9", temperature).await?;
    sender.send_to(b"garbage", humidity).await?;
    sender.send_to(b"sensorId=H1;value=65.0", humidity).await?;

    assert!(
        eventually(|| {
            let capture = capture.clone();
            async move { Ok::<_, anyhow::Error>(alarm_lines(&capture).len() >= 2) }
        })
        .await?,
        "monitor never raised the expected alarms"
    );

    // Every record delivered to the monitor ends up acknowledged.
    let inspector = jetstream::new(async_nats::connect(&nats_url).await?);
    assert!(
        eventually(|| {
            let inspector = inspector.clone();
            async move {
                let mut consumer = inspector
                    .get_stream(STREAM)
                    .await?
                    .get_consumer::<pull::Config>(MONITOR_GROUP)
                    .await
                    .map_err(anyhow::Error::from_boxed)?;
                let info = consumer.info().await?;
                Ok::<_, anyhow::Error>(
                    info.num_pending == 0
                        && info.num_ack_pending == 0
                        && info.delivered.stream_sequence >= 3,
                )
            }
        })
        .await?,
        "monitor left records unacknowledged"
    );

    ctx.cancel();
    edge.await??;
    central.await??;
    edge_client.close().await?;
    central_client.close().await?;

    let started = capture.messages_at(Level::INFO);
    assert!(started.contains(&"Warehouse service started. Warehouse ID: WH-001".to_string()));
    assert!(started.contains(&"Central monitoring service started".to_string()));

    // Exactly one line per exceeding reading; 39.9 and the garbage line stay quiet.
    assert_eq!(
        alarm_lines(&capture),
        vec![
            "ALARM: Humidity threshold exceeded in warehouse WH-001! Current: 65.0, Threshold: 60.0"
                .to_string(),
            "ALARM: Temperature threshold exceeded in warehouse WH-001! Current: 42.3, Threshold: 40.0"
                .to_string(),
        ]
    );

    Ok(())
}
