#![cfg(feature = "integration-tests")]

use anyhow::Result;
use async_nats::jetstream::{self, consumer::pull};
use common::{
    NatsClient, SensorReading, SensorType, StreamSettings, PAYLOAD_TYPE_HEADER,
    SENSOR_READING_PAYLOAD_TYPE,
};
use futures::StreamExt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use warehouse::{JetStreamSensorReadingProducer, WarehouseGateway, WarehouseGatewayConfig};

const STREAM: &str = "sensor_readings";

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

async fn stored_messages(jetstream: &jetstream::Context) -> Result<u64> {
    let mut stream = jetstream.get_stream(STREAM).await?;
    Ok(stream.info().await?.state.messages)
}

#[tokio::test]
async fn test_udp_datagrams_are_published_keyed_by_sensor_id() -> Result<()> {
    let (_nats, nats_url) = start_nats().await?;

    let client = NatsClient::connect(&nats_url, Duration::from_secs(10)).await?;
    client.ensure_stream(&StreamSettings::new(STREAM, 1)).await?;

    let producer = Arc::new(JetStreamSensorReadingProducer::new(
        client.create_publisher_client(),
        STREAM.to_string(),
    ));
    let config = WarehouseGatewayConfig {
        bind_host: IpAddr::from([127, 0, 0, 1]),
        ..WarehouseGatewayConfig::new("WH-IT", 0, 0)
    };
    let gateway = WarehouseGateway::new(config, producer).await?;
    let addrs = gateway.local_addrs();
    let addr_of = |sensor_type: SensorType| {
        addrs
            .iter()
            .find(|(t, _)| *t == sensor_type)
            .map(|(_, addr)| *addr)
            .unwrap()
    };

    let ctx = CancellationToken::new();
    let handle = tokio::spawn(gateway.run(ctx.clone()));

    let sender = UdpSocket::bind("127.0.0.1:0").await?;
    sender
        .send_to(b"sensorId=S1;value=42.3", addr_of(SensorType::Temperature))
        .await?;
    sender
        .send_to(b"garbage", addr_of(SensorType::Temperature))
        .await?;
    sender
        .send_to(b"sensorId=H1;value=65.0", addr_of(SensorType::Humidity))
        .await?;

    let reader = jetstream::new(async_nats::connect(&nats_url).await?);
    for _ in 0..50 {
        if stored_messages(&reader).await? >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    ctx.cancel();
    handle.await??;
    client.close().await?;

    assert_eq!(stored_messages(&reader).await?, 2);

    let consumer = reader
        .get_stream(STREAM)
        .await?
        .create_consumer(pull::Config::default())
        .await?;
    let mut batch = consumer
        .fetch()
        .max_messages(10)
        .expires(Duration::from_secs(2))
        .messages()
        .await?;

    let mut received = Vec::new();
    while let Some(message) = batch.next().await {
        let message = message.map_err(|e| anyhow::anyhow!(e))?;
        let payload_type = message
            .headers
            .as_ref()
            .and_then(|headers| headers.get(PAYLOAD_TYPE_HEADER))
            .map(|value| value.as_str().to_string());
        assert_eq!(payload_type.as_deref(), Some(SENSOR_READING_PAYLOAD_TYPE));

        let reading = SensorReading::from_json_slice(&message.payload)?;
        received.push((message.subject.to_string(), reading));
    }

    received.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        received,
        vec![
            (
                "sensor_readings.H1".to_string(),
                SensorReading::new("WH-IT", "H1", 65.0, SensorType::Humidity)
            ),
            (
                "sensor_readings.S1".to_string(),
                SensorReading::new("WH-IT", "S1", 42.3, SensorType::Temperature)
            ),
        ]
    );

    Ok(())
}
