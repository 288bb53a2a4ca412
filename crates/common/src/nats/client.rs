use crate::nats::trace_context::inject_trace_context;
use crate::nats::traits::{JetStreamConsumer, JetStreamPublisher, PullConsumer};
use crate::nats::ReceivedMessage;
use anyhow::{bail, Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Settings of the JetStream stream that carries sensor readings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub name: String,
    /// Replica count; the publish acknowledgment arrives only after the
    /// replicas have stored the message.
    pub replicas: usize,
}

impl StreamSettings {
    pub fn new(name: impl Into<String>, replicas: usize) -> Self {
        Self {
            name: name.into(),
            replicas,
        }
    }

    /// Subjects captured by the stream: one token per sensor id.
    pub fn subjects(&self) -> Vec<String> {
        vec![format!("{}.*", self.name)]
    }
}

/// Create the stream unless it already exists.
///
/// An existing stream must have the configured replica count, otherwise
/// publish acknowledgments would not cover the expected number of copies.
pub async fn ensure_stream(
    publisher: &dyn JetStreamPublisher,
    settings: &StreamSettings,
) -> Result<()> {
    info!(stream = %settings.name, replicas = settings.replicas, "ensuring stream exists");

    if let Ok(existing) = publisher.get_stream(&settings.name).await {
        if existing.num_replicas != settings.replicas {
            error!(
                stream = %settings.name,
                existing_replicas = existing.num_replicas,
                configured_replicas = settings.replicas,
                "stream replica count does not match configuration"
            );
            bail!(
                "stream '{}' has {} replica(s) but {} are configured",
                settings.name,
                existing.num_replicas,
                settings.replicas
            );
        }
        info!(stream = %settings.name, "stream already exists");
        return Ok(());
    }

    let config = StreamConfig {
        name: settings.name.clone(),
        subjects: settings.subjects(),
        description: Some("Warehouse sensor readings keyed by sensor id".to_string()),
        num_replicas: settings.replicas,
        ..Default::default()
    };

    publisher
        .create_stream(config)
        .await
        .with_context(|| format!("failed to create stream '{}'", settings.name))?;
    info!(stream = %settings.name, "created stream");

    Ok(())
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    pub async fn ensure_stream(&self, settings: &StreamSettings) -> Result<()> {
        let publisher = NatsJetStreamPublisher::new(self.jetstream.clone());
        ensure_stream(&publisher, settings).await
    }

    /// Create a JetStreamConsumer trait object from this client
    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(self.jetstream.clone()))
    }

    /// Create a JetStreamPublisher trait object from this client
    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    /// Flush anything still buffered in the connection, then drop it.
    pub async fn close(self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("failed to flush NATS connection")?;
        info!("NATS connection closed");
        Ok(())
    }
}

/// Concrete implementation of JetStreamConsumer using async-nats
pub struct NatsJetStreamConsumer {
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .context("Failed to create consumer")?;

        Ok(Box::new(NatsPullConsumer { consumer }))
    }
}

/// Concrete implementation of PullConsumer using async-nats
pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        use futures::StreamExt;

        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut result = Vec::new();
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(message) => result.push(ReceivedMessage::from(message)),
                Err(e) => {
                    error!(error = %e, "Error receiving message");
                }
            }
        }
        Ok(result)
    }
}

/// Concrete implementation of JetStreamPublisher using async-nats
pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    async fn get_stream(&self, stream_name: &str) -> Result<jetstream::stream::Config> {
        let stream = self
            .context
            .get_stream(stream_name)
            .await
            .context("Failed to get stream")?;
        Ok(stream.cached_info().config.clone())
    }

    async fn create_stream(&self, config: jetstream::stream::Config) -> Result<()> {
        self.context
            .create_stream(config)
            .await
            .context("Failed to create stream")?;
        Ok(())
    }

    #[instrument(skip(self, headers, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(
        &self,
        subject: String,
        mut headers: HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<()> {
        inject_trace_context(&mut headers);

        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish message to JetStream")?;

        ack.await
            .context("Failed to receive JetStream acknowledgment")?;
        Ok(())
    }
}
