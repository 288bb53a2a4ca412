use crate::nats::{
    set_parent_from_headers, ConsumeRequest, ConsumeResponse, JetStreamConsumer, PullConsumer,
    ReceivedMessage,
};
use anyhow::{Context, Result};
use async_nats::jetstream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Where and how a [`TowerConsumer`] pulls messages.
#[derive(Debug, Clone)]
pub struct TowerConsumerConfig {
    pub stream_name: String,
    /// Durable consumer name; consumers sharing it share the delivery cursor.
    pub consumer_name: String,
    pub subject_filter: String,
    pub batch_size: usize,
    pub max_wait: Duration,
}

impl TowerConsumerConfig {
    /// Consume every subject of `stream_name` with a durable consumer.
    pub fn for_stream(
        stream_name: &str,
        consumer_name: &str,
        batch_size: usize,
        max_wait: Duration,
    ) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            consumer_name: consumer_name.to_string(),
            subject_filter: format!("{}.>", stream_name),
            batch_size,
            max_wait,
        }
    }
}

/// Pulls batches from a durable JetStream consumer and hands each message,
/// in delivery order, to a tower service.
///
/// Every message is answered exactly once: `Ack` from the service acks it,
/// `Nak` or a service error asks for redelivery. Cancellation only
/// interrupts the wait for the next batch; a batch already fetched is
/// processed and acknowledged to the end.
pub struct TowerConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    config: TowerConsumerConfig,
    service: S,
}

impl<S> TowerConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        config: TowerConsumerConfig,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            filter_subject = %config.subject_filter,
            "creating tower nats consumer"
        );

        let pull_config = jetstream::consumer::pull::Config {
            durable_name: Some(config.consumer_name.clone()),
            filter_subject: config.subject_filter.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(pull_config, &config.stream_name)
            .await
            .context("failed to create consumer")?;

        debug!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            "tower nats consumer created"
        );

        Ok(Self {
            consumer,
            config,
            service,
        })
    }

    /// Run the consumer loop until `ctx` is cancelled.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        debug!(
            stream = %self.config.stream_name,
            consumer = %self.config.consumer_name,
            "starting tower nats consumer"
        );

        loop {
            let fetched = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    info!(
                        stream = %self.config.stream_name,
                        consumer = %self.config.consumer_name,
                        "received shutdown signal, stopping consumer"
                    );
                    break;
                }
                fetched = self
                    .consumer
                    .fetch_messages(self.config.batch_size, self.config.max_wait) => fetched,
            };

            match fetched {
                Ok(messages) => self.process_batch(messages).await,
                Err(e) => {
                    error!(
                        stream = %self.config.stream_name,
                        consumer = %self.config.consumer_name,
                        error = %e,
                        "failed to fetch message batch"
                    );
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        debug!(
            stream = %self.config.stream_name,
            consumer = %self.config.consumer_name,
            "consumer stopped gracefully"
        );
        Ok(())
    }

    async fn process_batch(&mut self, messages: Vec<ReceivedMessage>) {
        if messages.is_empty() {
            return;
        }

        debug!(message_count = messages.len(), "received message batch");

        for message in messages {
            self.process_message(message).await;
        }
    }

    async fn process_message(&mut self, message: ReceivedMessage) {
        let request = ConsumeRequest::new(
            message.subject.clone(),
            message.payload.clone(),
            message.headers.clone(),
        );

        let span = info_span!("consume_message", subject = %message.subject);
        if let Some(headers) = &message.headers {
            set_parent_from_headers(&span, headers);
        }

        let service = &mut self.service;
        let outcome = async move {
            let ready = service.ready().await?;
            ready.call(request).await
        }
        .instrument(span)
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                error!(
                    subject = %message.subject,
                    error = %e,
                    "service error processing message"
                );
                ConsumeResponse::nak(e.to_string())
            }
        };

        let subject = message.subject.clone();
        match response {
            ConsumeResponse::Ack => {
                if let Err(e) = message.ack().await {
                    error!(subject = %subject, error = %e, "failed to acknowledge message");
                }
            }
            ConsumeResponse::Nak(reason) => {
                warn!(
                    subject = %subject,
                    reason = reason.as_deref().unwrap_or(""),
                    "rejecting message"
                );
                if let Err(e) = message.nak().await {
                    error!(subject = %subject, error = %e, "failed to reject message");
                }
            }
        }
    }
}
