use crate::domain::parse;
use common::{DomainError, DomainResult, SensorReading, SensorReadingProducer, SensorType};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ReadingPublisherConfig {
    pub warehouse_id: String,
    /// Total publish attempts per reading, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl ReadingPublisherConfig {
    pub fn new(warehouse_id: impl Into<String>) -> Self {
        Self {
            warehouse_id: warehouse_id.into(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Raw lines of one listener, tagged with the metric of its port.
pub struct LineSource {
    pub sensor_type: SensorType,
    pub receiver: broadcast::Receiver<String>,
}

impl LineSource {
    pub fn new(sensor_type: SensorType, receiver: broadcast::Receiver<String>) -> Self {
        Self {
            sensor_type,
            receiver,
        }
    }

    fn into_stream(self) -> BoxStream<'static, (SensorType, String)> {
        stream::unfold(self, |mut source| async move {
            loop {
                match source.receiver.recv().await {
                    Ok(line) => return Some(((source.sensor_type, line), source)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            sensor_type = %source.sensor_type,
                            skipped,
                            "publisher fell behind listener, oldest lines dropped"
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

/// Merges the lines of every listener, normalizes them and publishes the
/// resulting readings.
///
/// A bad line or a reading whose publish attempts are exhausted is logged and
/// skipped; neither stops the merged stream.
pub struct ReadingPublisher {
    producer: Arc<dyn SensorReadingProducer>,
    config: ReadingPublisherConfig,
}

impl ReadingPublisher {
    pub fn new(producer: Arc<dyn SensorReadingProducer>, config: ReadingPublisherConfig) -> Self {
        Self { producer, config }
    }

    /// Publish until every source has ended.
    ///
    /// Sources end when their listener shuts down, after the lines already
    /// buffered for this publisher have been delivered, so returning means
    /// the backlog has been drained.
    pub async fn run(&self, sources: Vec<LineSource>) {
        let mut merged = stream::select_all(sources.into_iter().map(LineSource::into_stream));

        while let Some((sensor_type, line)) = merged.next().await {
            self.handle_line(sensor_type, &line).await;
        }

        info!(warehouse_id = %self.config.warehouse_id, "all listener streams ended, publisher drained");
    }

    /// Normalize and publish one raw line.
    pub async fn handle_line(&self, sensor_type: SensorType, raw: &str) {
        let reading = match parse(raw, sensor_type, &self.config.warehouse_id) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(sensor_type = %sensor_type, error = %e, "Skipping bad message: {}", raw);
                return;
            }
        };

        info!(
            warehouse_id = %reading.warehouse_id,
            sensor_id = %reading.sensor_id,
            sensor_type = %reading.sensor_type,
            value = reading.value,
            "Sending reading"
        );

        if let Err(e) = self.publish_with_retry(&reading).await {
            error!(
                sensor_id = %reading.sensor_id,
                sensor_type = %reading.sensor_type,
                error = %e,
                "failed to send reading"
            );
        }
    }

    async fn publish_with_retry(&self, reading: &SensorReading) -> DomainResult<()> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.producer.publish(reading).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        sensor_id = %reading.sensor_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "publish attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        sensor_id = %reading.sensor_id,
                        attempt,
                        error = %e,
                        "last publish attempt failed"
                    );
                    return Err(DomainError::PublishRetriesExhausted {
                        sensor_id: reading.sensor_id.clone(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
