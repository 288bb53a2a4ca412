use crate::nats::MessageAcker;
use anyhow::{anyhow, Result};
use async_nats::jetstream::{self, AckKind};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// A message delivered by a pull consumer, together with its ack handle.
///
/// The consumer loop answers every `ReceivedMessage` exactly once, either
/// with [`ReceivedMessage::ack`] or [`ReceivedMessage::nak`].
pub struct ReceivedMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
    acker: Box<dyn MessageAcker>,
}

impl ReceivedMessage {
    pub fn new(
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
        acker: Box<dyn MessageAcker>,
    ) -> Self {
        Self {
            subject,
            payload,
            headers,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nak(self) -> Result<()> {
        self.acker.nak().await
    }
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("subject", &self.subject)
            .field("payload_bytes", &self.payload.len())
            .field("has_headers", &self.headers.is_some())
            .finish()
    }
}

impl From<jetstream::Message> for ReceivedMessage {
    fn from(message: jetstream::Message) -> Self {
        let subject = message.subject.to_string();
        let payload = message.payload.clone();
        let headers = message.headers.clone();
        Self::new(subject, payload, headers, Box::new(JetStreamAcker { message }))
    }
}

/// Acks through the reply subject of the underlying JetStream message.
struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl MessageAcker for JetStreamAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| anyhow!("failed to ack message: {}", e))
    }

    async fn nak(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| anyhow!("failed to nak message: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::MockMessageAcker;

    #[tokio::test]
    async fn test_ack_delegates_to_handle_once() {
        let mut acker = MockMessageAcker::new();
        acker.expect_ack().times(1).returning(|| Ok(()));
        acker.expect_nak().times(0);

        let message = ReceivedMessage::new(
            "sensor_readings.S1".to_string(),
            Bytes::from_static(b"{}"),
            None,
            Box::new(acker),
        );

        assert!(message.ack().await.is_ok());
    }

    #[tokio::test]
    async fn test_nak_error_is_returned() {
        let mut acker = MockMessageAcker::new();
        acker
            .expect_nak()
            .times(1)
            .returning(|| Err(anyhow!("connection lost")));

        let message = ReceivedMessage::new(
            "sensor_readings.S1".to_string(),
            Bytes::new(),
            None,
            Box::new(acker),
        );

        let err = message.nak().await.unwrap_err();
        assert!(err.to_string().contains("connection lost"));
    }
}
