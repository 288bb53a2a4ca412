use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Failed to serialize sensor reading: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize sensor reading: {0}")]
    DeserializationError(String),

    #[error("Untrusted payload type: {0}")]
    UntrustedPayloadType(String),

    #[error("Publish failed for sensor {sensor_id} after {attempts} attempt(s)")]
    PublishRetriesExhausted { sensor_id: String, attempts: u32 },

    #[error("Broker error: {0}")]
    BrokerError(#[from] anyhow::Error),
}
