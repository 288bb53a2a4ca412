use crate::domain::ThresholdEvaluator;
use common::{
    ConsumeRequest, ConsumeResponse, DomainError, DomainResult, SensorReading,
    PAYLOAD_TYPE_HEADER,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error};

const ANY_PAYLOAD_TYPE: &str = "*";

/// Allow-list of `Payload-Type` header values the monitor will decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustedPayloadTypes {
    Any,
    Only(Vec<String>),
}

impl TrustedPayloadTypes {
    /// Parse a comma-separated list; `*` anywhere in it trusts every type.
    pub fn parse(list: &str) -> Self {
        let types: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        if types.iter().any(|t| t == ANY_PAYLOAD_TYPE) {
            Self::Any
        } else {
            Self::Only(types)
        }
    }

    /// A message without the header is only trusted when every type is.
    pub fn check(&self, payload_type: Option<&str>) -> DomainResult<()> {
        match (self, payload_type) {
            (Self::Any, _) => Ok(()),
            (Self::Only(types), Some(payload_type)) if types.iter().any(|t| t == payload_type) => {
                Ok(())
            }
            (Self::Only(_), payload_type) => Err(DomainError::UntrustedPayloadType(
                payload_type.unwrap_or("<missing>").to_string(),
            )),
        }
    }
}

/// Tower service that decodes one consumed sensor reading and evaluates it.
///
/// The evaluation always ends in `Ack`. A message that cannot be decoded
/// (untrusted payload type or invalid JSON) is logged and acked as well, so a
/// poison message never blocks the consumer.
#[derive(Clone)]
pub struct SensorReadingService {
    evaluator: Arc<ThresholdEvaluator>,
    trusted: Arc<TrustedPayloadTypes>,
}

impl SensorReadingService {
    pub fn new(evaluator: Arc<ThresholdEvaluator>, trusted: TrustedPayloadTypes) -> Self {
        Self {
            evaluator,
            trusted: Arc::new(trusted),
        }
    }

    fn decode(&self, req: &ConsumeRequest) -> DomainResult<SensorReading> {
        self.trusted.check(req.header(PAYLOAD_TYPE_HEADER))?;
        SensorReading::from_json_slice(&req.payload)
    }
}

impl Service<ConsumeRequest> for SensorReadingService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let decoded = self.decode(&req);
        let evaluator = self.evaluator.clone();

        Box::pin(async move {
            let reading = match decoded {
                Ok(reading) => reading,
                Err(e) => {
                    error!(
                        error = %e,
                        subject = %req.subject,
                        "failed to decode sensor reading, acking to drop it"
                    );
                    return Ok(ConsumeResponse::ack());
                }
            };

            let alarm = evaluator.check(&reading);
            debug!(
                warehouse_id = %reading.warehouse_id,
                sensor_id = %reading.sensor_id,
                sensor_type = %reading.sensor_type,
                value = reading.value,
                alarm = alarm.is_some(),
                "evaluated sensor reading"
            );

            Ok(ConsumeResponse::ack())
        })
    }
}
