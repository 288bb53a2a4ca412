use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{debug, error, warn};

/// Tower layer that logs the outcome and latency of every consumed message.
#[derive(Clone, Default)]
pub struct ConsumeLoggingLayer;

impl ConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ConsumeLoggingLayer {
    type Service = ConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct ConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for ConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let subject = req.subject.clone();
        let payload_bytes = req.payload.len();
        let started = Instant::now();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            let duration_ms = started.elapsed().as_millis();

            match &result {
                Ok(ConsumeResponse::Ack) => {
                    debug!(
                        subject = %subject,
                        payload_bytes,
                        duration_ms,
                        outcome = "ack",
                        "consumed message"
                    );
                }
                Ok(response @ ConsumeResponse::Nak(reason)) => {
                    warn!(
                        subject = %subject,
                        payload_bytes,
                        duration_ms,
                        outcome = response.outcome(),
                        reason = reason.as_deref().unwrap_or(""),
                        "consumed message, requesting redelivery"
                    );
                }
                Err(e) => {
                    error!(
                        subject = %subject,
                        payload_bytes,
                        duration_ms,
                        error = %e,
                        "failed to consume message"
                    );
                }
            }

            result
        })
    }
}
