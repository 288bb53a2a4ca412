//! W3C trace-context propagation across NATS message headers.
//!
//! The publisher stamps the current span's context into the outgoing
//! headers; the consumer makes that context the parent of the span it opens
//! for the delivered message, so one reading is a single trace from UDP
//! ingestion to threshold evaluation.

use async_nats::HeaderMap;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::{global, Context};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

const PROPAGATION_HEADERS: [&str; 2] = ["traceparent", "tracestate"];

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|value| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        PROPAGATION_HEADERS
            .iter()
            .copied()
            .filter(|key| self.0.get(*key).is_some())
            .collect()
    }
}

/// Write the current span's trace context into `headers`.
///
/// A no-op until a global propagator is installed by telemetry init.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let context = Span::current().context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&context, &mut HeaderInjector(headers))
    });
}

/// Read a propagated trace context out of `headers`.
pub fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Make the context carried by `headers` the parent of `span`.
pub fn set_parent_from_headers(span: &Span, headers: &HeaderMap) {
    span.set_parent(extract_trace_context(headers));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_without_propagator_leaves_headers_usable() {
        let mut headers = HeaderMap::new();
        headers.insert("Payload-Type", "sensor_reading.v1");

        inject_trace_context(&mut headers);

        assert_eq!(
            headers.get("Payload-Type").map(|v| v.as_str()),
            Some("sensor_reading.v1")
        );
    }

    #[test]
    fn test_extractor_lists_only_present_keys() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        );

        let extractor = HeaderExtractor(&headers);

        assert_eq!(extractor.keys(), vec!["traceparent"]);
        assert!(extractor.get("traceparent").unwrap().starts_with("00-"));
        assert!(extractor.get("tracestate").is_none());
    }

    #[test]
    fn test_set_parent_accepts_headers_without_context() {
        let headers = HeaderMap::new();
        let span = tracing::info_span!("consume_reading");

        set_parent_from_headers(&span, &headers);
    }
}
