//! Message headers: the routing key and W3C trace context.

use async_nats::HeaderMap;
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header carrying the unmodified message key
pub const KEY_HEADER: &str = "Iotstream-Key";

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        vec![TRACEPARENT, TRACESTATE]
    }
}

/// Headers for an outgoing message: the key (when present) and the current span's trace context
pub fn outgoing_headers(key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(key) = key {
        headers.insert(KEY_HEADER, key);
    }
    global::get_text_map_propagator(|propagator| {
        let ctx = tracing::Span::current().context();
        propagator.inject_context(&ctx, &mut HeaderInjector(&mut headers));
    });
    headers
}

pub fn message_key(headers: &HeaderMap) -> Option<String> {
    headers.get(KEY_HEADER).map(|v| v.as_str().to_string())
}

pub fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Parent the current span on the publisher's trace
pub fn set_parent_from_headers(headers: &HeaderMap) {
    let ctx = extract_trace_context(headers);
    tracing::Span::current().set_parent(ctx);
}
