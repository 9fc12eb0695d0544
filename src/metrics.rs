//! Prometheus metrics

use axum::{body::Body, http::Request, response::Response};
use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use tracing::Span;

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Simple request counter
    pub static ref INCOMING_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("incoming_requests", "The number of HTTP requests received"),
        &["http_method"]
    ).unwrap();
    // Request counter by status code
    pub static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = IntCounterVec::new(
        Opts::new("outgoing_response", "The number of responses sent."),
        &["status_code"]
    ).unwrap();
    // Request histogram by response time
    pub static ref RESPONSE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("response_time", "The time taken to respond to each request"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &[],
    ).unwrap();
    // Rendered image counter by outcome
    pub static ref ARTIFACTS: IntCounterVec = IntCounterVec::new(
        Opts::new("artifacts", "The number of rendered images requested, by outcome"),
        &["outcome"]
    ).unwrap();
}

/// Outcome of a rendered image request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArtifactOutcome {
    Ready,
    Timeout,
    RenderFailed,
    Unreadable,
}

impl ArtifactOutcome {
    fn label(self) -> &'static str {
        match self {
            ArtifactOutcome::Ready => "ready",
            ArtifactOutcome::Timeout => "timeout",
            ArtifactOutcome::RenderFailed => "render_failed",
            ArtifactOutcome::Unreadable => "unreadable",
        }
    }
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(INCOMING_REQUESTS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RESPONSE_CODE_COLLECTOR.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RESPONSE_TIME_COLLECTOR.clone()))
        .unwrap();
    REGISTRY.register(Box::new(ARTIFACTS.clone())).unwrap();
}

pub async fn metrics_handler() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", err);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Increments the prometheus counter on all incoming requests, labelled by http method
pub fn request_counter(request: &Request<Body>, _span: &Span) {
    INCOMING_REQUESTS
        .with_label_values(&[&request.method().to_string().to_ascii_uppercase()])
        .inc();
}

/// Increment the prometheus counter on all outgoing responses, labelled by status code
pub fn record_response_metrics<B>(
    response: &Response<B>,
    latency: std::time::Duration,
    _span: &Span,
) {
    RESPONSE_CODE_COLLECTOR
        .with_label_values(&[response.status().as_str()])
        .inc();

    RESPONSE_TIME_COLLECTOR
        .with_label_values(&[])
        .observe(latency.as_secs_f64());
}

/// Increment the rendered image counter for `outcome`
pub fn record_artifact(outcome: ArtifactOutcome) {
    ARTIFACTS.with_label_values(&[outcome.label()]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_counter() {
        let before = ARTIFACTS.with_label_values(&["unreadable"]).get();
        record_artifact(ArtifactOutcome::Unreadable);
        assert!(ARTIFACTS.with_label_values(&["unreadable"]).get() > before);
    }
}
