//! Prometheus-format request metrics, exposed on a separate admin listener
//! from the one handling proxied traffic.

mod admin;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hyper::{Request, Response};
use prometheus::{CounterVec, HistogramVec, Opts, Registry, TextEncoder};

use golb_core::{Handler, ProxyBody};

pub use admin::serve_admin;

/// The two metrics required of the admin endpoint:
/// `http_requests_total{method,status}` and
/// `http_request_duration_seconds{method,status}`.
pub struct Metrics {
  registry: Registry,
  requests_total: CounterVec,
  request_duration: HistogramVec,
}

impl Metrics {
  pub fn new() -> anyhow::Result<Arc<Metrics>> {
    let registry = Registry::new();

    let requests_total = CounterVec::new(
      Opts::new("http_requests_total", "Total HTTP requests handled by the proxy"),
      &["method", "status"],
    )?;
    registry.register(Box::new(requests_total.clone()))?;

    let request_duration = HistogramVec::new(
      prometheus::HistogramOpts::new(
        "http_request_duration_seconds",
        "Latency of proxied HTTP requests in seconds",
      ),
      &["method", "status"],
    )?;
    registry.register(Box::new(request_duration.clone()))?;

    Ok(Arc::new(Metrics {
      registry,
      requests_total,
      request_duration,
    }))
  }

  /// Renders the registry in Prometheus text exposition format.
  pub fn encode(&self) -> String {
    let encoder = TextEncoder::new();
    let families = self.registry.gather();
    encoder.encode_to_string(&families).unwrap_or_default()
  }
}

/// Wraps the whole filter chain, recording one observation per request.
/// This is the outermost layer: it sees every request that reaches the
/// listener and every response that leaves it, including ones short
/// circuited by an inner filter.
pub struct MetricsFilter<H> {
  metrics: Arc<Metrics>,
  inner: H,
}

impl<H> MetricsFilter<H> {
  pub fn new(metrics: Arc<Metrics>, inner: H) -> MetricsFilter<H> {
    MetricsFilter { metrics, inner }
  }
}

#[async_trait]
impl<H: Handler> Handler for MetricsFilter<H> {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    let method = request.method().to_string();
    let started = Instant::now();

    let response = self.inner.handle(request).await;

    let status = response.status().as_u16().to_string();
    let elapsed = started.elapsed().as_secs_f64();
    self.metrics.requests_total.with_label_values(&[&method, &status]).inc();
    self
      .metrics
      .request_duration
      .with_label_values(&[&method, &status])
      .observe(elapsed);

    response
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;
  use golb_config::StrategyKind;
  use golb_core::body::full_body;
  use golb_core::dispatch::Dispatcher;
  use golb_core::pool::ServerPool;

  #[tokio::test]
  async fn records_one_observation_per_request() {
    let metrics = Metrics::new().unwrap();
    let dispatcher = Dispatcher::new(ServerPool::new(vec![], StrategyKind::RoundRobin));
    let filter = MetricsFilter::new(metrics.clone(), dispatcher);

    let _ = filter.handle(Request::new(full_body(Bytes::new()))).await;

    let encoded = metrics.encode();
    assert!(encoded.contains("http_requests_total"));
    assert!(encoded.contains("http_request_duration_seconds"));
    assert!(encoded.contains("status=\"503\""));
  }
}
