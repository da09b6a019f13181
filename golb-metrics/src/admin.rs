//! The admin listener: a small axum app serving `GET /metrics` in
//! Prometheus text exposition format, independent of the proxy listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::Metrics;

pub async fn serve_admin(port: u16, metrics: Arc<Metrics>, shutdown: CancellationToken) -> anyhow::Result<()> {
  let app = Router::new().route("/metrics", get(metrics_handler)).with_state(metrics);

  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = tokio::net::TcpListener::bind(addr).await?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
  Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
  (
    [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
    metrics.encode(),
  )
}
