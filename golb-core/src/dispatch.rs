//! The innermost handler of the filter chain: picks a backend and forwards
//! the request, or answers 503 when the pool has nothing live to offer.

use bytes::Bytes;
use hyper::{Request, Response, StatusCode};

use crate::body::{full_body, ProxyBody};
use crate::pool::ServerPool;

/// Never retries: a 502 from the chosen backend propagates to the client
/// unchanged, and an empty pool always yields 503, never an error.
pub struct Dispatcher {
  pool: ServerPool,
}

impl Dispatcher {
  pub fn new(pool: ServerPool) -> Dispatcher {
    Dispatcher { pool }
  }

  pub async fn dispatch(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    match self.pool.next_peer() {
      Some(backend) => backend.serve(request).await,
      None => service_unavailable_response(),
    }
  }
}

fn service_unavailable_response() -> Response<ProxyBody> {
  Response::builder()
    .status(StatusCode::SERVICE_UNAVAILABLE)
    .body(full_body(Bytes::from_static(b"503 Service Unavailable\n")))
    .unwrap()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::Backend;
  use golb_config::StrategyKind;
  use std::sync::Arc;

  #[tokio::test]
  async fn dispatch_against_empty_pool_returns_503() {
    let pool = ServerPool::new(vec![], StrategyKind::RoundRobin);
    let dispatcher = Dispatcher::new(pool);
    let response = dispatcher.dispatch(Request::new(full_body(Bytes::new()))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
  }

  #[tokio::test]
  async fn dispatch_against_all_dead_backends_returns_503() {
    let backend = Arc::new(Backend::new("http://127.0.0.1:9001", 1, 3).unwrap());
    backend.set_alive(false);
    let pool = ServerPool::new(vec![backend], StrategyKind::RoundRobin);
    let dispatcher = Dispatcher::new(pool);
    let response = dispatcher.dispatch(Request::new(full_body(Bytes::new()))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
  }
}
