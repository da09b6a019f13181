//! Fixed-window rate limiting, keyed by client IP and the current UTC
//! calendar minute.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use hyper::{Request, Response, StatusCode};

use golb_core::body::full_body;
use golb_core::{ClientAddr, Handler, ProxyBody};

use crate::store::Store;

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimitFilter<H> {
  enabled: bool,
  per_min: u32,
  store: Arc<dyn Store>,
  inner: H,
}

impl<H> RateLimitFilter<H> {
  pub fn new(enabled: bool, per_min: u32, store: Arc<dyn Store>, inner: H) -> RateLimitFilter<H> {
    RateLimitFilter {
      enabled,
      per_min,
      store,
      inner,
    }
  }
}

#[async_trait]
impl<H: Handler> Handler for RateLimitFilter<H> {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    if !self.enabled {
      return self.inner.handle(request).await;
    }

    let ip = request
      .extensions()
      .get::<ClientAddr>()
      .map(|addr| addr.0.to_string())
      .unwrap_or_else(|| "unknown".to_string());
    let minute = Utc::now().format("%Y-%m-%dT%H:%M");
    let key = format!("ratelimit:{ip}:{minute}");

    match self.store.incr(&key).await {
      Ok(count) => {
        if count == 1 {
          // Fire-and-forget: a lost expire would only widen the window,
          // never shrink it, so a transient store failure here is benign.
          let _ = self.store.expire(&key, WINDOW).await;
        }
        if count as u32 > self.per_min {
          too_many_requests_response(self.per_min)
        } else {
          self.inner.handle(request).await
        }
      }
      // Store unreachable: fail open rather than block traffic.
      Err(_) => self.inner.handle(request).await,
    }
  }
}

fn too_many_requests_response(limit: u32) -> Response<ProxyBody> {
  Response::builder()
    .status(StatusCode::TOO_MANY_REQUESTS)
    .header("X-RateLimit-Limit", limit.to_string())
    .header("X-RateLimit-Remaining", "0")
    .body(full_body(Bytes::from_static(b"429 Too Many Requests\n")))
    .unwrap()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::InProcessStore;
  use golb_config::StrategyKind;
  use golb_core::dispatch::Dispatcher;
  use golb_core::pool::ServerPool;

  fn passthrough_dispatcher() -> Dispatcher {
    Dispatcher::new(ServerPool::new(vec![], StrategyKind::RoundRobin))
  }

  #[tokio::test]
  async fn disabled_rate_limit_passes_through() {
    let store = InProcessStore::new();
    let filter = RateLimitFilter::new(false, 1, store, passthrough_dispatcher());
    for _ in 0..5 {
      let response = filter.handle(Request::new(full_body(Bytes::new()))).await;
      assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
  }

  #[tokio::test]
  async fn allows_up_to_limit_then_rejects() {
    let store = InProcessStore::new();
    let filter = RateLimitFilter::new(true, 2, store, passthrough_dispatcher());

    let r1 = filter.handle(Request::new(full_body(Bytes::new()))).await;
    let r2 = filter.handle(Request::new(full_body(Bytes::new()))).await;
    let r3 = filter.handle(Request::new(full_body(Bytes::new()))).await;

    assert_eq!(r1.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(r2.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(r3.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(r3.headers().get("X-RateLimit-Remaining").unwrap(), "0");
  }

  #[tokio::test]
  async fn different_ips_get_independent_windows() {
    let store = InProcessStore::new();
    let filter = RateLimitFilter::new(true, 1, store, passthrough_dispatcher());

    let mut req_a = Request::new(full_body(Bytes::new()));
    req_a.extensions_mut().insert(ClientAddr("10.0.0.1".parse().unwrap()));
    let mut req_b = Request::new(full_body(Bytes::new()));
    req_b.extensions_mut().insert(ClientAddr("10.0.0.2".parse().unwrap()));

    let resp_a = filter.handle(req_a).await;
    let resp_b = filter.handle(req_b).await;
    assert_eq!(resp_a.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp_b.status(), StatusCode::SERVICE_UNAVAILABLE);
  }
}
