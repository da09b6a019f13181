//! The seam filters wrap. A `Handler` takes a request and always produces a
//! response — it never returns an `Err`, because every failure mode in this
//! system (no live backend, upstream failure, rejected request) has its own
//! status code.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, Response};

use crate::body::ProxyBody;

#[async_trait]
pub trait Handler: Send + Sync {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody>;
}

#[async_trait]
impl Handler for crate::dispatch::Dispatcher {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    self.dispatch(request).await
  }
}

/// Lets a type-erased `Arc<dyn Handler>` be nested inside another filter
/// just like any concrete handler, e.g. wrapping a whole built chain with
/// one more outer layer.
#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    (**self).handle(request).await
  }
}
