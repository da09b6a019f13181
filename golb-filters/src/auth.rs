//! Shared-secret authentication, checked before the request reaches the
//! cache or the dispatcher.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::HeaderName;
use hyper::{Request, Response, StatusCode};

use golb_core::body::full_body;
use golb_core::{Handler, ProxyBody};

static SECRET_TOKEN_HEADER: HeaderName = HeaderName::from_static("secret-token");

pub struct AuthFilter<H> {
  enabled: bool,
  token: String,
  inner: H,
}

impl<H> AuthFilter<H> {
  pub fn new(enabled: bool, token: String, inner: H) -> AuthFilter<H> {
    AuthFilter { enabled, token, inner }
  }
}

#[async_trait]
impl<H: Handler> Handler for AuthFilter<H> {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    if !self.enabled {
      return self.inner.handle(request).await;
    }

    let provided = request
      .headers()
      .get(&SECRET_TOKEN_HEADER)
      .and_then(|value| value.to_str().ok());

    // Exact byte match against the configured token; anything else,
    // including a header that merely has the right length, is rejected.
    match provided {
      Some(value) if value == self.token => self.inner.handle(request).await,
      _ => unauthorized_response(),
    }
  }
}

fn unauthorized_response() -> Response<ProxyBody> {
  Response::builder()
    .status(StatusCode::UNAUTHORIZED)
    .body(full_body(Bytes::from_static(b"401 Unauthorized\n")))
    .unwrap()
}
