//! Read-through response cache, keyed by request URL, GET-only, 60 s TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, StatusCode};

use golb_core::body::full_body;
use golb_core::{Handler, ProxyBody};

use crate::store::Store;

const CACHE_TTL: Duration = Duration::from_secs(60);

pub struct CacheFilter<H> {
  enabled: bool,
  store: Arc<dyn Store>,
  inner: H,
}

impl<H> CacheFilter<H> {
  pub fn new(enabled: bool, store: Arc<dyn Store>, inner: H) -> CacheFilter<H> {
    CacheFilter { enabled, store, inner }
  }
}

#[async_trait]
impl<H: Handler> Handler for CacheFilter<H> {
  async fn handle(&self, request: Request<ProxyBody>) -> Response<ProxyBody> {
    if !self.enabled || request.method() != Method::GET {
      return self.inner.handle(request).await;
    }

    let url = request.uri().to_string();
    let body_key = format!("cache:body:{url}");
    let type_key = format!("cache:type:{url}");

    if let (Ok(Some(body)), Ok(Some(content_type))) =
      (self.store.get(&body_key).await, self.store.get(&type_key).await)
    {
      return cache_hit_response(body, content_type);
    }

    let response = self.inner.handle(request).await;
    if response.status() != StatusCode::OK {
      return response;
    }

    let (parts, body) = response.into_parts();
    let content_type = parts
      .headers
      .get(CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .unwrap_or("")
      .to_string();

    let collected = match body.collect().await {
      Ok(collected) => collected.to_bytes(),
      Err(_) => return Response::from_parts(parts, full_body(Bytes::new())),
    };

    let store = self.store.clone();
    let write_body = collected.clone();
    tokio::spawn(async move {
      let _ = store
        .pipeline_set_ex(vec![
          (body_key, write_body.to_vec(), CACHE_TTL),
          (type_key, content_type.clone().into_bytes(), CACHE_TTL),
        ])
        .await;
    });

    Response::from_parts(parts, full_body(collected))
  }
}

fn cache_hit_response(body: Vec<u8>, content_type: Vec<u8>) -> Response<ProxyBody> {
  let content_type = String::from_utf8(content_type).unwrap_or_default();
  Response::builder()
    .status(StatusCode::OK)
    .header(CONTENT_TYPE, content_type)
    .header("X-Cache", "HIT")
    .body(full_body(body))
    .unwrap()
}
