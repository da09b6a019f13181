//! One upstream backend: URL, health flag, connection accounting, circuit
//! breaker, and the reverse-proxy client used to reach it.
//!
//! `serve` increments `active_connections` on entry and decrements it on
//! every exit path; an upstream error observed before response headers are
//! received is a "dispatch failure" and counts toward the circuit breaker,
//! while errors surfacing later (e.g. a client disconnecting mid-body) do
//! not.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use http::header::HOST;
use http_body_util::BodyExt;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::body::{full_body, ProxyBody};
use crate::events::{EventSink, NullEventSink};

/// Per-dial connect timeout and the overall budget for one proxied request,
/// independent of each other: a slow dial fails fast, a slow upstream still
/// gets the full request timeout to respond.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Builds the pooled upstream client. A missing or unreadable system trust
/// store is a startup-time condition, not a request-time one, so this
/// returns a plain `anyhow::Result` for the caller to propagate with `?`
/// rather than panicking.
fn build_client() -> anyhow::Result<Client<HttpsConnector, ProxyBody>> {
  let mut http = HttpConnector::new();
  http.enforce_http(false);
  http.set_connect_timeout(Some(CONNECT_TIMEOUT));
  http.set_keepalive(Some(TCP_KEEPALIVE));

  let https = hyper_rustls::HttpsConnectorBuilder::new()
    .with_native_roots()
    .context("failed to load native root certificates")?
    .https_or_http()
    .enable_http1()
    .wrap_connector(http);

  Ok(
    Client::builder(TokioExecutor::new())
      .pool_idle_timeout(POOL_IDLE_TIMEOUT)
      .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
      .build(https),
  )
}

/// One configured upstream endpoint.
pub struct Backend {
  url: Arc<str>,
  scheme: http::uri::Scheme,
  authority: http::uri::Authority,
  host: String,
  port: u16,
  weight: u32,
  max_consecutive_failures: u32,
  alive: AtomicBool,
  active_connections: AtomicI64,
  consecutive_failures: AtomicU32,
  /// Only meaningful to [`crate::strategy::Strategy::WeightedRoundRobin`].
  current_weight: AtomicI64,
  client: Client<HttpsConnector, ProxyBody>,
  events: Arc<dyn EventSink>,
}

impl Backend {
  pub fn new(url: &str, weight: u32, max_consecutive_failures: u32) -> anyhow::Result<Backend> {
    Self::with_event_sink(url, weight, max_consecutive_failures, Arc::new(NullEventSink))
  }

  pub fn with_event_sink(
    url: &str,
    weight: u32,
    max_consecutive_failures: u32,
    events: Arc<dyn EventSink>,
  ) -> anyhow::Result<Backend> {
    let uri: Uri = url.parse()?;
    let scheme = uri
      .scheme()
      .cloned()
      .ok_or_else(|| anyhow::anyhow!("backend URL \"{url}\" is missing a scheme"))?;
    let authority = uri
      .authority()
      .cloned()
      .ok_or_else(|| anyhow::anyhow!("backend URL \"{url}\" is missing a host"))?;
    let host = authority.host().to_string();
    let port = authority
      .port_u16()
      .unwrap_or(if scheme.as_str() == "https" { 443 } else { 80 });

    Ok(Backend {
      url: Arc::from(url),
      scheme,
      authority,
      host,
      port,
      weight,
      max_consecutive_failures,
      alive: AtomicBool::new(true),
      active_connections: AtomicI64::new(0),
      consecutive_failures: AtomicU32::new(0),
      current_weight: AtomicI64::new(0),
      client: build_client()?,
      events,
    })
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn host(&self) -> &str {
    &self.host
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn weight(&self) -> u32 {
    self.weight
  }

  pub fn is_alive(&self) -> bool {
    self.alive.load(Ordering::Acquire)
  }

  pub fn set_alive(&self, alive: bool) {
    self.alive.store(alive, Ordering::Release);
  }

  pub fn active_connections(&self) -> i64 {
    self.active_connections.load(Ordering::Acquire)
  }

  pub fn reset_failures(&self) {
    self.consecutive_failures.store(0, Ordering::SeqCst);
  }

  pub(crate) fn add_current_weight(&self, delta: i64) -> i64 {
    self.current_weight.fetch_add(delta, Ordering::SeqCst) + delta
  }

  pub(crate) fn sub_current_weight(&self, delta: i64) {
    self.current_weight.fetch_sub(delta, Ordering::SeqCst);
  }

  /// Equality is by URL identity: two `Backend`s for the same URL are the
  /// same logical upstream even if their weight or failure threshold differ.
  pub fn same_identity(&self, other: &Backend) -> bool {
    self.url == other.url
  }

  fn rewrite_uri(&self, original: &Uri) -> Uri {
    let path_and_query = original
      .path_and_query()
      .map(|pq| pq.as_str())
      .unwrap_or("/");
    Uri::builder()
      .scheme(self.scheme.clone())
      .authority(self.authority.clone())
      .path_and_query(path_and_query)
      .build()
      .unwrap_or_else(|_| original.clone())
  }

  /// Dispatches `request` to this upstream. Always returns a response: a
  /// successful or erroring upstream response, or a synthesized 502 if the
  /// dispatch itself failed before headers were received.
  pub async fn serve(&self, mut request: Request<ProxyBody>) -> Response<ProxyBody> {
    let _guard = ActiveConnectionGuard::new(&self.active_connections);

    *request.uri_mut() = self.rewrite_uri(request.uri());
    request
      .headers_mut()
      .insert(HOST, self.authority.as_str().parse().unwrap());

    let outcome = tokio::time::timeout(REQUEST_TIMEOUT, self.client.request(request)).await;

    match outcome {
      Ok(Ok(response)) => {
        self.reset_failures();
        response.map(|body| body.map_err(|err| std::io::Error::other(err.to_string())).boxed())
      }
      Ok(Err(err)) => self.record_dispatch_failure(&err.to_string()),
      Err(_elapsed) => self.record_dispatch_failure("upstream request timed out"),
    }
  }

  fn record_dispatch_failure(&self, reason: &str) -> Response<ProxyBody> {
    let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
    if failures >= self.max_consecutive_failures {
      self.alive.store(false, Ordering::Release);
      self.events.log(
        &format!(
          "backend {} tripped its circuit breaker after {} consecutive failures ({reason})",
          self.url, failures
        ),
        true,
      );
    } else {
      self
        .events
        .log(&format!("backend {} dispatch failure: {reason}", self.url), true);
    }
    bad_gateway_response()
  }
}

fn bad_gateway_response() -> Response<ProxyBody> {
  Response::builder()
    .status(StatusCode::BAD_GATEWAY)
    .body(full_body(Bytes::from_static(b"502 Bad Gateway\n")))
    .unwrap()
}

/// Guarantees `active_connections` is decremented on every exit path of
/// `Backend::serve`, including early returns.
struct ActiveConnectionGuard<'a> {
  counter: &'a AtomicI64,
}

impl<'a> ActiveConnectionGuard<'a> {
  fn new(counter: &'a AtomicI64) -> Self {
    counter.fetch_add(1, Ordering::AcqRel);
    ActiveConnectionGuard { counter }
  }
}

impl Drop for ActiveConnectionGuard<'_> {
  fn drop(&mut self) {
    self.counter.fetch_sub(1, Ordering::AcqRel);
  }
}
