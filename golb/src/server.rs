//! The front-end listener: accepts client connections, optionally wraps
//! them in TLS, and drives each one through the filter chain via hyper's
//! HTTP/1.1 connection handling.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use golb_core::body::ProxyBody;
use golb_core::{ClientAddr, Handler};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);
/// §5 resource bound: read-header timeout. Mitigates Slowloris-style
/// clients that open a connection and trickle headers in one byte at a
/// time.
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// §5 resource bound: per-request header size.
const MAX_HEADER_BUF_SIZE: usize = 1024 * 1024;

/// One HTTP/1.1 connection driver, configured per §5's front-end resource
/// bounds. The timer is necessary for `header_read_timeout` to take effect
/// at all, the same requirement the teacher calls out at
/// `ferron/src/server.rs`'s `http1_builder.timer(TokioTimer::new())`.
/// Front-end connections are HTTP/1.1 only: the dispatch engine forwards
/// requests as-is and has no use for an ALPN-negotiated HTTP/2 leg here.
fn http1_builder() -> http1::Builder {
  let mut builder = http1::Builder::new();
  builder
    .timer(TokioTimer::new())
    .header_read_timeout(HEADER_READ_TIMEOUT)
    .keep_alive(true)
    .max_buf_size(MAX_HEADER_BUF_SIZE);
  builder
}

#[derive(Clone)]
struct ChainService {
  chain: Arc<dyn Handler>,
  remote: SocketAddr,
}

impl Service<Request<Incoming>> for ChainService {
  type Response = Response<ProxyBody>;
  type Error = Infallible;
  type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

  fn call(&self, request: Request<Incoming>) -> Self::Future {
    let chain = self.chain.clone();
    let remote = self.remote.ip();
    Box::pin(async move {
      let (parts, body) = request.into_parts();
      let body = body.map_err(|err| std::io::Error::other(err.to_string())).boxed();
      let mut request = Request::from_parts(parts, body);
      request.extensions_mut().insert(ClientAddr(remote));
      Ok(chain.handle(request).await)
    })
  }
}

/// Plain-TCP accept loop. Runs until `shutdown` is cancelled, then drains
/// in-flight connections for up to [`SHUTDOWN_GRACE_PERIOD`] before
/// returning.
pub async fn serve_plain(port: u16, chain: Arc<dyn Handler>, shutdown: CancellationToken) -> anyhow::Result<()> {
  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = TcpListener::bind(addr).await?;
  let tracker = TaskTracker::new();

  loop {
    tokio::select! {
      _ = shutdown.cancelled() => break,
      accepted = listener.accept() => {
        let (stream, remote) = accepted?;
        let service = ChainService { chain: chain.clone(), remote };
        tracker.spawn(async move {
          let io = TokioIo::new(stream);
          if let Err(err) = http1_builder().serve_connection(io, service).await {
            tracing_unavailable_log(&err.to_string());
          }
        });
      }
    }
  }

  tracker.close();
  let _ = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, tracker.wait()).await;
  Ok(())
}

/// TLS accept loop, identical in shape to [`serve_plain`] but wrapping each
/// accepted socket in a rustls handshake before handing it to hyper.
pub async fn serve_tls(
  port: u16,
  chain: Arc<dyn Handler>,
  tls_config: Arc<tokio_rustls::rustls::ServerConfig>,
  shutdown: CancellationToken,
) -> anyhow::Result<()> {
  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = TcpListener::bind(addr).await?;
  let acceptor = TlsAcceptor::from(tls_config);
  let tracker = TaskTracker::new();

  loop {
    tokio::select! {
      _ = shutdown.cancelled() => break,
      accepted = listener.accept() => {
        let (stream, remote) = accepted?;
        let acceptor = acceptor.clone();
        let service = ChainService { chain: chain.clone(), remote };
        tracker.spawn(async move {
          let tls_stream = match acceptor.accept(stream).await {
            Ok(stream) => stream,
            Err(err) => {
              tracing_unavailable_log(&format!("TLS handshake failed: {err}"));
              return;
            }
          };
          let io = TokioIo::new(tls_stream);
          if let Err(err) = http1_builder().serve_connection(io, service).await {
            tracing_unavailable_log(&err.to_string());
          }
        });
      }
    }
  }

  tracker.close();
  let _ = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, tracker.wait()).await;
  Ok(())
}

/// Per-connection errors happen off the request path, where there is no
/// `EventSink` handle without plumbing it through every spawned task; they
/// are rare enough (reset connections, malformed requests) to go to
/// stderr directly rather than justifying that plumbing.
fn tracing_unavailable_log(message: &str) {
  eprintln!("connection error: {message}");
}
