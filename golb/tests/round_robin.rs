//! End-to-end round-robin scenario: three live upstreams, six requests,
//! responses come back A,B,C,A,B,C in that order.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use golb_config::StrategyKind;
use golb_core::body::{empty_body, full_body};
use golb_core::{Backend, Dispatcher, ServerPool};
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;

async fn spawn_fake_upstream(label: &'static str) -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  tokio::spawn(async move {
    loop {
      let (stream, _) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(_) => return,
      };
      tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let service = service_fn(move |_req: Request<hyper::body::Incoming>| async move {
          Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(label.as_bytes()))))
        });
        let _ = auto::Builder::new(TokioExecutor::new()).serve_connection(io, service).await;
      });
    }
  });

  addr
}

#[tokio::test]
async fn three_backends_round_robin_in_registration_order() {
  let addr_a = spawn_fake_upstream("A").await;
  let addr_b = spawn_fake_upstream("B").await;
  let addr_c = spawn_fake_upstream("C").await;

  let backends: Vec<Arc<Backend>> = vec![addr_a, addr_b, addr_c]
    .into_iter()
    .map(|addr| Arc::new(Backend::new(&format!("http://{addr}"), 1, 3).unwrap()))
    .collect();

  let pool = ServerPool::new(backends, StrategyKind::RoundRobin);
  let dispatcher = Dispatcher::new(pool);

  let mut bodies = Vec::new();
  for _ in 0..6 {
    let response = dispatcher.dispatch(Request::new(empty_body())).await;
    let body = http_body_util::BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
    bodies.push(String::from_utf8(body.to_vec()).unwrap());
  }

  assert_eq!(bodies, vec!["A", "B", "C", "A", "B", "C"]);
}

#[tokio::test]
async fn unreachable_backend_is_skipped_after_its_circuit_trips() {
  let addr_b = spawn_fake_upstream("B").await;

  let dead = Arc::new(Backend::new("http://127.0.0.1:1", 1, 1).unwrap());
  let live = Arc::new(Backend::new(&format!("http://{addr_b}"), 1, 3).unwrap());

  let pool = ServerPool::new(vec![dead, live], StrategyKind::RoundRobin);
  let dispatcher = Dispatcher::new(pool);

  // First call hits the dead backend and trips its circuit (threshold 1).
  let first = dispatcher.dispatch(Request::new(full_body(Bytes::new()))).await;
  assert_eq!(first.status(), hyper::StatusCode::BAD_GATEWAY);

  // Every call after that should land on the surviving backend.
  for _ in 0..3 {
    let response = dispatcher.dispatch(Request::new(empty_body())).await;
    let body = http_body_util::BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
    assert_eq!(&body[..], b"B");
  }
}
