//! Background health probing: a periodic TCP dial against each backend,
//! independent of request traffic, that can revive a circuit-tripped
//! backend or take down one that request traffic hasn't touched yet.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::events::EventSink;

const PROBE_INTERVAL: Duration = Duration::from_secs(20);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs until `shutdown` is cancelled, probing every backend once per
/// `PROBE_INTERVAL` tick in registration order. A probe never touches the
/// request path: it only calls `set_alive` and `reset_failures`.
pub async fn run(backends: Vec<Arc<Backend>>, events: Arc<dyn EventSink>, shutdown: CancellationToken) {
  let mut ticker = tokio::time::interval(PROBE_INTERVAL);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  // Consume the immediate first tick so we probe once before the first
  // full interval rather than twice in quick succession.
  ticker.tick().await;

  loop {
    tokio::select! {
      _ = shutdown.cancelled() => return,
      _ = ticker.tick() => {
        for backend in &backends {
          probe_one(backend, &events).await;
        }
      }
    }
  }
}

async fn probe_one(backend: &Arc<Backend>, events: &Arc<dyn EventSink>) {
  let addr = (backend.host().to_string(), backend.port());
  let outcome = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await;
  match outcome {
    Ok(Ok(_stream)) => {
      let was_dead = !backend.is_alive();
      backend.set_alive(true);
      backend.reset_failures();
      if was_dead {
        events.log(&format!("backend {} passed its health probe and is back in rotation", backend.url()), false);
      }
    }
    Ok(Err(err)) => {
      backend.set_alive(false);
      events.log(&format!("backend {} failed its health probe: {err}", backend.url()), true);
    }
    Err(_elapsed) => {
      backend.set_alive(false);
      events.log(&format!("backend {} health probe timed out", backend.url()), true);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::NullEventSink;

  #[tokio::test]
  async fn probe_marks_unreachable_backend_dead() {
    let backend = Arc::new(Backend::new("http://127.0.0.1:1", 1, 3).unwrap());
    probe_one(&backend, &(Arc::new(NullEventSink) as Arc<dyn EventSink>)).await;
    assert!(!backend.is_alive());
  }

  #[tokio::test]
  async fn probe_revives_and_resets_failures_on_success() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      loop {
        if listener.accept().await.is_err() {
          return;
        }
      }
    });

    let backend = Arc::new(Backend::new(&format!("http://{addr}"), 1, 1).unwrap());
    backend.set_alive(false);
    probe_one(&backend, &(Arc::new(NullEventSink) as Arc<dyn EventSink>)).await;
    assert!(backend.is_alive());
  }
}
