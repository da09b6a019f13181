//! The fixed set of backends plus the strategy used to pick among them.

use std::sync::Arc;

use golb_config::StrategyKind;

use crate::backend::Backend;
use crate::strategy::Strategy;

/// An ordered, immutable-after-construction set of backends and the
/// strategy that selects among them. Registration happens once at startup;
/// the pool never mutates the backend list afterward.
pub struct ServerPool {
  backends: Vec<Arc<Backend>>,
  strategy: Strategy,
}

impl ServerPool {
  pub fn new(backends: Vec<Arc<Backend>>, strategy_kind: StrategyKind) -> ServerPool {
    ServerPool {
      backends,
      strategy: Strategy::new(strategy_kind),
    }
  }

  /// Delegates to the pool's strategy. Returns `None` if no backend is
  /// currently alive.
  pub fn next_peer(&self) -> Option<Arc<Backend>> {
    self.strategy.select(&self.backends)
  }

  pub fn backends(&self) -> &[Arc<Backend>] {
    &self.backends
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next_peer_returns_none_for_empty_pool() {
    let pool = ServerPool::new(vec![], StrategyKind::RoundRobin);
    assert!(pool.next_peer().is_none());
  }

  #[test]
  fn next_peer_returns_none_when_all_backends_dead() {
    let backend = Arc::new(Backend::new("http://127.0.0.1:9001", 1, 3).unwrap());
    backend.set_alive(false);
    let pool = ServerPool::new(vec![backend], StrategyKind::RoundRobin);
    assert!(pool.next_peer().is_none());
  }

  #[test]
  fn next_peer_round_robins_over_registration_order() {
    let a = Arc::new(Backend::new("http://a.invalid", 1, 3).unwrap());
    let b = Arc::new(Backend::new("http://b.invalid", 1, 3).unwrap());
    let pool = ServerPool::new(vec![a, b], StrategyKind::RoundRobin);
    let first = pool.next_peer().unwrap();
    let second = pool.next_peer().unwrap();
    assert_ne!(first.url(), second.url());
  }
}
