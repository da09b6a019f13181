//! Pure backend-selection policies. Each variant owns whatever state it
//! needs to stay fair or proportional across concurrent callers; strategies
//! never perform I/O.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::Backend;
use golb_config::StrategyKind;

/// The pluggable policy a [`crate::pool::ServerPool`] uses to pick the next
/// backend. Safe to call concurrently from many request tasks.
pub enum Strategy {
  RoundRobin { cursor: AtomicUsize },
  LeastConnections,
  /// Guarded by a mutex for the entire selection; the critical section is
  /// O(N) over backends and never suspends.
  WeightedRoundRobin { lock: Mutex<()> },
}

impl Strategy {
  pub fn new(kind: StrategyKind) -> Strategy {
    match kind {
      StrategyKind::RoundRobin => Strategy::RoundRobin {
        cursor: AtomicUsize::new(0),
      },
      StrategyKind::LeastConnections => Strategy::LeastConnections,
      StrategyKind::WeightedRoundRobin => Strategy::WeightedRoundRobin { lock: Mutex::new(()) },
    }
  }

  /// Returns a live backend, or `None` if every backend's `alive` flag was
  /// false at the moment it was sampled.
  pub fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
    match self {
      Strategy::RoundRobin { cursor } => select_round_robin(cursor, backends),
      Strategy::LeastConnections => select_least_connections(backends),
      Strategy::WeightedRoundRobin { lock } => {
        let _guard = lock.lock();
        select_weighted_round_robin(backends)
      }
    }
  }
}

fn select_round_robin(cursor: &AtomicUsize, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
  let n = backends.len();
  if n == 0 {
    return None;
  }
  let next = cursor.fetch_add(1, Ordering::Relaxed) % n;
  for offset in 0..n {
    let idx = (next + offset) % n;
    if backends[idx].is_alive() {
      if offset != 0 {
        // We skipped dead backends to get here; resume from this index
        // next time rather than walking past them again immediately.
        cursor.store(idx, Ordering::Relaxed);
      }
      return Some(backends[idx].clone());
    }
  }
  None
}

fn select_least_connections(backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
  let mut best: Option<&Arc<Backend>> = None;
  let mut min_connections = i64::MAX;
  for backend in backends {
    if !backend.is_alive() {
      continue;
    }
    let connections = backend.active_connections();
    if connections < min_connections {
      min_connections = connections;
      best = Some(backend);
    }
  }
  best.cloned()
}

/// The Nginx "smooth weighted round-robin" algorithm: every call, add each
/// live backend's static weight to its running `current_weight`, pick the
/// backend with the largest `current_weight`, then subtract the sum of live
/// weights from the winner. Interleaves selections proportionally instead
/// of emitting runs (weights {5,1,1} -> a,a,b,a,c,a,a).
fn select_weighted_round_robin(backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
  let live: Vec<&Arc<Backend>> = backends.iter().filter(|b| b.is_alive()).collect();
  if live.is_empty() {
    return None;
  }

  let total_weight: i64 = live.iter().map(|b| b.weight() as i64).sum();

  let mut winner: Option<&Arc<Backend>> = None;
  let mut winner_weight = i64::MIN;
  for backend in &live {
    let updated = backend.add_current_weight(backend.weight() as i64);
    if updated > winner_weight {
      winner_weight = updated;
      winner = Some(backend);
    }
  }

  let winner = winner.expect("live is non-empty");
  winner.sub_current_weight(total_weight);
  Some((*winner).clone())
}
