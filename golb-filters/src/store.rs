//! The key/value contract the rate-limit and cache filters depend on:
//! `GET`, `INCR`, `EXPIRE`, `SET ... EX`, and a pipelined batch of writes.
//! An in-process implementation is an accepted substitute for single-node
//! deployments; a networked store (e.g. Redis) would implement the same
//! trait without the filters changing at all.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

/// Returned when the store cannot currently be reached. Filters treat this
/// as a transient failure: rate limiting fails open, cache reads are
/// treated as misses.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "store error: {}", self.0)
  }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait Store: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
  /// Increments `key` by one, creating it at 1 if absent, and returns the
  /// new value. Callers are responsible for calling `expire` on the first
  /// increment of a new window.
  async fn incr(&self, key: &str) -> Result<i64, StoreError>;
  async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
  async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;
  /// Writes every entry in one batch; an external store would pipeline
  /// these as a single round trip.
  async fn pipeline_set_ex(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> Result<(), StoreError> {
    for (key, value, ttl) in entries {
      self.set_ex(&key, value, ttl).await?;
    }
    Ok(())
  }
}

struct Entry {
  value: Vec<u8>,
  expires_at: Option<Instant>,
}

impl Entry {
  fn is_expired(&self) -> bool {
    matches!(self.expires_at, Some(at) if Instant::now() >= at)
  }
}

/// A concurrent map with per-key TTLs, satisfying the [`Store`] contract
/// without any network hop. Expired entries are reaped lazily on access.
/// Keyed with `FxHash` rather than the default SipHash: cache and
/// rate-limit keys are internally generated strings, not attacker-chosen
/// input, so the collision resistance SipHash buys isn't needed here.
pub struct InProcessStore {
  entries: DashMap<String, Entry, FxBuildHasher>,
}

impl InProcessStore {
  pub fn new() -> Arc<InProcessStore> {
    Arc::new(InProcessStore {
      entries: DashMap::with_hasher(FxBuildHasher),
    })
  }
}

#[async_trait]
impl Store for InProcessStore {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let Some(entry) = self.entries.get(key) else {
      return Ok(None);
    };
    if entry.is_expired() {
      drop(entry);
      self.entries.remove(key);
      return Ok(None);
    }
    Ok(Some(entry.value.clone()))
  }

  async fn incr(&self, key: &str) -> Result<i64, StoreError> {
    let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
      value: b"0".to_vec(),
      expires_at: None,
    });
    if entry.is_expired() {
      entry.value = b"0".to_vec();
      entry.expires_at = None;
    }
    let current: i64 = std::str::from_utf8(&entry.value)
      .ok()
      .and_then(|s| s.parse().ok())
      .unwrap_or(0);
    let updated = current + 1;
    entry.value = updated.to_string().into_bytes();
    Ok(updated)
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
    if let Some(mut entry) = self.entries.get_mut(key) {
      entry.expires_at = Some(Instant::now() + ttl);
    }
    Ok(())
  }

  async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
    self.entries.insert(
      key.to_string(),
      Entry {
        value,
        expires_at: Some(Instant::now() + ttl),
      },
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn incr_starts_at_one_and_accumulates() {
    let store = InProcessStore::new();
    assert_eq!(store.incr("k").await.unwrap(), 1);
    assert_eq!(store.incr("k").await.unwrap(), 2);
    assert_eq!(store.incr("k").await.unwrap(), 3);
  }

  #[tokio::test]
  async fn get_returns_none_after_expiry() {
    let store = InProcessStore::new();
    store.set_ex("k", b"v".to_vec(), Duration::from_millis(10)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn expire_resets_counter_after_ttl() {
    let store = InProcessStore::new();
    assert_eq!(store.incr("k").await.unwrap(), 1);
    store.expire("k", Duration::from_millis(10)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.incr("k").await.unwrap(), 1);
  }

  #[tokio::test]
  async fn pipeline_set_ex_writes_every_entry() {
    let store = InProcessStore::new();
    store
      .pipeline_set_ex(vec![
        ("a".to_string(), b"1".to_vec(), Duration::from_secs(60)),
        ("b".to_string(), b"2".to_vec(), Duration::from_secs(60)),
      ])
      .await
      .unwrap();
    assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
    assert_eq!(store.get("b").await.unwrap(), Some(b"2".to_vec()));
  }
}
