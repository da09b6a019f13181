//! Structured logging is an external collaborator, so the dispatch engine
//! only depends on this narrow sink trait rather than a concrete logging
//! stack. `golb`'s binary crate supplies the real implementation backed by
//! an `async-channel`.

/// A sink for operational events the dispatch engine wants recorded:
/// circuit trips, health-probe transitions, dispatch failures.
pub trait EventSink: Send + Sync {
  fn log(&self, message: &str, is_error: bool);
}

/// Discards every event; used in tests and wherever no sink is configured.
#[derive(Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
  fn log(&self, _message: &str, _is_error: bool) {}
}
