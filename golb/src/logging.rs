//! An `EventSink` backed by an unbounded `async-channel`: `log` never
//! blocks the caller, and a single background task does the actual
//! writing so concurrent request tasks never contend on stdout/stderr.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use chrono::Utc;
use golb_core::EventSink;

struct LogMessage {
  timestamp: chrono::DateTime<Utc>,
  message: String,
  is_error: bool,
}

pub struct ChannelEventSink {
  sender: Sender<LogMessage>,
}

impl EventSink for ChannelEventSink {
  fn log(&self, message: &str, is_error: bool) {
    let entry = LogMessage {
      timestamp: Utc::now(),
      message: message.to_string(),
      is_error,
    };
    // The channel is unbounded, so this only fails once every receiver
    // (i.e. the flush task) has been dropped, at which point there is
    // nowhere left to log to anyway.
    let _ = self.sender.try_send(entry);
  }
}

/// Builds the sink plus the future that drains it. The caller is
/// responsible for spawning the returned future and for dropping the
/// sink (or calling [`ChannelEventSink::close`]) to let it finish.
pub fn channel_event_sink() -> (Arc<ChannelEventSink>, impl std::future::Future<Output = ()>) {
  let (sender, receiver) = async_channel::unbounded();
  let sink = Arc::new(ChannelEventSink { sender });
  (sink, flush_loop(receiver))
}

impl ChannelEventSink {
  /// Stops accepting new messages so the flush task can drain what's
  /// queued and return.
  pub fn close(&self) {
    self.sender.close();
  }
}

async fn flush_loop(receiver: Receiver<LogMessage>) {
  while let Ok(entry) = receiver.recv().await {
    let line = format!("[{}] {}", entry.timestamp.to_rfc3339(), entry.message);
    if entry.is_error {
      eprintln!("{line}");
    } else {
      println!("{line}");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn close_lets_flush_task_finish() {
    let (sink, flush) = channel_event_sink();
    sink.log("hello", false);
    sink.close();
    tokio::time::timeout(std::time::Duration::from_secs(1), flush).await.unwrap();
  }
}
