//! The dispatch engine: backend pool, selection strategies, the
//! reverse-proxy client, health probing, and the handler seam filters wrap.

pub mod backend;
pub mod body;
pub mod dispatch;
pub mod events;
pub mod handler;
pub mod health;
pub mod pool;
pub mod remote;
pub mod strategy;

pub use backend::Backend;
pub use body::ProxyBody;
pub use dispatch::Dispatcher;
pub use events::EventSink;
pub use handler::Handler;
pub use pool::ServerPool;
pub use remote::ClientAddr;
pub use strategy::Strategy;
