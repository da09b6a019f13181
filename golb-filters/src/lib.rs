//! Request-path filters — authentication, rate limiting, caching — and the
//! store contract they share, composed around a dispatcher.

pub mod auth;
pub mod cache;
pub mod chain;
pub mod ratelimit;
pub mod store;

pub use auth::AuthFilter;
pub use cache::CacheFilter;
pub use chain::build_chain;
pub use ratelimit::RateLimitFilter;
pub use store::{InProcessStore, Store, StoreError};
