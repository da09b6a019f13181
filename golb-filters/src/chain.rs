//! Wires the three request filters around the dispatcher, in the order
//! rate-limit -> auth -> cache -> dispatcher. Metrics is not part of this
//! chain: it wraps the whole thing from the outside, in the binary crate,
//! so the dispatch engine has no compile-time dependency on a metrics
//! backend.

use std::sync::Arc;

use golb_config::Config;
use golb_core::{Dispatcher, Handler};

use crate::auth::AuthFilter;
use crate::cache::CacheFilter;
use crate::ratelimit::RateLimitFilter;
use crate::store::Store;

pub fn build_chain(config: &Config, store: Arc<dyn Store>, dispatcher: Dispatcher) -> Arc<dyn Handler> {
  let cache = CacheFilter::new(config.enable_cache, store.clone(), dispatcher);
  let auth = AuthFilter::new(config.enable_auth, config.auth_token.clone(), cache);
  let rate_limited = RateLimitFilter::new(config.enable_ratelimit, config.rate_limit_per_min, store, auth);
  Arc::new(rate_limited)
}
