use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthError, TokenCodec};
use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::database::ShopStore;
use crate::ledger::RelationshipLedger;
use crate::limiter::RateLimiter;

/// Shared components handed to every handler and middleware.
///
/// Built once in `main` (or per test) and cloned into the router; each field is
/// an `Arc` so clones are cheap and every request sees the same counters, cache
/// entries and link locks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ShopStore>,
    pub tokens: Arc<TokenCodec>,
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub ledger: Arc<RelationshipLedger>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn ShopStore>) -> Result<Self, AuthError> {
        let tokens = TokenCodec::new(
            &config.security.token_secret,
            Duration::from_secs(config.security.token_lifetime_secs),
        )?;
        let cache = ResponseCache::new(config.cache.enabled);
        let ledger = RelationshipLedger::new(store.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
            limiter: Arc::new(RateLimiter::new()),
            cache: Arc::new(cache),
            ledger: Arc::new(ledger),
        })
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache.list_ttl_secs)
    }
}
