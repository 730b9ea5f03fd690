use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::cache::{CacheKeys, MemoryResponseCache, ResponseCache};
use crate::store::Store;
use crate::{RecordId, ServerConfig};

/// State shared by every handler.
///
/// Store calls block. On the multi-threaded tokio runtime they run under `block_in_place`, on
/// a current-thread runtime they stall the runtime for their duration.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The record store.
    pub store: Arc<Store>,
    /// Response cache, `None` when caching is disabled.
    pub cache: Option<Arc<dyn ResponseCache>>,
    /// Key layout of `cache`.
    pub cache_keys: CacheKeys,
    /// Startup configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Builds the state, creating an in-memory response cache if the config enables one.
    pub fn new(store: Arc<Store>, config: ServerConfig) -> Self {
        let cache = config.cache_enabled.then(|| {
            Arc::new(MemoryResponseCache::new(config.cache_capacity_bytes)) as Arc<dyn ResponseCache>
        });
        Self::with_cache(store, cache, config)
    }

    /// Builds the state around an explicit cache.
    pub fn with_cache(
        store: Arc<Store>,
        cache: Option<Arc<dyn ResponseCache>>,
        config: ServerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            cache_keys: CacheKeys::new(config.cache_key_prefix.clone()),
            config: Arc::new(config),
        }
    }

    /// Evicts the cached listing of `resource` and, when given, the record `id`.
    pub fn invalidate(&self, resource: &str, id: Option<RecordId>) {
        if let Some(cache) = &self.cache {
            self.cache_keys.invalidate(cache.as_ref(), resource, id);
        }
    }

    /// Evicts the cached latest-order view of `user_id`.
    pub fn invalidate_latest_order(&self, user_id: RecordId) {
        if let Some(cache) = &self.cache {
            cache.delete(&self.cache_keys.latest_order(user_id));
        }
    }
}

/// Runs blocking store work without stalling the async runtime's other tasks.
///
/// `block_in_place` is only available on the multi-threaded runtime. Anywhere else the work
/// runs inline on the current thread.
pub(crate) fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_on_multi_thread_runtime() {
        assert_eq!(4, blocking(|| 2 + 2));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_on_current_thread_runtime_runs_inline() {
        let caller = std::thread::current().id();
        assert_eq!(caller, blocking(|| std::thread::current().id()));
    }

    #[test]
    fn blocking_outside_a_runtime() {
        assert_eq!("done", blocking(|| "done"));
    }
}
