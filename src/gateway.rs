// The gateway client: two-tier cache in front of single-flight deduplication
// in front of the request executor. Every rate-limited upstream call made by
// the domain accessors goes through `fetch`.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    cache::TwoTierCache,
    cache_key::CacheKey,
    config::GatewayConfig,
    dedupe::Deduplicator,
    error::{ConfigError, GatewayError},
    executor::{HttpMethod, RequestDescriptor, RequestExecutor},
};

// Lifetimes for the ephemeral (session) and shared (persistent) tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub session: Duration,
    pub persistent: Duration,
}

impl CacheTtl {
    pub const fn new(session: Duration, persistent: Duration) -> Self {
        Self {
            session,
            persistent,
        }
    }

    pub const fn minutes(session: u64, persistent: u64) -> Self {
        Self::new(
            Duration::from_secs(session * 60),
            Duration::from_secs(persistent * 60),
        )
    }

    pub const fn hours(session: u64, persistent: u64) -> Self {
        Self::minutes(session * 60, persistent * 60)
    }
}

pub struct GatewayClient<V = Value> {
    executor: Arc<RequestExecutor>,
    cache: TwoTierCache<V>,
    dedupe: Deduplicator<V>,
}

impl<V: Clone + Send + Sync + 'static> GatewayClient<V> {
    pub fn new(executor: Arc<RequestExecutor>, cache: TwoTierCache<V>, dedupe: Deduplicator<V>) -> Self {
        Self {
            executor,
            cache,
            dedupe,
        }
    }

    pub async fn fetch<F, Fut>(
        &self,
        key: &CacheKey,
        session_ttl: Duration,
        persistent_ttl: Duration,
        request_fn: F,
    ) -> Result<V, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, GatewayError>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(key.as_str()) {
            return Ok(value);
        }
        debug!(key = %key, "cache miss");

        let cache = self.cache.clone();
        let cache_key = key.as_str().to_string();

        self.dedupe
            .dedupe(key.as_str(), move || -> BoxFuture<'static, Result<V, GatewayError>> {
                // A call for this key may have settled between our cache
                // check and taking the pending slot; its result is cached
                // before the slot is released.
                if let Some(value) = cache.get(&cache_key) {
                    return future::ready(Ok(value)).boxed();
                }

                let request = request_fn();
                async move {
                    let value = request.await?;
                    cache.set(&cache_key, value.clone(), session_ttl, persistent_ttl);
                    Ok(value)
                }
                .boxed()
            })
            .await
    }

    // Drop every cached entry whose key starts with `prefix`, in both tiers.
    pub fn invalidate(&self, prefix: &str) -> usize {
        self.cache.invalidate_prefix(prefix)
    }

    pub fn spawn_sweepers(&self) -> [JoinHandle<()>; 2] {
        self.cache.spawn_sweepers()
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn cache(&self) -> &TwoTierCache<V> {
        &self.cache
    }

    pub fn deduplicator(&self) -> &Deduplicator<V> {
        &self.dedupe
    }
}

impl GatewayClient<Value> {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let executor = RequestExecutor::from_config(config)?;
        let cache = TwoTierCache::from_config(config.ephemeral_cache.clone(), config.shared_cache.clone());
        Ok(Self::new(Arc::new(executor), cache, Deduplicator::new()))
    }

    // A descriptor carrying the configured default deadline.
    pub fn request(&self, method: HttpMethod, endpoint: impl Into<String>) -> RequestDescriptor {
        RequestDescriptor::new(method, endpoint).with_timeout(self.executor.default_timeout())
    }

    // Fetch raw upstream JSON for `request`, cached under `key`.
    pub async fn fetch_json(
        &self,
        key: &CacheKey,
        ttl: CacheTtl,
        request: RequestDescriptor,
    ) -> Result<Value, GatewayError> {
        let executor = self.executor.clone();
        self.fetch(key, ttl.session, ttl.persistent, move || async move {
            executor.execute(&request).await
        })
        .await
    }
}
