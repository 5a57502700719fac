// In-process fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    cache::TwoTierCache,
    config::{CacheConfig, RetryConfig},
    dedupe::Deduplicator,
    error::GatewayError,
    executor::{RequestDescriptor, RequestExecutor},
    gateway::GatewayClient,
    retry::RetryPolicy,
    token::{CredentialSource, TokenGrant, TokenManager},
    transport::{Transport, UpstreamResponse},
};

// Issues tok-1, tok-2, ... valid for half an hour each.
#[derive(Default)]
pub(crate) struct CountingCredentials {
    calls: AtomicU32,
}

#[async_trait]
impl CredentialSource for CountingCredentials {
    async fn exchange(&self) -> Result<TokenGrant, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenGrant {
            access_token: format!("tok-{n}"),
            expires_in: 1799,
        })
    }
}

type Scripted = Result<UpstreamResponse, GatewayError>;

// Replays queued responses in order, then falls back to `respond_always`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Option<Scripted>>,
    seen: Mutex<Vec<(RequestDescriptor, String)>>,
    delay: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn push(&self, response: Scripted) {
        self.script.lock().push_back(response);
    }

    pub(crate) fn respond_always(&self, response: Scripted) {
        *self.fallback.lock() = Some(response);
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<RequestDescriptor> {
        self.seen.lock().iter().map(|(request, _)| request.clone()).collect()
    }

    pub(crate) fn tokens_seen(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(_, token)| token.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        bearer_token: &str,
    ) -> Result<UpstreamResponse, GatewayError> {
        self.seen
            .lock()
            .push((request.clone(), bearer_token.to_string()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(response) => response,
            None => self
                .fallback
                .lock()
                .clone()
                .unwrap_or_else(|| Err(GatewayError::Unknown("no scripted response".into()))),
        }
    }
}

pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_backoff_ms: 100,
        max_backoff_ms: 1000,
        max_jitter_ms: 100,
    }
}

pub(crate) fn scripted_executor(transport: Arc<ScriptedTransport>) -> Arc<RequestExecutor> {
    let tokens = TokenManager::new(
        Arc::new(CountingCredentials::default()),
        Duration::from_secs(300),
    );
    Arc::new(RequestExecutor::new(
        transport,
        Arc::new(tokens),
        RetryPolicy::new(fast_retry()),
    ))
}

pub(crate) fn scripted_gateway(transport: Arc<ScriptedTransport>) -> Arc<GatewayClient> {
    let cache = TwoTierCache::from_config(
        CacheConfig::ephemeral().with_max_entries(100),
        CacheConfig::shared().with_max_entries(1000),
    );
    Arc::new(GatewayClient::new(
        scripted_executor(transport),
        cache,
        Deduplicator::new(),
    ))
}
