// OAuth2 client-credentials token management.
//
// The token is refreshed proactively once it is within `buffer` of expiry.
// Refreshing happens while holding the token lock, so any number of
// concurrent callers trigger a single credential exchange. The exchange is
// bounded by its own timeout so a stalled token endpoint cannot hold the lock
// indefinitely.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};
use tracing::{info, warn};

use crate::{config::GatewayConfig, error::GatewayError};

pub const TOKEN_PATH: &str = "/v1/security/oauth2/token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + expires_in,
        }
    }

    pub fn needs_refresh(&self, now: Instant, buffer: Duration) -> bool {
        now + buffer >= self.expires_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// Body of a successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    async fn exchange(&self) -> Result<TokenGrant, GatewayError>;
}

// Client-credentials grant against the upstream token endpoint
pub struct ClientCredentials {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_config(http: reqwest::Client, config: &GatewayConfig) -> Self {
        Self::new(http, &config.base_url, &config.client_id, &config.client_secret)
    }
}

#[async_trait]
impl CredentialSource for ClientCredentials {
    async fn exchange(&self) -> Result<TokenGrant, GatewayError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Auth(format!("credential exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| GatewayError::Auth(format!("malformed token response: {e}")))
    }
}

// How long a failed proactive refresh is remembered before the exchange is
// attempted again, while the current token is still valid.
const REFRESH_RETRY_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct TokenState {
    token: Option<AccessToken>,
    retry_refresh_at: Option<Instant>,
}

pub struct TokenManager {
    source: Arc<dyn CredentialSource>,
    buffer: Duration,
    exchange_timeout: Duration,
    state: Mutex<TokenState>,
    refreshes: AtomicU64,
}

impl TokenManager {
    pub fn new(source: Arc<dyn CredentialSource>, buffer: Duration) -> Self {
        Self {
            source,
            buffer,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            state: Mutex::new(TokenState::default()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.state = Mutex::new(TokenState {
            token: Some(token),
            retry_refresh_at: None,
        });
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub async fn ensure_valid_token(&self) -> Result<AccessToken, GatewayError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let existing = match state.token.as_ref() {
            Some(token) if !token.needs_refresh(now, self.buffer) => return Ok(token.clone()),
            Some(token) => Some(token.clone()),
            None => None,
        };

        if let (Some(token), Some(retry_at)) = (&existing, state.retry_refresh_at) {
            if now < retry_at && !token.is_expired(now) {
                return Ok(token.clone());
            }
        }

        match self.refresh_locked(&mut state).await {
            Ok(token) => Ok(token),
            // A proactive refresh failed but the old token still works.
            Err(err) => {
                let now = Instant::now();
                match existing {
                    Some(token) if !token.is_expired(now) => {
                        warn!(error = %err, "token refresh failed, using current token until expiry");
                        state.retry_refresh_at = Some(now + REFRESH_RETRY_INTERVAL);
                        Ok(token)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    // Replace `stale` after the upstream rejected it. If another caller has
    // already swapped it out, the newer token is returned without a second
    // exchange.
    pub async fn force_refresh(&self, stale: &AccessToken) -> Result<AccessToken, GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.token.as_ref() {
            if token != stale {
                return Ok(token.clone());
            }
        }
        self.refresh_locked(&mut state).await
    }

    pub async fn invalidate(&self) {
        *self.state.lock().await = TokenState::default();
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> Result<AccessToken, GatewayError> {
        let grant = tokio::time::timeout(self.exchange_timeout, self.source.exchange())
            .await
            .map_err(|_| {
                warn!(
                    timeout_ms = self.exchange_timeout.as_millis() as u64,
                    "credential exchange timed out"
                );
                GatewayError::Timeout(self.exchange_timeout.as_millis() as u64)
            })??;
        let token = AccessToken::new(grant.access_token, Duration::from_secs(grant.expires_in));

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!(expires_in = grant.expires_in, "access token refreshed");

        state.token = Some(token.clone());
        state.retry_refresh_at = None;
        Ok(token)
    }
}
