// Gateway configuration: connection settings, retry behaviour and the two
// cache tiers. Everything has a sensible default; `from_env` overlays the
// process environment for deployments.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://test.api.amadeus.com";

const ENV_BASE_URL: &str = "TRAVEL_API_BASE_URL";
const ENV_CLIENT_ID: &str = "TRAVEL_API_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "TRAVEL_API_CLIENT_SECRET";
const ENV_TIMEOUT_MS: &str = "TRAVEL_API_TIMEOUT_MS";
const ENV_MAX_RETRIES: &str = "TRAVEL_API_MAX_RETRIES";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout_ms: u64,
    pub token_refresh_buffer_secs: u64,
    pub retry: RetryConfig,
    pub ephemeral_cache: CacheConfig,
    pub shared_cache: CacheConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_ms: 10_000,
            token_refresh_buffer_secs: 300,
            retry: RetryConfig::default(),
            ephemeral_cache: CacheConfig::ephemeral(),
            shared_cache: CacheConfig::shared(),
        }
    }
}

// Retry configuration for rate-limited upstream calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            max_jitter_ms: 1000,
        }
    }
}

// Cache configuration options, one per tier
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    // None evicts 10% of capacity per pass
    pub eviction_batch: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::ephemeral()
    }
}

impl CacheConfig {
    pub fn ephemeral() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_seconds: 300,
            cleanup_interval_seconds: 60,
            eviction_batch: None,
        }
    }

    pub fn shared() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl_seconds: 3600,
            cleanup_interval_seconds: 300,
            eviction_batch: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn eviction_batch(&self) -> usize {
        self.eviction_batch
            .unwrap_or(self.max_entries / 10)
            .clamp(1, self.max_entries.max(1))
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        config.client_id = std::env::var(ENV_CLIENT_ID).map_err(|_| ConfigError::Missing(ENV_CLIENT_ID))?;
        config.client_secret =
            std::env::var(ENV_CLIENT_SECRET).map_err(|_| ConfigError::Missing(ENV_CLIENT_SECRET))?;

        if let Ok(raw) = std::env::var(ENV_TIMEOUT_MS) {
            config.request_timeout_ms = parse_number(ENV_TIMEOUT_MS, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_RETRIES) {
            config.retry.max_retries = parse_number(ENV_MAX_RETRIES, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "base_url",
                reason: format!("expected an http(s) url, got {:?}", self.base_url),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        for (key, tier) in [
            ("ephemeral_cache.max_entries", &self.ephemeral_cache),
            ("shared_cache.max_entries", &self.shared_cache),
        ] {
            if tier.max_entries == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn token_refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.token_refresh_buffer_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
