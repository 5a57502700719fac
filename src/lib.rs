// API gateway client for a rate-limited travel content provider

// Core plumbing shared by every upstream call
pub mod cache;
pub mod cache_key;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod retry;
pub mod token;
pub mod transport;

// Typed accessors for flights, hotels, locations and activities
pub mod accessors;

pub mod telemetry;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use accessors::{AccessError, ApiResponse, TravelApi};
pub use cache::{CacheStats, CacheStore, TwoTierCache};
pub use cache_key::CacheKey;
pub use config::{CacheConfig, GatewayConfig, RetryConfig};
pub use dedupe::Deduplicator;
pub use error::{ConfigError, GatewayError};
pub use executor::{HttpMethod, RequestDescriptor, RequestExecutor};
pub use gateway::{CacheTtl, GatewayClient};
pub use retry::RetryPolicy;
pub use token::{AccessToken, ClientCredentials, CredentialSource, TokenManager};
pub use transport::{HttpTransport, Transport, UpstreamResponse};
