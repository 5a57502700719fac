// Error taxonomy shared by every layer of the gateway.
//
// `GatewayError` is `Clone` because a single failed upstream call is handed
// to every caller waiting on the same in-flight request.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Upstream server error: {status} - {message}")]
    Upstream { status: u16, message: String },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Maximum retry attempts exceeded")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl GatewayError {
    // Maps a non-success HTTP status and the message extracted from its body.
    // An embedded rate-limit message wins over the status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if mentions_rate_limit(&message) {
            return GatewayError::RateLimited(message);
        }

        match status {
            400 => GatewayError::Validation(message),
            401 | 403 => GatewayError::Auth(message),
            404 => GatewayError::NotFound(message),
            429 => GatewayError::RateLimited(message),
            500..=599 => GatewayError::Upstream { status, message },
            _ => GatewayError::Unknown(format!("HTTP {status}: {message}")),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            GatewayError::RateLimited(_) => true,
            GatewayError::Unknown(msg) | GatewayError::Network(msg) => mentions_rate_limit(msg),
            _ => false,
        }
    }

    // The innermost error, looking through retry exhaustion.
    pub fn root(&self) -> &GatewayError {
        match self {
            GatewayError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Initialization error: {0}")]
    Init(String),
}
