// Executes a single logical upstream call.
//
// Each attempt acquires a valid token, sends the request under its deadline
// and classifies the response. A 401 gets exactly one forced token refresh
// and one resend. Rate-limit failures are retried by the `RetryPolicy`
// wrapped around the whole attempt.

use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::GatewayConfig,
    error::{ConfigError, GatewayError},
    retry::RetryPolicy,
    token::{AccessToken, ClientCredentials, TokenManager},
    transport::{HttpTransport, Transport, UpstreamResponse},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_ERROR_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

// Everything needed to issue one upstream call. Built once through the
// consuming `with_*` methods and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: HttpMethod,
    endpoint: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Duration,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, endpoint).with_body(body)
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_optional_query<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
    retry: RetryPolicy,
    default_timeout: Duration,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenManager>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            tokens,
            retry,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    // Production wiring: reqwest for both the token endpoint and API calls.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("travel-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Init(format!("failed to build HTTP client: {e}")))?;

        let credentials = ClientCredentials::from_config(http.clone(), config);
        let tokens = TokenManager::new(Arc::new(credentials), config.token_refresh_buffer())
            .with_exchange_timeout(config.request_timeout());
        let transport = HttpTransport::new(http, &config.base_url);

        Ok(
            Self::new(Arc::new(transport), Arc::new(tokens), RetryPolicy::new(config.retry.clone()))
                .with_default_timeout(config.request_timeout()),
        )
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Value, GatewayError> {
        let operation = format!("{} {}", request.method().as_str(), request.endpoint());
        self.retry
            .run(&operation, || self.execute_once(request))
            .await
    }

    async fn execute_once(&self, request: &RequestDescriptor) -> Result<Value, GatewayError> {
        // a token endpoint that never answers must not outlive the deadline
        let token = self
            .within_deadline(request, "token", self.tokens.ensure_valid_token())
            .await?;
        let mut response = self.send(request, &token).await?;

        if response.status == 401 {
            warn!(endpoint = request.endpoint(), "access token rejected, forcing refresh");
            let fresh = self
                .within_deadline(request, "token", self.tokens.force_refresh(&token))
                .await?;
            response = self.send(request, &fresh).await?;
        }

        decode_response(response)
    }

    async fn send(
        &self,
        request: &RequestDescriptor,
        token: &AccessToken,
    ) -> Result<UpstreamResponse, GatewayError> {
        debug!(
            method = request.method().as_str(),
            endpoint = request.endpoint(),
            timeout_ms = request.timeout().as_millis() as u64,
            "sending upstream request"
        );
        self.within_deadline(request, "send", self.transport.send(request, &token.value))
            .await
    }

    // Dropping `step_future` on expiry cancels it.
    async fn within_deadline<T, F>(
        &self,
        request: &RequestDescriptor,
        step: &'static str,
        step_future: F,
    ) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let deadline = request.timeout();
        match tokio::time::timeout(deadline, step_future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(endpoint = request.endpoint(), step, "upstream request timed out");
                Err(GatewayError::Timeout(deadline.as_millis() as u64))
            }
        }
    }
}

fn decode_response(response: UpstreamResponse) -> Result<Value, GatewayError> {
    if !response.is_success() {
        let message = extract_error_message(&response.body);
        return Err(GatewayError::from_status(response.status, message));
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&response.body)
        .map_err(|e| GatewayError::Unknown(format!("invalid JSON in upstream response: {e}")))
}

// Pulls a human readable message out of an upstream error body. Understands
// the `errors: [{detail, title}]` shape, OAuth style `error_description` and
// a plain `message`; anything else falls back to the raw text.
pub fn extract_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        let first_error = value.get("errors").and_then(|errors| errors.get(0));
        let candidates = [
            first_error.and_then(|e| e.get("detail")),
            first_error.and_then(|e| e.get("title")),
            value.get("error_description"),
            value.get("message"),
        ];

        if let Some(message) = candidates.into_iter().flatten().find_map(Value::as_str) {
            return message.to_string();
        }
    }

    let raw = String::from_utf8_lossy(body);
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{fast_retry, scripted_executor, ScriptedTransport},
        token::{CredentialSource, TokenGrant},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use tokio_test::assert_err;

    // A token endpoint that accepts the connection and never answers.
    struct StalledCredentials;

    #[async_trait]
    impl CredentialSource for StalledCredentials {
        async fn exchange(&self) -> Result<TokenGrant, GatewayError> {
            futures::future::pending().await
        }
    }

    fn ok(value: Value) -> Result<UpstreamResponse, GatewayError> {
        Ok(UpstreamResponse::json(200, &value))
    }

    fn status(code: u16, value: Value) -> Result<UpstreamResponse, GatewayError> {
        Ok(UpstreamResponse::json(code, &value))
    }

    #[tokio::test]
    async fn test_success_is_passed_through_with_bearer() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(ok(json!({"data": [{"id": "1"}]})));
        let executor = scripted_executor(transport.clone());

        let value = executor
            .execute(&RequestDescriptor::get("/v2/shopping/flight-offers"))
            .await
            .unwrap();

        assert_eq!(value, json!({"data": [{"id": "1"}]}));
        assert_eq!(transport.tokens_seen(), vec!["tok-1".to_string()]);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once_and_resends() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(status(401, json!({"errors": [{"title": "Access token expired"}]})));
        transport.push(ok(json!({"data": "fresh"})));
        let executor = scripted_executor(transport.clone());

        let value = executor.execute(&RequestDescriptor::get("/x")).await.unwrap();
        assert_eq!(value, json!({"data": "fresh"}));
        assert_eq!(transport.tokens_seen(), vec!["tok-1".to_string(), "tok-2".to_string()]);
        assert_eq!(executor.tokens().refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_repeated_unauthorized_gives_up() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(status(401, json!({"errors": [{"detail": "invalid token"}]})));
        transport.push(status(401, json!({"errors": [{"detail": "invalid token"}]})));
        transport.push(ok(json!({})));
        let executor = scripted_executor(transport.clone());

        let result = executor.execute(&RequestDescriptor::get("/x")).await;
        assert_eq!(result, Err(GatewayError::Auth("invalid token".into())));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retried_until_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(status(429, json!({"errors": [{"detail": "Too many requests"}]})));
        transport.push(status(429, json!({"errors": [{"detail": "Too many requests"}]})));
        transport.push(ok(json!({"data": 3})));
        let executor = scripted_executor(transport.clone());

        let value = executor.execute(&RequestDescriptor::get("/x")).await.unwrap();
        assert_eq!(value, json!({"data": 3}));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_after_four_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_always(status(429, json!({"message": "quota"})));
        let executor = scripted_executor(transport.clone());

        let err = assert_err!(executor.execute(&RequestDescriptor::get("/x")).await);
        assert_eq!(err.to_string(), "Maximum retry attempts exceeded");
        assert_eq!(err.root(), &GatewayError::RateLimited("quota".into()));
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_embedded_rate_limit_message_is_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(status(500, json!({"errors": [{"detail": "Rate limit exceeded for this key"}]})));
        transport.push(ok(json!(true)));
        let executor = scripted_executor(transport.clone());

        assert_eq!(executor.execute(&RequestDescriptor::get("/x")).await, Ok(json!(true)));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_slow_call() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_secs(5)));
        transport.respond_always(ok(json!({})));
        let executor = scripted_executor(transport.clone());

        let request = RequestDescriptor::get("/slow").with_timeout(Duration::from_millis(100));
        assert_eq!(executor.execute(&request).await, Err(GatewayError::Timeout(100)));
        // timeouts are terminal
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_token_acquisition() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_always(ok(json!({})));
        let tokens = TokenManager::new(Arc::new(StalledCredentials), Duration::from_secs(300));
        let executor = RequestExecutor::new(
            transport.clone(),
            Arc::new(tokens),
            RetryPolicy::new(fast_retry()),
        );

        let request = RequestDescriptor::get("/x").with_timeout(Duration::from_millis(100));
        assert_eq!(executor.execute(&request).await, Err(GatewayError::Timeout(100)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_terminal_statuses_are_classified() {
        let cases = [
            (400, json!({"errors": [{"detail": "departureDate in the past"}]}), GatewayError::Validation("departureDate in the past".into())),
            (404, json!({"errors": [{"title": "RESOURCE NOT FOUND"}]}), GatewayError::NotFound("RESOURCE NOT FOUND".into())),
            (
                502,
                json!({"message": "bad gateway"}),
                GatewayError::Upstream {
                    status: 502,
                    message: "bad gateway".into(),
                },
            ),
        ];

        for (code, body, expected) in cases {
            let transport = Arc::new(ScriptedTransport::new());
            transport.push(status(code, body));
            let executor = scripted_executor(transport.clone());

            assert_eq!(executor.execute(&RequestDescriptor::get("/x")).await, Err(expected));
            assert_eq!(transport.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_empty_and_malformed_bodies() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(Ok(UpstreamResponse::new(204, "")));
        transport.push(Ok(UpstreamResponse::new(200, "<html>")));
        let executor = scripted_executor(transport.clone());

        assert_eq!(executor.execute(&RequestDescriptor::get("/x")).await, Ok(Value::Null));
        assert!(matches!(
            executor.execute(&RequestDescriptor::get("/x")).await,
            Err(GatewayError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_network_error_is_surfaced() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(Err(GatewayError::Network("connection refused".into())));
        let executor = scripted_executor(transport.clone());

        assert_eq!(
            executor.execute(&RequestDescriptor::get("/x")).await,
            Err(GatewayError::Network("connection refused".into()))
        );
    }

    #[test]
    fn test_extract_error_message_fallbacks() {
        assert_eq!(
            extract_error_message(br#"{"error":"invalid_client","error_description":"bad secret"}"#),
            "bad secret"
        );
        assert_eq!(extract_error_message(b"  plain text  "), "plain text");
        assert_eq!(extract_error_message(b""), "empty response body");
        assert_eq!(extract_error_message(&[b'x'; 500]).len(), 200);
    }

    #[test]
    fn test_descriptor_builder() {
        let request = RequestDescriptor::get("/v1/reference-data/locations")
            .with_query("keyword", "PAR")
            .with_optional_query("page[limit]", Some(10))
            .with_optional_query::<u32>("page[offset]", None)
            .with_timeout(Duration::from_secs(3));

        assert_eq!(request.method(), HttpMethod::Get);
        assert_eq!(request.query().len(), 2);
        assert_eq!(request.query_value("page[limit]"), Some("10"));
        assert_eq!(request.timeout(), Duration::from_secs(3));
        assert!(request.body().is_none());
    }
}
