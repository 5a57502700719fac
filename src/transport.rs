// The network seam. `RequestExecutor` only ever talks to a `Transport`, which
// lets tests swap the real HTTP client for an in-process fake.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

use crate::{executor::RequestDescriptor, error::GatewayError};

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(
        &self,
        request: &RequestDescriptor,
        bearer_token: &str,
    ) -> Result<UpstreamResponse, GatewayError>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        bearer_token: &str,
    ) -> Result<UpstreamResponse, GatewayError> {
        let method = Method::from(request.method());
        let url = format!("{}{}", self.base_url, request.endpoint());

        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(bearer_token)
            .header(reqwest::header::ACCEPT, "application/json");

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(request.timeout().as_millis() as u64)
            } else {
                GatewayError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(format!("failed reading response body: {e}")))?;

        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::HttpMethod;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn test_get_with_query_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/reference-data/airlines"))
            .and(query_param("airlineCodes", "AI"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(reqwest::Client::new(), &format!("{}/", server.uri()));
        let request = RequestDescriptor::get("/v1/reference-data/airlines").with_query("airlineCodes", "AI");

        let response = transport.send(&request, "tok").await.unwrap();
        assert!(response.is_success());
        assert_eq!(&response.body[..], br#"{"data":[]}"#);
    }

    #[tokio::test]
    async fn test_post_json_body_and_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/shopping/flight-offers/pricing"))
            .and(body_json(serde_json::json!({"data": {"type": "flight-offers-pricing"}})))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad offer"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(reqwest::Client::new(), &server.uri());
        let request = RequestDescriptor::new(HttpMethod::Post, "/v1/shopping/flight-offers/pricing")
            .with_body(serde_json::json!({"data": {"type": "flight-offers-pricing"}}));

        let response = transport.send(&request, "tok").await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(&response.body[..], b"bad offer");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // nothing listens on port 9 locally
        let transport = HttpTransport::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let request = RequestDescriptor::get("/anything");

        let result = transport.send(&request, "tok").await;
        assert!(matches!(result, Err(GatewayError::Network(_))));
    }
}
