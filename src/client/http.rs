//! reqwest-backed implementation of [`ApiClient`].

use super::error::ClientError;
use super::middleware::{RequestInterceptor, ResponseInterceptor};
use super::ApiClient;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connection settings for the billing backend.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// HTTP client for the billing backend.
pub struct HttpClient {
    config: HttpClientConfig,
    http: reqwest::Client,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl HttpClientBuilder {
    pub fn with_request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    pub fn with_response_interceptor(
        mut self,
        interceptor: Arc<dyn ResponseInterceptor>,
    ) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> Result<HttpClient, ClientError> {
        Url::parse(&self.config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.config.base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(HttpClient {
            config: self.config,
            http,
            request_interceptors: self.request_interceptors,
            response_interceptors: self.response_interceptors,
        })
    }
}

impl HttpClient {
    pub fn builder(config: HttpClientConfig) -> HttpClientBuilder {
        HttpClientBuilder {
            config,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, ClientError> {
        let joined = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", joined, e)))
    }
}

/// Read an error body, keeping JSON structure when there is one.
async fn error_body(response: reqwest::Response) -> Option<Value> {
    let text = response.text().await.unwrap_or_default();
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[async_trait]
impl ApiClient for HttpClient {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ClientError> {
        let url = self.url_for(path)?;
        debug!("GET {}", url);

        let mut request = self.http.get(url).query(query);
        for interceptor in &self.request_interceptors {
            request = interceptor.intercept(request);
        }

        let response = request.send().await.map_err(ClientError::from_reqwest)?;
        let status = response.status();

        for interceptor in &self.response_interceptors {
            interceptor.on_status(status);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized {
                body: error_body(response).await,
            });
        }

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let text = response.text().await.map_err(ClientError::from_reqwest)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
