//! HTTP client for the moderation backend
//!
//! Thin wrapper over reqwest that joins paths onto a base URL, applies a
//! request timeout and maps every failure into a [`NetworkError`].

use crate::error::{NetworkError, Result};
use reqwest::multipart::Form;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for [`HttpClient`]
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL requests are resolved against (e.g. "http://localhost:3000")
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Headers added to every request
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: format!("Socio-io/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
        }
    }
}

impl HttpClientConfig {
    /// Create a config for a base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }
}

/// HTTP client bound to one backend
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new client
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(NetworkError::InvalidUrl("empty base URL".to_string()));
        }

        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::Setup(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Resolve a path against the base URL
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET a JSON document
    pub async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self
            .client
            .get(self.url(path))
            .header("Accept", "application/json");
        let response = self.send(request).await?;
        Self::parse_json(response).await
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);
        let response = self.send(request).await?;
        Self::parse_json(response).await
    }

    /// POST a multipart form and decode a JSON response
    pub async fn post_multipart<T>(&self, path: &str, form: Form) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).multipart(form);
        let response = self.send(request).await?;
        Self::parse_json(response).await
    }

    /// GET raw bytes from an absolute URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(self.client.get(url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Request(format!("Failed to read body: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn send(&self, mut request: RequestBuilder) -> Result<Response> {
        for (key, value) in &self.config.default_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(NetworkError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn parse_json<T>(response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = response.text().await.map_err(NetworkError::from)?;

        serde_json::from_str(&body)
            .map_err(|e| NetworkError::Decode(format!("Failed to parse JSON: {}", e)))
    }
}
