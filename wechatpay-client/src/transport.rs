use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.mch.weixin.qq.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully signed request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path plus query string, exactly as signed.
    pub path: String,
    /// Overrides the transport's base URL (bill downloads are served from another host).
    pub base_url: Option<String>,
    /// Body text, exactly as signed.
    pub body: Option<String>,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Sends signed requests. Retries and timeouts are the implementation's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &TransportRequest) -> Result<String, TransportError> {
        let base = request.base_url.as_deref().unwrap_or(&self.base_url);
        let base = base.trim_end_matches('/');
        if base.is_empty() {
            return Err(TransportError::InvalidUrl("empty base URL".to_string()));
        }
        if request.path.starts_with('/') {
            Ok(format!("{base}{}", request.path))
        } else {
            Ok(format!("{base}/{}", request.path))
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(&request)?;
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| {
            warn!(error = %err, %url, "gateway request failed");
            if err.is_timeout() {
                TransportError::Timeout
            } else if err.is_builder() {
                TransportError::InvalidUrl(err.to_string())
            } else {
                TransportError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?
            .to_vec();
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
