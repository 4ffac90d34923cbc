use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::HttpRequest;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failures where no HTTP response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The networking layer gave up on an authentication challenge. In practice
    /// this signals an expired access token rather than a user action.
    ///
    /// `ReqwestTransport` never reports it; custom transports over platform
    /// stacks that surface such a code map it here.
    #[error("authentication cancelled by the networking layer")]
    AuthenticationCancelled,
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("{0}")]
    Other(String),
}

/// Executes prepared HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport. Timeouts are enforced here, not by the engine.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self.http.request(request.method, request.url);
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TransportError::InvalidHeader(err.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| TransportError::InvalidHeader(err.to_string()))?;
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}
