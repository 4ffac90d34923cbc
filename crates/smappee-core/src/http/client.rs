use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::{RawResponse, RequestDescriptor, Transport, TransportError};

/// Why a bearer-authenticated request did not produce a payload.
#[derive(Debug, Error)]
pub enum SendError {
    /// HTTP 401 or a cancelled authentication challenge; triggers a refresh.
    #[error("access token expired")]
    AccessTokenExpired,
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error(transparent)]
    Transport(TransportError),
}

/// Sends resource requests with a bearer token and classifies the outcome.
#[derive(Clone)]
pub struct ResourceClient {
    transport: Arc<dyn Transport>,
}

impl ResourceClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(
        &self,
        descriptor: &RequestDescriptor,
        access_token: &str,
    ) -> Result<Value, SendError> {
        let request = descriptor.authorize(access_token);
        debug!(method = %descriptor.method(), url = %descriptor.url(), "sending resource request");
        match self.transport.execute(request).await {
            Ok(response) => classify_response(response),
            Err(TransportError::AuthenticationCancelled) => Err(SendError::AccessTokenExpired),
            Err(err) => Err(SendError::Transport(err)),
        }
    }
}

fn classify_response(response: RawResponse) -> Result<Value, SendError> {
    match response.status {
        StatusCode::OK => {
            // Some endpoints answer with zero bytes where `{}` is meant.
            if response.body.is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            serde_json::from_slice(&response.body).map_err(SendError::InvalidPayload)
        }
        StatusCode::UNAUTHORIZED => Err(SendError::AccessTokenExpired),
        status => Err(SendError::UnexpectedStatus {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }),
    }
}
