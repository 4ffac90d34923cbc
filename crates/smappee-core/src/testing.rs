//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::{CredentialProvider, Credentials, CredentialsUnavailable};
use crate::http::{HttpRequest, RawResponse, Transport, TransportError};

type Responder = dyn Fn(&HttpRequest) -> Result<RawResponse, TransportError> + Send + Sync;

/// Transport whose responses are computed by a closure; records every request.
/// Each call yields once before answering.
pub(crate) struct ScriptedTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests whose path ends with `suffix`.
    pub(crate) fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.path().ends_with(suffix))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        // Suspend like real I/O so concurrent callers interleave.
        tokio::task::yield_now().await;
        let result = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

pub(crate) const TOKEN_PATH: &str = "/oauth2/token";
pub(crate) const RESOURCE_PATH: &str = "/servicelocation";

pub(crate) fn token_url() -> url::Url {
    url::Url::parse(&format!("https://smappee.test{TOKEN_PATH}")).unwrap()
}

pub(crate) fn resource_url() -> url::Url {
    url::Url::parse(&format!("https://smappee.test{RESOURCE_PATH}")).unwrap()
}

pub(crate) fn json_response(status: u16, body: serde_json::Value) -> RawResponse {
    RawResponse::new(
        StatusCode::from_u16(status).unwrap(),
        serde_json::to_vec(&body).unwrap(),
    )
}

pub(crate) fn tokens_response(access: &str, refresh: &str) -> RawResponse {
    json_response(
        200,
        serde_json::json!({ "access_token": access, "refresh_token": refresh }),
    )
}

pub(crate) fn status_response(status: u16) -> RawResponse {
    RawResponse::new(StatusCode::from_u16(status).unwrap(), Vec::new())
}

pub(crate) fn is_token_request(request: &HttpRequest) -> bool {
    request.url.path() == TOKEN_PATH
}

/// Credential provider returning fixed credentials and counting prompts.
#[derive(Default)]
pub(crate) struct CountingCredentials {
    calls: AtomicUsize,
    refuse: bool,
}

impl CountingCredentials {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn refusing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            refuse: true,
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn credentials(&self) -> Result<Credentials, CredentialsUnavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(CredentialsUnavailable("user cancelled login".into()));
        }
        Ok(Credentials::new("u", "p"))
    }
}
