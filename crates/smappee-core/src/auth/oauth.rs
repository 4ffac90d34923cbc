use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use url::form_urlencoded;
use url::Url;

use crate::config::ClientConfig;
use crate::http::{HttpRequest, Transport};

use super::{Credentials, TokenError, TokenPair};

/// Marker the token endpoint puts in `error_description` when it rejects a
/// password grant for bad credentials. Fragile: it is free text, matched as-is.
const MISSING_PARAMETERS_MARKER: &str = "Missing parameters:";
const INVALID_USERNAME_OR_PASSWORD: &str = "invalid username or password";

/// OAuth client credentials registered with the vendor.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
}

impl OAuthConfig {
    pub fn new<I, S>(client_id: I, client_secret: S, token_url: Url) -> Self
    where
        I: Into<String>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url,
        }
    }
}

impl From<&ClientConfig> for OAuthConfig {
    fn from(config: &ClientConfig) -> Self {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.token_url.clone(),
        )
    }
}

/// Performs password and refresh grants against the token endpoint.
#[derive(Clone)]
pub struct TokenExchangeClient {
    transport: Arc<dyn Transport>,
    config: OAuthConfig,
}

impl TokenExchangeClient {
    pub fn new(transport: Arc<dyn Transport>, config: OAuthConfig) -> Self {
        Self { transport, config }
    }

    /// Exchange a username/password for a token pair.
    pub async fn password_grant(&self, credentials: &Credentials) -> Result<TokenPair, TokenError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("client_secret", &self.config.client_secret)
            .append_pair("username", &credentials.username)
            .append_pair("password", &credentials.password)
            .finish();
        debug!(username = %credentials.username, "requesting password grant");
        self.exchange(body).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("client_secret", &self.config.client_secret)
            .finish();
        debug!("requesting refresh grant");
        self.exchange(body).await
    }

    async fn exchange(&self, body: String) -> Result<TokenPair, TokenError> {
        let request = HttpRequest::form(self.config.token_url.clone(), body);
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(TokenError::Transport)?;
        let result = classify_token_response(&response.body);
        if let Err(err) = &result {
            warn!(status = %response.status, error = %err, "token exchange rejected");
        }
        result
    }
}

/// Classify a token endpoint body. The HTTP status is not consulted; the
/// endpoint reports failures through the `error` field.
pub(crate) fn classify_token_response(body: &[u8]) -> Result<TokenPair, TokenError> {
    let json: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    if let (Some(access), Some(refresh)) = (
        json.get("access_token").and_then(Value::as_str),
        json.get("refresh_token").and_then(Value::as_str),
    ) {
        return Ok(TokenPair::new(access, refresh));
    }

    let Some(error) = json.get("error").and_then(Value::as_str) else {
        return Err(TokenError::MalformedTokenResponse);
    };
    let description = json
        .get("error_description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if error == "invalid_request" && description.contains(MISSING_PARAMETERS_MARKER) {
        return Err(TokenError::InvalidCredentials(description.to_owned()));
    }
    if error == INVALID_USERNAME_OR_PASSWORD {
        return Err(TokenError::InvalidCredentials(error.to_owned()));
    }

    let message = if description.is_empty() {
        error.to_owned()
    } else {
        format!("{error}: {description}")
    };
    Err(TokenError::TokenExchangeFailed(message))
}
