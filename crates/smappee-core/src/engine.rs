//! Authenticated request state machine.
//!
//! One [`RequestEngine`] drives one caller request to completion. Each loop
//! iteration dispatches on the current [`LoginState`] and either finishes the
//! request or performs exactly one state transition:
//!
//! | state                  | outcome                         | next                        |
//! |------------------------|---------------------------------|-----------------------------|
//! | `LoggedIn`             | payload                         | done                        |
//! | `LoggedIn`             | 401 / cancelled authentication  | `AccessTokenExpired`        |
//! | `LoggedIn`             | any other failure               | error                       |
//! | `LoggedOut`            | password grant ok               | `LoggedIn`                  |
//! | `LoggedOut`            | password grant failed           | error                       |
//! | `AccessTokenExpired`   | refresh grant ok                | `LoggedIn`                  |
//! | `AccessTokenExpired`   | refresh token rejected          | `LoggedOut`                 |
//!
//! The loop is bounded by [`MAX_ATTEMPTS`].

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{
    CredentialProvider, LoginState, TokenError, TokenExchangeClient, TokenPair, TokenStore,
    Transition,
};
use crate::http::{RequestDescriptor, ResourceClient, SendError, TransportError};

/// Upper bound on dispatch cycles for a single request.
pub const MAX_ATTEMPTS: u32 = 10;

/// Terminal failure of an authenticated request.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request failed: {0}")]
    Transport(#[source] TransportError),
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("invalid username or password: {0}")]
    InvalidCredentials(String),
    #[error("no credential provider configured")]
    DelegateMissing,
    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(String),
    #[error("could not parse token response")]
    MalformedTokenResponse,
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    #[error("token endpoint unreachable: {0}")]
    TokenTransport(#[source] TransportError),
    /// The login state kept cycling without completing the request.
    #[error("state machine is running in circles after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("session was logged out while the request was in flight")]
    LoggedOut,
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),
}

impl EngineError {
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, EngineError::InvalidCredentials(_))
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, EngineError::RetriesExhausted { .. })
    }
}

impl From<TokenError> for EngineError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidCredentials(description) => {
                EngineError::InvalidCredentials(description)
            }
            TokenError::TokenExchangeFailed(message) => EngineError::TokenExchangeFailed(message),
            TokenError::MalformedTokenResponse => EngineError::MalformedTokenResponse,
            TokenError::Transport(source) => EngineError::TokenTransport(source),
        }
    }
}

/// What a single dispatch cycle decided.
enum Step {
    Done(Value),
    /// Re-read the store and dispatch again.
    Continue,
}

/// Drives one request through login, refresh and retry.
///
/// Borrowed collaborators are owned by the caller (normally a
/// [`crate::SmappeeClient`]); the engine lives only as long as one `run`.
pub struct RequestEngine<'a> {
    store: &'a TokenStore,
    exchange: &'a TokenExchangeClient,
    resources: &'a ResourceClient,
    credentials: Option<&'a dyn CredentialProvider>,
}

impl<'a> RequestEngine<'a> {
    pub fn new(
        store: &'a TokenStore,
        exchange: &'a TokenExchangeClient,
        resources: &'a ResourceClient,
        credentials: Option<&'a dyn CredentialProvider>,
    ) -> Self {
        Self {
            store,
            exchange,
            resources,
            credentials,
        }
    }

    pub async fn run(&self, descriptor: &RequestDescriptor) -> Result<Value, EngineError> {
        let epoch = self.store.epoch();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if attempts > MAX_ATTEMPTS {
                warn!(
                    attempts = MAX_ATTEMPTS,
                    url = %descriptor.url(),
                    "login state machine exhausted its retry budget"
                );
                return Err(EngineError::RetriesExhausted {
                    attempts: MAX_ATTEMPTS,
                });
            }

            let (state, current_epoch) = self.store.snapshot();
            if current_epoch != epoch {
                info!(url = %descriptor.url(), "request stopped by log out");
                return Err(EngineError::LoggedOut);
            }
            debug!(attempt = attempts, state = state.label(), "dispatching request");

            let step = match &state {
                LoginState::LoggedIn(tokens) => self.send(descriptor, &state, tokens, epoch).await?,
                LoginState::LoggedOut => self.log_in(&state, epoch).await?,
                LoginState::AccessTokenExpired { refresh_token } => {
                    self.refresh(&state, refresh_token, epoch).await?
                }
            };

            if let Step::Done(payload) = step {
                debug!(attempts, url = %descriptor.url(), "request completed");
                return Ok(payload);
            }
        }
    }

    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        state: &LoginState,
        tokens: &TokenPair,
        epoch: u64,
    ) -> Result<Step, EngineError> {
        match self.resources.send(descriptor, &tokens.access_token).await {
            Ok(payload) => Ok(Step::Done(payload)),
            Err(SendError::AccessTokenExpired) => {
                info!(url = %descriptor.url(), "access token rejected");
                let next = LoginState::access_token_expired(tokens.refresh_token.clone());
                self.commit(epoch, state, next)
            }
            Err(SendError::InvalidPayload(err)) => Err(EngineError::InvalidPayload(err)),
            Err(SendError::UnexpectedStatus { status, body }) => {
                warn!(%status, url = %descriptor.url(), "unexpected HTTP status");
                Err(EngineError::UnexpectedStatus { status, body })
            }
            Err(SendError::Transport(err)) => {
                warn!(error = %err, url = %descriptor.url(), "request failed");
                Err(EngineError::Transport(err))
            }
        }
    }

    async fn log_in(&self, state: &LoginState, epoch: u64) -> Result<Step, EngineError> {
        let provider = self.credentials.ok_or(EngineError::DelegateMissing)?;

        let _gate = self.store.exchange_gate().await;
        if self.store.snapshot() != (state.clone(), epoch) {
            // Another request logged in (or out) while this one waited.
            return Ok(Step::Continue);
        }

        let credentials = provider
            .credentials()
            .await
            .map_err(|err| EngineError::CredentialsUnavailable(err.0))?;
        let tokens = self.exchange.password_grant(&credentials).await?;
        info!("logged in with password grant");
        self.commit(epoch, state, LoginState::LoggedIn(tokens))
    }

    async fn refresh(
        &self,
        state: &LoginState,
        refresh_token: &str,
        epoch: u64,
    ) -> Result<Step, EngineError> {
        let _gate = self.store.exchange_gate().await;
        if self.store.snapshot() != (state.clone(), epoch) {
            // Another request already refreshed; reuse its tokens.
            return Ok(Step::Continue);
        }

        match self.exchange.refresh_grant(refresh_token).await {
            Ok(tokens) => {
                info!("access token refreshed");
                self.commit(epoch, state, LoginState::LoggedIn(tokens))
            }
            Err(TokenError::Transport(err)) => {
                // No answer from the token endpoint says nothing about the refresh
                // token; keep it for the next request.
                warn!(error = %err, "token endpoint unreachable during refresh");
                Err(EngineError::TokenTransport(err))
            }
            Err(err) => {
                info!(error = %err, "refresh token rejected, credentials required");
                self.commit(epoch, state, LoginState::LoggedOut)
            }
        }
    }

    /// Write a transition through the store. Losing a race to another request is
    /// not an error: the next cycle dispatches on the winner's state.
    fn commit(
        &self,
        epoch: u64,
        expected: &LoginState,
        next: LoginState,
    ) -> Result<Step, EngineError> {
        match self.store.transition(epoch, expected, next) {
            Transition::Applied => Ok(Step::Continue),
            Transition::Stale(current) => {
                debug!(current = current.label(), "transition superseded by concurrent request");
                Ok(Step::Continue)
            }
            Transition::SessionEnded => Err(EngineError::LoggedOut),
        }
    }
}
