use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::auth::{
    CredentialProvider, Credentials, FileTokenPersistence, LoginState, OAuthConfig,
    PersistenceError, TokenExchangeClient, TokenStore,
};
use crate::config::{ClientConfig, ConfigError, ConfigLocator};
use crate::engine::{EngineError, RequestEngine};
use crate::http::{RequestDescriptor, ReqwestTransport, ResourceClient, Transport, TransportError};

/// Errors raised while constructing a [`SmappeeClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),
}

/// Entry point for authenticated API calls.
///
/// Owns the session's [`TokenStore`]; every call to [`SmappeeClient::run`] gets
/// its own [`RequestEngine`] over that shared store.
pub struct SmappeeClient {
    store: Arc<TokenStore>,
    exchange: TokenExchangeClient,
    resources: ResourceClient,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl SmappeeClient {
    /// Build a client with a `reqwest` transport. When `persist_tokens` is set,
    /// tokens are restored from and written to the user configuration directory.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let store = if config.persist_tokens {
            let persistence = FileTokenPersistence::new(&ConfigLocator::new()?, &config.profile);
            TokenStore::with_persistence(Box::new(persistence))?
        } else {
            TokenStore::default()
        };
        Self::with_store(config, Arc::new(store))
    }

    /// Build a client over an existing store, e.g. one shared with other clients.
    pub fn with_store(config: &ClientConfig, store: Arc<TokenStore>) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&config.user_agent, config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport), store))
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            store,
            exchange: TokenExchangeClient::new(transport.clone(), OAuthConfig::from(config)),
            resources: ResourceClient::new(transport),
            credentials: None,
        }
    }

    /// Register the collaborator asked for credentials when the session is logged out.
    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Complete one request, logging in or refreshing tokens as needed.
    pub async fn run(&self, descriptor: &RequestDescriptor) -> Result<Value, EngineError> {
        RequestEngine::new(
            &self.store,
            &self.exchange,
            &self.resources,
            self.credentials.as_deref(),
        )
        .run(descriptor)
        .await
    }

    /// [`SmappeeClient::run`] followed by deserialization into `T`.
    pub async fn run_json<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, EngineError> {
        let payload = self.run(descriptor).await?;
        serde_json::from_value(payload).map_err(EngineError::Decode)
    }

    /// Log in with explicit credentials, bypassing the credential provider.
    pub async fn login(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), EngineError> {
        let credentials = Credentials::new(username, password);
        let _gate = self.store.exchange_gate().await;
        let tokens = self.exchange.password_grant(&credentials).await?;
        self.store.set(LoginState::LoggedIn(tokens));
        info!("logged in");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn login_state(&self) -> LoginState {
        self.store.get()
    }

    /// Clear tokens; in-flight requests stop with [`EngineError::LoggedOut`].
    pub fn log_out(&self) {
        self.store.log_out();
    }

    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&LoginState, &LoginState) + Send + Sync + 'static,
    {
        self.store.observe(observer);
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }
}
