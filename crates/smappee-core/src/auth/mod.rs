mod credentials;
mod error;
mod oauth;
mod persistence;
mod state;
mod store;

pub use credentials::{CredentialProvider, Credentials, CredentialsUnavailable};
pub use error::{PersistenceError, TokenError};
pub use oauth::{OAuthConfig, TokenExchangeClient};
pub use persistence::{
    FileTokenPersistence, MemoryTokenPersistence, PersistedTokens, TokenPersistence,
};
pub use state::{LoginState, TokenPair};
pub use store::{LoginStateObserver, TokenStore};

pub(crate) use store::Transition;
