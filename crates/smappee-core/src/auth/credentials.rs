use std::fmt;
use std::future::Future;

use async_trait::async_trait;

/// Username/password pair collected for a single password grant.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reported by a provider that could not (or chose not to) supply credentials,
/// e.g. because the user dismissed the login prompt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CredentialsUnavailable(pub String);

/// Supplies credentials on demand when the session has no usable tokens.
///
/// Implementations may present UI and take arbitrarily long; the engine awaits
/// the result without blocking a thread and calls the provider at most once per
/// login attempt.
///
/// The provider runs while the client's token exchange is in progress. It must
/// not call back into the client (`SmappeeClient::login`, or `run` on a logged
/// out session); such a call waits on the same exchange and never completes.
/// Return the credentials instead.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, CredentialsUnavailable>;
}

#[async_trait]
impl<F, Fut> CredentialProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Credentials, CredentialsUnavailable>> + Send,
{
    async fn credentials(&self) -> Result<Credentials, CredentialsUnavailable> {
        (self)().await
    }
}
