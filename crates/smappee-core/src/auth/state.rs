use std::fmt;

use serde::{Deserialize, Serialize};

/// Access/refresh token pair returned by a successful token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new<A, R>(access_token: A, refresh_token: R) -> Self
    where
        A: Into<String>,
        R: Into<String>,
    {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Authentication state of a client session.
///
/// - `LoggedIn`: both tokens are held. The access token may already be expired;
///   that is only discovered on its next use.
/// - `AccessTokenExpired`: the access token is known to be rejected, but the
///   refresh token may still be accepted.
/// - `LoggedOut`: no usable tokens; fresh credentials are needed.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    LoggedOut,
    LoggedIn(TokenPair),
    AccessTokenExpired { refresh_token: String },
}

impl LoginState {
    pub fn access_token_expired<S: Into<String>>(refresh_token: S) -> Self {
        LoginState::AccessTokenExpired {
            refresh_token: refresh_token.into(),
        }
    }

    /// True when a token is held or can be obtained without asking for credentials.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, LoginState::LoggedOut)
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            LoginState::LoggedIn(tokens) => Some(&tokens.access_token),
            _ => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            LoginState::LoggedIn(tokens) => Some(&tokens.refresh_token),
            LoginState::AccessTokenExpired { refresh_token } => Some(refresh_token),
            LoginState::LoggedOut => None,
        }
    }

    /// Stable label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            LoginState::LoggedOut => "logged_out",
            LoginState::LoggedIn(_) => "logged_in",
            LoginState::AccessTokenExpired { .. } => "access_token_expired",
        }
    }
}

impl fmt::Debug for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::LoggedOut => f.write_str("LoggedOut"),
            LoginState::LoggedIn(tokens) => f.debug_tuple("LoggedIn").field(tokens).finish(),
            LoginState::AccessTokenExpired { .. } => f
                .debug_struct("AccessTokenExpired")
                .field("refresh_token", &"<redacted>")
                .finish(),
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            LoginState::LoggedOut => "logged out",
            LoginState::LoggedIn(_) => "logged in",
            LoginState::AccessTokenExpired { .. } => "access token expired",
        };
        write!(f, "{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_state_counts_as_authenticated() {
        assert!(!LoginState::LoggedOut.is_authenticated());
        assert!(LoginState::LoggedIn(TokenPair::new("a", "r")).is_authenticated());
        assert!(LoginState::access_token_expired("r").is_authenticated());
    }

    #[test]
    fn refresh_token_survives_expiry() {
        let state = LoginState::access_token_expired("refresh");
        assert_eq!(state.refresh_token(), Some("refresh"));
        assert_eq!(state.access_token(), None);
    }

    #[test]
    fn display_hides_tokens() {
        let state = LoginState::LoggedIn(TokenPair::new("secret-access", "secret-refresh"));
        assert_eq!(state.to_string(), "logged in");
        assert!(!format!("{state:?}").contains("secret"));
    }
}
