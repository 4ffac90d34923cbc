use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigLocator;

use super::{LoginState, PersistenceError, TokenPair};

/// Tokens as they are written to durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl PersistedTokens {
    /// Tokens to persist for a given state. `LoggedOut` yields an empty record.
    pub fn from_state(state: &LoginState) -> Self {
        match state {
            LoginState::LoggedIn(tokens) => Self {
                access_token: Some(tokens.access_token.clone()),
                refresh_token: Some(tokens.refresh_token.clone()),
            },
            LoginState::AccessTokenExpired { refresh_token } => Self {
                access_token: None,
                refresh_token: Some(refresh_token.clone()),
            },
            LoginState::LoggedOut => Self::default(),
        }
    }

    /// Reconstruct the login state: both tokens mean `LoggedIn`, a lone refresh
    /// token means `AccessTokenExpired`, anything else is `LoggedOut`.
    pub fn into_state(self) -> LoginState {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => LoginState::LoggedIn(TokenPair::new(access, refresh)),
            (None, Some(refresh)) => LoginState::access_token_expired(refresh),
            _ => LoginState::LoggedOut,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Durable storage for session tokens.
pub trait TokenPersistence: Send + Sync {
    fn load(&self) -> Result<PersistedTokens, PersistenceError>;
    fn save(&self, tokens: &PersistedTokens) -> Result<(), PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// Filesystem-backed token storage located in the user configuration directory.
pub struct FileTokenPersistence {
    path: PathBuf,
    profile: String,
}

impl FileTokenPersistence {
    pub fn new(locator: &ConfigLocator, profile: impl Into<String>) -> Self {
        let profile = profile.into();
        Self {
            path: locator.tokens_file(&profile),
            profile,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl TokenPersistence for FileTokenPersistence {
    /// An unreadable token file is discarded and loads as empty.
    fn load(&self) -> Result<PersistedTokens, PersistenceError> {
        if !self.path.exists() {
            return Ok(PersistedTokens::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<TokenEnvelope>(&raw) {
            Ok(envelope) => Ok(envelope.tokens),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "discarding unreadable token file"
                );
                self.clear()?;
                Ok(PersistedTokens::default())
            }
        }
    }

    fn save(&self, tokens: &PersistedTokens) -> Result<(), PersistenceError> {
        let envelope = TokenEnvelope {
            version: 1,
            profile: self.profile.clone(),
            tokens: tokens.clone(),
            saved_at: Utc::now(),
        };
        let payload = serde_json::to_string_pretty(&envelope)?;
        Self::write_file(&self.path, &payload)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    version: u32,
    profile: String,
    #[serde(flatten)]
    tokens: PersistedTokens,
    saved_at: DateTime<Utc>,
}

/// In-process storage, useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    inner: Mutex<PersistedTokens>,
}

impl MemoryTokenPersistence {
    pub fn new(initial: PersistedTokens) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> PersistedTokens {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TokenPersistence for MemoryTokenPersistence {
    fn load(&self) -> Result<PersistedTokens, PersistenceError> {
        Ok(self.snapshot())
    }

    fn save(&self, tokens: &PersistedTokens) -> Result<(), PersistenceError> {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.save(&PersistedTokens::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_store(temp_dir: &TempDir) -> FileTokenPersistence {
        let locator = ConfigLocator::from_root(temp_dir.path());
        FileTokenPersistence::new(&locator, "default")
    }

    #[test]
    fn persisted_state_reconstruction() {
        let both = PersistedTokens {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
        };
        assert_eq!(
            both.into_state(),
            LoginState::LoggedIn(TokenPair::new("a", "r"))
        );

        let refresh_only = PersistedTokens {
            access_token: None,
            refresh_token: Some("r".into()),
        };
        assert_eq!(
            refresh_only.into_state(),
            LoginState::access_token_expired("r")
        );

        let access_only = PersistedTokens {
            access_token: Some("a".into()),
            refresh_token: None,
        };
        assert_eq!(access_only.into_state(), LoginState::LoggedOut);
    }

    #[test]
    fn file_round_trip_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let tokens = PersistedTokens::from_state(&LoginState::access_token_expired("refresh"));
        file_store(&temp_dir).save(&tokens).unwrap();

        let reopened = file_store(&temp_dir);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.access_token, None);
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(file_store(&temp_dir).load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        fs::write(store.path(), "{ truncated").unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn clear_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store
            .save(&PersistedTokens::from_state(&LoginState::LoggedIn(
                TokenPair::new("a", "r"),
            )))
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
