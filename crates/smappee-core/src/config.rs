use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TOKEN_URL: &str = "https://app1pub.smappee.net/dev/v1/oauth2/token";
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_USER_AGENT: &str = "smappee-rs/0.1.0";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application-specific configuration helpers.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("net", "smappee", "smappee-rs")
            .ok_or(ConfigError::MissingProjectDirs)?;
        let config_dir = dirs.config_dir();
        fs::create_dir_all(config_dir).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(config_dir)?;
        Ok(Self {
            root: config_dir.to_path_buf(),
        })
    }

    /// Locator rooted at an explicit directory.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path to the persisted token file for the given profile.
    pub fn tokens_file(&self, profile: &str) -> PathBuf {
        self.root.join(format!("tokens-{profile}.json"))
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Settings shared by every request issued through a [`crate::SmappeeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    /// Write tokens through to disk on every login state transition.
    pub persist_tokens: bool,
    pub profile: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new<I, S>(client_id: I, client_secret: S) -> Self
    where
        I: Into<String>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: default_token_url(),
            persist_tokens: true,
            profile: DEFAULT_PROFILE.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Build a configuration from `SMAPPEE_*` environment variables.
    ///
    /// `SMAPPEE_CLIENT_ID` and `SMAPPEE_CLIENT_SECRET` are required; the token
    /// endpoint, persistence toggle, profile and timeout fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let client_id =
            lookup("SMAPPEE_CLIENT_ID").ok_or(ConfigError::MissingVar("SMAPPEE_CLIENT_ID"))?;
        let client_secret = lookup("SMAPPEE_CLIENT_SECRET")
            .ok_or(ConfigError::MissingVar("SMAPPEE_CLIENT_SECRET"))?;
        let mut config = Self::new(client_id, client_secret);

        if let Some(raw) = lookup("SMAPPEE_TOKEN_URL") {
            config.token_url = Url::parse(&raw)?;
        }
        if let Some(raw) = lookup("SMAPPEE_PERSIST_TOKENS") {
            config.persist_tokens = parse_flag("SMAPPEE_PERSIST_TOKENS", &raw)?;
        }
        if let Some(profile) = lookup("SMAPPEE_PROFILE") {
            config.profile = profile;
        }
        if let Some(raw) = lookup("SMAPPEE_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "SMAPPEE_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persist_tokens = enabled;
        self
    }

    pub fn with_profile<S: Into<String>>(mut self, profile: S) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn default_token_url() -> Url {
    Url::parse(DEFAULT_TOKEN_URL).expect("valid token URL")
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
        }),
    }
}

/// Errors that can occur when working with configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for smappee-rs")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn tokens_file_appends_profile() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ConfigLocator::from_root(temp_dir.path());
        let path = locator.tokens_file("default");
        assert!(path.ends_with("tokens-default.json"));
    }

    #[test]
    fn env_requires_client_credentials() {
        let err = ClientConfig::from_lookup(lookup_from(&[("SMAPPEE_CLIENT_ID", "id")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("SMAPPEE_CLIENT_SECRET")));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("SMAPPEE_CLIENT_ID", "id"),
            ("SMAPPEE_CLIENT_SECRET", "secret"),
            ("SMAPPEE_TOKEN_URL", "http://localhost:8080/token"),
            ("SMAPPEE_PERSIST_TOKENS", "no"),
            ("SMAPPEE_PROFILE", "cottage"),
            ("SMAPPEE_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.client_id, "id");
        assert_eq!(config.token_url.as_str(), "http://localhost:8080/token");
        assert!(!config.persist_tokens);
        assert_eq!(config.profile, "cottage");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn defaults_target_vendor_endpoint() {
        let config = ClientConfig::new("id", "secret");
        assert_eq!(config.token_url.as_str(), DEFAULT_TOKEN_URL);
        assert!(config.persist_tokens);
        assert_eq!(config.profile, DEFAULT_PROFILE);
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("SMAPPEE_CLIENT_ID", "id"),
            ("SMAPPEE_CLIENT_SECRET", "secret"),
            ("SMAPPEE_PERSIST_TOKENS", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "SMAPPEE_PERSIST_TOKENS",
                ..
            }
        ));
    }
}
