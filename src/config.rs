//! Configuration file and connection configuration
//!
//! The `[broker]` section of the TOML file is the [`ConnectionConfig`] handed
//! to the connection manager. The broker password never lives in the file:
//! only the name of the environment variable holding it is stored, and it is
//! resolved when a session is opened.

use crate::manager::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Everything needed to open one logical broker session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Secure broker URI, e.g. `mqtts://broker.example.com:8883`
    pub uri: String,
    /// MQTT client identifier
    pub client_id: String,
    /// Alias of the client identity in the credential store (mutual TLS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_alias: Option<String>,
    /// Ordered subscription specs (`filter` or `filter:qos`)
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// Broker username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Environment variable containing the broker password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Ask the broker to discard session state on connect (default: false)
    #[serde(default)]
    pub clean_session: bool,
}

fn default_keep_alive() -> u64 {
    60
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client_id: client_id.into(),
            credential_alias: None,
            subscriptions: Vec::new(),
            username: None,
            password_env: None,
            keep_alive_secs: default_keep_alive(),
            clean_session: false,
        }
    }

    pub fn with_subscriptions<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions = specs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credential_alias(mut self, alias: impl Into<String>) -> Self {
        self.credential_alias = Some(alias.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>, password_env: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password_env = password_env;
        self
    }

    /// Credential alias with blank values treated as absent
    pub fn credential_alias(&self) -> Option<&str> {
        self.credential_alias
            .as_deref()
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
    }
}

/// Reconnection backoff section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_shift")]
    pub max_shift: u32,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_shift() -> u32 {
    6
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_shift: default_max_shift(),
        }
    }
}

impl ReconnectSection {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_shift,
        )
    }
}

/// Where client identities are looked up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CredentialsSection {
    /// Directory holding `<alias>.key` / `<alias>.crt` PEM files
    pub directory: Option<PathBuf>,
}

/// Notification output options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NotificationsSection {
    /// Append every notification to per-slot log files in this directory
    pub record_dir: Option<PathBuf>,
}

/// Health endpoint options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HealthSection {
    /// Serve `/health`, `/ready` and `/live` on this port
    pub port: Option<u16>,
}

/// Full configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub broker: ConnectionConfig,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub notifications: NotificationsSection,
    #[serde(default)]
    pub health: HealthSection,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.check_sections()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Sanity checks on non-broker sections; broker validation happens at
    /// connect time so that it is applied to every caller.
    fn check_sections(&self) -> Result<(), ConfigError> {
        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.health.port == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "health.port must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Broker password from the configured environment variable
    pub fn broker_password(&self) -> Result<Option<String>, ConfigError> {
        match &self.broker.password_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
uri = "mqtts://broker.example.com:8883"
client_id = "notify-test"
subscriptions = ["alerts/#:2", "home/+/door"]

[reconnect]
base_delay_ms = 1000
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Persistence for the connection config
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<ConnectionConfig, ConfigError>;
    fn save(&self, config: &ConnectionConfig) -> Result<(), ConfigError>;
}

/// [`ConfigStore`] backed by the TOML configuration file.
///
/// Saving rewrites only the `[broker]` section; other sections are kept.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<ConnectionConfig, ConfigError> {
        Ok(AppConfig::load_from_file(&self.path)?.broker)
    }

    fn save(&self, config: &ConnectionConfig) -> Result<(), ConfigError> {
        let app = if self.path.exists() {
            let mut existing = AppConfig::load_from_file(&self.path)?;
            existing.broker = config.clone();
            existing
        } else {
            AppConfig {
                broker: config.clone(),
                reconnect: ReconnectSection::default(),
                credentials: CredentialsSection::default(),
                notifications: NotificationsSection::default(),
                health: HealthSection::default(),
            }
        };
        std::fs::write(&self.path, app.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[broker]
uri = "mqtts://broker.example.com:8883"
client_id = "laptop"
credential_alias = "laptop-identity"
subscriptions = ["alerts/#:2", "home/+/door"]
username = "alice"
password_env = "MQTT_PASSWORD"
keep_alive_secs = 30
clean_session = true

[reconnect]
base_delay_ms = 3000
max_delay_ms = 120000
max_shift = 5

[credentials]
directory = "/etc/mqtt-notify/keys"

[notifications]
record_dir = "records"

[health]
port = 8080
"#;

        let config = AppConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.broker.client_id, "laptop");
        assert_eq!(config.broker.credential_alias(), Some("laptop-identity"));
        assert_eq!(config.broker.subscriptions.len(), 2);
        assert_eq!(config.broker.keep_alive_secs, 30);
        assert!(config.broker.clean_session);
        assert_eq!(config.reconnect.base_delay_ms, 3000);
        assert_eq!(
            config.credentials.directory,
            Some(PathBuf::from("/etc/mqtt-notify/keys"))
        );
        assert_eq!(config.health.port, Some(8080));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::test_config();
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert!(!config.broker.clean_session);
        assert_eq!(config.broker.credential_alias(), None);
        assert_eq!(config.reconnect, ReconnectSection::default());
        assert_eq!(config.health.port, None);
    }

    #[test]
    fn test_blank_alias_is_absent() {
        let config = ConnectionConfig::new("mqtts://h", "c").with_credential_alias("   ");
        assert_eq!(config.credential_alias(), None);
    }

    #[test]
    fn test_backoff_policy_from_section() {
        let section = ReconnectSection {
            base_delay_ms: 3000,
            max_delay_ms: 60_000,
            max_shift: 6,
        };
        let policy = section.backoff_policy();
        assert_eq!(policy.next_delay(1), Duration::from_secs(3));
        assert_eq!(policy.next_delay(10), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_base_delay_rejected() {
        let toml_content = r#"
[broker]
uri = "mqtts://h"
client_id = "c"

[reconnect]
base_delay_ms = 0
"#;
        assert!(matches!(
            AppConfig::from_toml(toml_content),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::test_config();
        let rendered = config.to_toml().unwrap();
        assert_eq!(AppConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_missing_password_env_var() {
        let mut config = AppConfig::test_config();
        config.broker.password_env = Some("MQTT_NOTIFY_TEST_UNSET_PASSWORD".to_string());
        assert!(matches!(
            config.broker_password(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
