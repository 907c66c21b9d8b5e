//! Error taxonomy for the notification client
//!
//! - [`ConfigurationError`]: caller bugs found before any network action;
//!   returned synchronously from `connect` and never retried.
//! - [`CredentialError`]: the client identity could not be resolved; fatal to
//!   one connection attempt, retried with backoff.
//! - [`TransportError`]: network and broker failures; always retried.
//!
//! Payload parse problems never surface as errors, they resolve to plain text.

use crate::protocol::SubscriptionError;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::credentials::CredentialError;
pub use crate::transport::TransportError;

/// A connection config that can never work, whatever the network does
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("client ID must not be blank")]
    BlankClientId,
    #[error("invalid broker URI '{uri}': {reason}")]
    InvalidBrokerUri { uri: String, reason: String },
    #[error("broker URI scheme '{0}' is not secure; use mqtts:// or ssl://")]
    InsecureScheme(String),
    #[error("broker URI must include a host")]
    MissingHost,
    #[error("broker URI must not embed user info; configure username/password_env instead")]
    UserInfoInUri,
    #[error("keep-alive must be between 1 and 65535 seconds")]
    InvalidKeepAlive,
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Top-level error for library callers
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config file error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection manager is no longer running")]
    ManagerStopped,
}

impl NotifyError {
    /// Whether the failure is a caller bug rather than a transient condition
    pub fn is_configuration(&self) -> bool {
        matches!(self, NotifyError::Configuration(_) | NotifyError::Config(_))
    }
}

/// Result type for client operations
pub type NotifyResult<T> = Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TopicFilterError;

    #[test]
    fn test_subscription_error_converts_to_configuration_error() {
        let err: ConfigurationError = SubscriptionError::Invalid {
            index: 3,
            spec: "a//b".to_string(),
            source: TopicFilterError::EmptyLevel,
        }
        .into();
        let message = err.to_string();
        assert!(message.contains("index 3"));
        assert!(message.contains("empty level"));
    }

    #[test]
    fn test_configuration_errors_are_flagged() {
        let err: NotifyError = ConfigurationError::BlankClientId.into();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Configuration error: client ID must not be blank"
        );

        assert!(!NotifyError::ManagerStopped.is_configuration());
    }

    #[test]
    fn test_credential_error_display() {
        let err: NotifyError = CredentialError::NotFound {
            alias: "laptop".to_string(),
        }
        .into();
        assert!(err.to_string().contains("laptop"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_insecure_scheme_message_names_scheme() {
        let err = ConfigurationError::InsecureScheme("tcp".to_string());
        assert!(err.to_string().contains("'tcp'"));
    }
}
