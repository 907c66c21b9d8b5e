//! Pure broker endpoint parsing and MQTT option construction

use crate::error::ConfigurationError;
use crate::transport::SessionRequest;
use rumqttc::{MqttOptions, TlsConfiguration, Transport as RumqttcTransport};
use std::fmt;
use tracing::warn;
use url::{Host, Url};

/// Default port for MQTT over TLS
pub const DEFAULT_TLS_PORT: u16 = 8883;

const SECURE_SCHEMES: [&str; 2] = ["mqtts", "ssl"];

/// Validated secure broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    /// Parse a broker URI. Only secure schemes are accepted, a host is
    /// required and credentials must not be embedded in the URI.
    pub fn parse(uri: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(uri.trim()).map_err(|e| ConfigurationError::InvalidBrokerUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        // Url lowercases the scheme
        if !SECURE_SCHEMES.contains(&url.scheme()) {
            return Err(ConfigurationError::InsecureScheme(url.scheme().to_string()));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(ConfigurationError::UserInfoInUri);
        }

        // IP literals are stored unbracketed so they can be used as a TLS server name
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(ConfigurationError::MissingHost),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_TLS_PORT),
        })
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "mqtts://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "mqtts://{}:{}", self.host, self.port)
        }
    }
}

/// Pure function to configure MQTT options for one session
pub fn configure_mqtt_options(request: &SessionRequest) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(
        request.client_id.clone(),
        request.endpoint.host.clone(),
        request.endpoint.port,
    );

    mqtt_options.set_transport(RumqttcTransport::Tls(TlsConfiguration::Rustls(
        request.tls.config.clone(),
    )));
    mqtt_options.set_keep_alive(request.keep_alive);
    mqtt_options.set_clean_session(request.clean_session);

    // Password is read from the environment per session, never stored
    if let Some(auth) = &request.auth {
        let password = match &auth.password_env {
            Some(env_name) => std::env::var(env_name).unwrap_or_else(|_| {
                warn!(
                    env_var = %env_name,
                    "Broker password variable is not set, using an empty password"
                );
                String::new()
            }),
            None => String::new(),
        };
        mqtt_options.set_credentials(auth.username.clone(), password);
    }

    mqtt_options
}
