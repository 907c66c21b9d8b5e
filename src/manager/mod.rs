//! Connection lifecycle manager
//!
//! [`ConnectionManager`] owns one logical broker session. It validates the
//! connection config, resolves the TLS identity, opens the session, keeps it
//! alive with exponential backoff and turns inbound messages into
//! notifications. All state changes happen on a single worker task; callers
//! observe them through [`ConnectionManager::subscribe`] or
//! [`ConnectionManager::watch`].
//!
//! ```rust,no_run
//! use mqtt_notify::config::ConnectionConfig;
//! use mqtt_notify::manager::ConnectionManager;
//! use mqtt_notify::transport::RumqttTransport;
//!
//! # tokio_test::block_on(async {
//! let manager = ConnectionManager::builder(RumqttTransport::new()).build();
//! let mut states = manager.subscribe();
//!
//! manager
//!     .connect(
//!         ConnectionConfig::new("mqtts://broker.example.com", "laptop")
//!             .with_subscriptions(["alerts/#:2"]),
//!     )
//!     .await?;
//!
//! while let Some(state) = states.next().await {
//!     println!("{}", state.name());
//! }
//! # Ok::<(), mqtt_notify::error::NotifyError>(())
//! # });
//! ```

pub(crate) mod actor;
pub mod backoff;
pub mod state;

pub use backoff::BackoffPolicy;
pub use state::{ConnectionState, FailureCause, FailureKind, StatePublisher, StateSubscription};

use crate::config::ConnectionConfig;
use crate::credentials::{CredentialProvider, CredentialStore, TlsSettings};
use crate::error::{ConfigurationError, NotifyError, NotifyResult};
use crate::notification::{LogSink, NotificationSink};
use crate::observability::MetricsCollector;
use crate::protocol::{topics, TopicSubscription};
use crate::transport::{BrokerAuth, BrokerEndpoint, SessionRequest, Transport};
use actor::{Input, Worker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// A [`ConnectionConfig`] that passed every connect-time check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub source: ConnectionConfig,
    pub endpoint: BrokerEndpoint,
    pub subscriptions: Vec<TopicSubscription>,
    pub keep_alive: Duration,
}

impl ValidatedConfig {
    fn session_request(&self, tls: TlsSettings) -> SessionRequest {
        SessionRequest {
            endpoint: self.endpoint.clone(),
            client_id: self.source.client_id.trim().to_string(),
            auth: self.source.username.as_ref().map(|username| BrokerAuth {
                username: username.clone(),
                password_env: self.source.password_env.clone(),
            }),
            tls,
            keep_alive: self.keep_alive,
            clean_session: self.source.clean_session,
        }
    }
}

/// Check a config without touching the network
pub fn validate(config: &ConnectionConfig) -> Result<ValidatedConfig, ConfigurationError> {
    if config.client_id.trim().is_empty() {
        return Err(ConfigurationError::BlankClientId);
    }
    let endpoint = BrokerEndpoint::parse(&config.uri)?;
    let subscriptions = topics::parse_all(&config.subscriptions)?;
    // CONNECT carries keep-alive as a u16
    if config.keep_alive_secs == 0 || config.keep_alive_secs > u64::from(u16::MAX) {
        return Err(ConfigurationError::InvalidKeepAlive);
    }

    Ok(ValidatedConfig {
        source: config.clone(),
        endpoint,
        subscriptions,
        keep_alive: Duration::from_secs(config.keep_alive_secs),
    })
}

/// Builder for [`ConnectionManager`]
pub struct ConnectionManagerBuilder {
    transport: Arc<dyn Transport>,
    credentials: CredentialProvider,
    sink: Arc<dyn NotificationSink>,
    backoff: BackoffPolicy,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionManagerBuilder {
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = CredentialProvider::new(store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn build(self) -> ConnectionManager {
        let (inputs, inbox) = mpsc::unbounded_channel();
        let publisher = Arc::new(StatePublisher::new());

        let worker = Worker::new(
            self.transport,
            self.credentials,
            self.sink,
            self.backoff,
            self.metrics.clone(),
            publisher.clone(),
            inputs.clone(),
        );
        tokio::spawn(worker.run(inbox));

        ConnectionManager {
            inputs,
            publisher,
            metrics: self.metrics,
        }
    }
}

/// Owner of one logical broker session
pub struct ConnectionManager {
    inputs: mpsc::UnboundedSender<Input>,
    publisher: Arc<StatePublisher>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionManager {
    pub fn builder(transport: impl Transport) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            transport: Arc::new(transport),
            credentials: CredentialProvider::default(),
            sink: Arc::new(LogSink),
            backoff: BackoffPolicy::default(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Start (or restart) the session for `config`.
    ///
    /// Configuration errors are returned before anything is sent to the
    /// worker. Otherwise the call returns once the new session has been
    /// started; network outcomes are reported through state changes only.
    pub async fn connect(&self, config: ConnectionConfig) -> NotifyResult<()> {
        let validated = validate(&config)?;
        let (reply, done) = oneshot::channel();
        self.send(Input::Connect {
            config: Box::new(validated),
            reply,
        })?;
        done.await.map_err(|_| NotifyError::ManagerStopped)
    }

    /// Stop the session and any pending retry; always ends `Disconnected`
    pub async fn disconnect(&self) -> NotifyResult<()> {
        let (reply, done) = oneshot::channel();
        self.send(Input::Disconnect { reply })?;
        done.await.map_err(|_| NotifyError::ManagerStopped)
    }

    fn send(&self, input: Input) -> NotifyResult<()> {
        self.inputs
            .send(input)
            .map_err(|_| NotifyError::ManagerStopped)
    }

    pub fn state(&self) -> ConnectionState {
        self.publisher.current()
    }

    /// Every state transition from now on, starting with the current state
    pub fn subscribe(&self) -> StateSubscription {
        self.publisher.subscribe()
    }

    /// Latest state only
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.publisher.watch()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The worker cancels any retry and closes the session, then exits.
        // State stays as it was; call disconnect() to publish Disconnected.
        let _ = self.inputs.send(Input::Shutdown);
    }
}
