//! mqtt-notify - command line entry point

use clap::{Parser, Subcommand};
use mqtt_notify::config::AppConfig;
use mqtt_notify::credentials::PemDirectoryStore;
use mqtt_notify::manager::{validate, ConnectionManager, ConnectionState};
use mqtt_notify::notification::{FanoutSink, FileRecorder, LogSink, NotificationSink};
use mqtt_notify::observability::{init_default_logging, HealthServer, MetricsCollector};
use mqtt_notify::protocol::resolve;
use mqtt_notify::transport::RumqttTransport;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["mqtt-notify.toml", "config/mqtt-notify.toml"];

/// Always-on MQTT notification client
#[derive(Parser)]
#[command(name = "mqtt-notify")]
#[command(about = "Keep a secure MQTT session alive and turn messages into notifications")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "MQTT_NOTIFY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and post notifications until SIGINT/SIGTERM
    Run,
    /// Validate the configuration file
    Check {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
    /// Resolve a message body into a notification payload
    Resolve {
        /// Topic the message arrived on
        #[arg(long)]
        topic: String,
        /// Delivery QoS
        #[arg(long, default_value_t = 1)]
        qos: u8,
        /// Message body; read from stdin when omitted
        body: Option<String>,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let result = match cli.command {
        Commands::Run => match load_configuration(cli.config.as_deref()) {
            Ok(config) => run(config).await,
            Err(e) => Err(e),
        },
        Commands::Check { show } => {
            load_configuration(cli.config.as_deref()).and_then(|config| check(&config, show))
        }
        Commands::Resolve { topic, qos, body } => resolve_command(&topic, qos, body),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> CliResult<AppConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AppConfig::load_from_file(path)?);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AppConfig::load_from_file(path)?);
        }
    }

    Err("no configuration file found; pass --config or create mqtt-notify.toml".into())
}

fn build_sink(config: &AppConfig) -> CliResult<Arc<dyn NotificationSink>> {
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(dir) = &config.notifications.record_dir {
        sink = sink.with(Arc::new(FileRecorder::new(dir)?));
        info!(directory = %dir.display(), "Recording notifications to disk");
    }
    Ok(Arc::new(sink))
}

async fn run(config: AppConfig) -> CliResult<()> {
    let metrics = Arc::new(MetricsCollector::new());
    let mut builder = ConnectionManager::builder(RumqttTransport::new())
        .sink(build_sink(&config)?)
        .backoff(config.reconnect.backoff_policy())
        .metrics(metrics.clone());
    if let Some(dir) = &config.credentials.directory {
        builder = builder.credential_store(Arc::new(PemDirectoryStore::new(dir)));
    }
    let manager = builder.build();

    if let Some(port) = config.health.port {
        let server = Arc::new(HealthServer::new(port, manager.watch(), metrics));
        tokio::spawn(server.start());
    }

    let mut states = manager.subscribe();
    tokio::spawn(async move {
        while let Some(state) = states.next().await {
            if let ConnectionState::Retrying {
                attempt,
                delay,
                cause,
            } = state
            {
                let cause = cause.map(|c| c.to_string()).unwrap_or_default();
                warn!(attempt, delay_ms = delay.as_millis() as u64, %cause, "Broker unreachable");
            }
        }
    });

    manager.connect(config.broker).await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    manager.disconnect().await?;
    info!("Shutdown complete");
    Ok(())
}

fn check(config: &AppConfig, show: bool) -> CliResult<()> {
    let validated = validate(&config.broker)?;

    println!("Broker: {}", validated.endpoint);
    println!("Client ID: {}", config.broker.client_id);
    match config.broker.credential_alias() {
        Some(alias) => println!("Client identity: {alias}"),
        None => println!("Client identity: none (server authentication only)"),
    }
    println!("Subscriptions:");
    for (index, sub) in validated.subscriptions.iter().enumerate() {
        println!("  {index}: {} (qos {})", sub.filter(), sub.qos());
    }

    if config.broker.password_env.is_some() {
        if let Err(e) = config.broker_password() {
            warn!("{}", e);
        }
    }

    if show {
        println!();
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

fn resolve_command(topic: &str, qos: u8, body: Option<String>) -> CliResult<()> {
    let body = match body {
        Some(body) => body.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let payload = resolve(topic, &body, qos);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
