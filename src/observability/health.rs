//! Health check HTTP server
//!
//! - `GET /health` - connection state and metrics; 200 when connected, 503 otherwise
//! - `GET /ready` - whether the broker session is usable
//! - `GET /live` - always 200 while the process runs

use crate::manager::ConnectionState;
use crate::observability::metrics::{current_timestamp, MetricsCollector, MetricsSnapshot};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
pub struct HealthServer {
    port: u16,
    state: watch::Receiver<ConnectionState>,
    metrics: Arc<MetricsCollector>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub timestamp: u64,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

impl HealthServer {
    pub fn new(
        port: u16,
        state: watch::Receiver<ConnectionState>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            port,
            state,
            metrics,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Health document for the current state
    pub fn health_status(&self) -> HealthStatus {
        let state = self.state.borrow().clone();
        let (retry_attempt, last_error) = match &state {
            ConnectionState::Retrying { attempt, cause, .. } => {
                (Some(*attempt), cause.as_ref().map(|c| c.to_string()))
            }
            _ => (None, None),
        };

        HealthStatus {
            status: if state.is_connected() {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            state: state.name().to_string(),
            retry_attempt,
            last_error,
            timestamp: current_timestamp(),
            metrics: self.metrics.snapshot(),
        }
    }

    fn is_ready(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// All routes served by [`HealthServer::start`]
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_server = self.clone();
        let ready_server = self.clone();

        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = health_server.clone();
                async move {
                    let status = server.health_status();
                    let code = if status.status == "healthy" {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&status),
                        code,
                    ))
                }
            });

        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = ready_server.clone();
                async move {
                    let ready = server.is_ready();
                    let code = if ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&ReadinessResponse {
                            ready,
                            timestamp: current_timestamp(),
                        }),
                        code,
                    ))
                }
            });

        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                })
            });

        health_route.or(ready_route).or(live_route)
    }

    /// Serve until the task is dropped
    pub async fn start(self: Arc<Self>) {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Starting health server on port {}", self.port);
        warp::serve(self.routes()).run(addr).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{FailureCause, FailureKind};
    use std::time::Duration;

    fn server(state: ConnectionState) -> (Arc<HealthServer>, watch::Sender<ConnectionState>) {
        let (tx, rx) = watch::channel(state);
        (
            Arc::new(HealthServer::new(8080, rx, Arc::new(MetricsCollector::new()))),
            tx,
        )
    }

    #[tokio::test]
    async fn test_health_reports_connected() {
        let (server, _tx) = server(ConnectionState::Connected);
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["state"], "connected");
    }

    #[tokio::test]
    async fn test_health_reports_retrying() {
        let (server, _tx) = server(ConnectionState::Retrying {
            attempt: 3,
            delay: Duration::from_secs(4),
            cause: Some(FailureCause::new(FailureKind::ConnectionLost, "reset")),
        });
        let response = warp::test::request()
            .path("/health")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["state"], "retrying");
        assert_eq!(body["retry_attempt"], 3);
        assert!(body["last_error"].as_str().unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_ready_follows_state() {
        let (server, tx) = server(ConnectionState::Connecting);
        let routes = server.clone().routes();

        let response = warp::test::request().path("/ready").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        tx.send_replace(ConnectionState::Connected);
        let response = warp::test::request().path("/ready").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_live_always_ok() {
        let (server, _tx) = server(ConnectionState::Disconnected);
        let response = warp::test::request()
            .path("/live")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
