//! Test helpers and utilities for integration tests

use mqtt_notify::config::ConnectionConfig;
use mqtt_notify::manager::{ConnectionState, FailureKind, StateSubscription};
use std::time::Duration;

/// A config that passes validation
#[allow(dead_code)]
pub fn valid_config() -> ConnectionConfig {
    ConnectionConfig::new("mqtts://broker.example.com:8883", "test-client")
        .with_subscriptions(["alerts/#:2", "home/+/door"])
}

/// Next published state, failing the test if none arrives
#[allow(dead_code)]
pub async fn next_state(states: &mut StateSubscription) -> ConnectionState {
    states
        .next()
        .await
        .expect("state publisher closed unexpectedly")
}

/// Unpack a `Retrying` state into (attempt, delay, cause kind)
#[allow(dead_code)]
pub fn expect_retrying(state: ConnectionState) -> (u32, Duration, FailureKind) {
    match state {
        ConnectionState::Retrying {
            attempt,
            delay,
            cause,
        } => {
            let kind = cause.expect("Retrying should carry a cause").kind;
            (attempt, delay, kind)
        }
        other => panic!("expected Retrying, got {other:?}"),
    }
}

/// Poll `condition` until it holds, advancing (paused) time between checks
#[allow(dead_code)]
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

/// Let the worker drain its mailbox
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
