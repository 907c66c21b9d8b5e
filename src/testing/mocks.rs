//! Mock implementations for testing
//!
//! [`MockTransport`] opens in-process sessions whose network outcomes are
//! driven by the test through [`MockSessionHandle`]. [`RecordingSink`]
//! captures every notification the manager posts.

use crate::notification::NotificationSink;
use crate::protocol::{NotificationPayload, TopicSubscription};
use crate::transport::{
    InboundMessage, Session, SessionEvents, SessionRequest, Transport, TransportError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

pub use crate::credentials::MemoryCredentialStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct MockTransportInner {
    sessions: Mutex<Vec<MockSessionHandle>>,
    requests: Mutex<Vec<SessionRequest>>,
    opened: Notify,
    fail_open: AtomicBool,
    fail_subscribe: AtomicBool,
}

/// Mock transport for testing; clones share the same session history
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` itself fail
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make `subscribe` fail on sessions opened from now on
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    pub fn sessions(&self) -> Vec<MockSessionHandle> {
        lock(&self.inner.sessions).clone()
    }

    pub fn last_session(&self) -> Option<MockSessionHandle> {
        lock(&self.inner.sessions).last().cloned()
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        lock(&self.inner.requests).clone()
    }

    /// Wait until at least `count` sessions were opened; returns session number `count`
    pub async fn wait_for_session(&self, count: usize) -> MockSessionHandle {
        loop {
            let notified = self.inner.opened.notified();
            if let Some(handle) = count
                .checked_sub(1)
                .and_then(|index| lock(&self.inner.sessions).get(index).cloned())
            {
                return handle;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        request: SessionRequest,
        events: SessionEvents,
    ) -> Result<Box<dyn Session>, TransportError> {
        lock(&self.inner.requests).push(request);

        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "mock transport refused to open".to_string(),
            ));
        }

        let shared = Arc::new(MockSessionShared {
            subscribe_calls: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            fail_subscribe: self.inner.fail_subscribe.load(Ordering::SeqCst),
        });
        let handle = MockSessionHandle {
            events,
            shared: shared.clone(),
        };

        lock(&self.inner.sessions).push(handle);
        self.inner.opened.notify_waiters();

        Ok(Box::new(MockSession { shared }))
    }
}

struct MockSessionShared {
    subscribe_calls: Mutex<Vec<Vec<TopicSubscription>>>,
    disconnected: AtomicBool,
    fail_subscribe: bool,
}

struct MockSession {
    shared: Arc<MockSessionShared>,
}

#[async_trait]
impl Session for MockSession {
    async fn subscribe(
        &mut self,
        subscriptions: &[TopicSubscription],
    ) -> Result<(), TransportError> {
        lock(&self.shared.subscribe_calls).push(subscriptions.to_vec());
        if self.shared.fail_subscribe {
            return Err(TransportError::SubscriptionFailed(
                "mock subscription rejected".to_string(),
            ));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.shared.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Test-side control of one mock session
#[derive(Clone)]
pub struct MockSessionHandle {
    events: SessionEvents,
    shared: Arc<MockSessionShared>,
}

impl MockSessionHandle {
    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// Broker accepted the connection (or the link reconnected)
    pub fn connected(&self) -> bool {
        self.events.connected(false)
    }

    pub fn fail_connect(&self, reason: &str) -> bool {
        self.events.connect_failed(reason)
    }

    pub fn lose_connection(&self, reason: &str) -> bool {
        self.events.connection_lost(reason)
    }

    /// Broker rejected a subscription in its SubAck
    pub fn reject_subscription(&self, reason: &str) -> bool {
        self.events.subscribe_failed(reason)
    }

    pub fn deliver(&self, topic: &str, payload: &[u8], qos: u8) -> bool {
        self.events.message(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retained: false,
        })
    }

    /// Every subscribe call, in order
    pub fn subscribe_calls(&self) -> Vec<Vec<TopicSubscription>> {
        lock(&self.shared.subscribe_calls).clone()
    }

    pub fn was_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::SeqCst)
    }
}

/// One notification captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotification {
    pub tag: Option<String>,
    pub payload: NotificationPayload,
}

/// Sink that records every post
#[derive(Default)]
pub struct RecordingSink {
    posts: Mutex<Vec<RecordedNotification>>,
    posted: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> Vec<RecordedNotification> {
        lock(&self.posts).clone()
    }

    /// Wait until at least `count` notifications were posted
    pub async fn wait_for(&self, count: usize) -> Vec<RecordedNotification> {
        loop {
            let notified = self.posted.notified();
            let posts = self.posts();
            if posts.len() >= count {
                return posts;
            }
            notified.await;
        }
    }

    fn record(&self, tag: Option<&str>, payload: &NotificationPayload) {
        lock(&self.posts).push(RecordedNotification {
            tag: tag.map(str::to_string),
            payload: payload.clone(),
        });
        self.posted.notify_waiters();
    }
}

impl NotificationSink for RecordingSink {
    fn post(&self, payload: &NotificationPayload) {
        self.record(None, payload);
    }

    fn post_tagged(&self, tag: &str, payload: &NotificationPayload) {
        self.record(Some(tag), payload);
    }
}
