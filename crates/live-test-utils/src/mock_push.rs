//! Recording push transport.
//!
//! Deliveries happen on spawned tasks, so assertions first wait for the
//! expected number of envelopes with [`RecordingPush::wait_for`].

use async_trait::async_trait;
use live_service::errors::LiveError;
use live_service::services::push_client::{PushEnvelope, PushService};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    delivered: Vec<PushEnvelope>,
    attempts: usize,
    offline: HashSet<String>,
}

/// In-memory `PushService` that records every delivered envelope.
#[derive(Debug, Clone, Default)]
pub struct RecordingPush {
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Notify>,
}

impl RecordingPush {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery addressed to `recipient_id`.
    pub fn set_offline(&self, recipient_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .offline
            .insert(recipient_id.to_string());
    }

    /// Wait until at least `attempts` deliveries were attempted.
    ///
    /// Panics after five (virtual) seconds.
    pub async fn wait_for(&self, attempts: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.changed.notified();
                if self.inner.lock().unwrap().attempts >= attempts {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {attempts} push attempts, saw {}",
                self.inner.lock().unwrap().attempts
            )
        });
    }

    /// Let pending notification tasks run, then return everything delivered.
    pub async fn settle(&self) -> Vec<PushEnvelope> {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        self.delivered()
    }

    pub fn delivered(&self) -> Vec<PushEnvelope> {
        self.inner.lock().unwrap().delivered.clone()
    }

    /// Event types delivered to `recipient_id`, in delivery order.
    pub fn events_for(&self, recipient_id: &str) -> Vec<&'static str> {
        self.inner
            .lock()
            .unwrap()
            .delivered
            .iter()
            .filter(|e| e.recipient_id == recipient_id)
            .map(|e| e.event.event_type())
            .collect()
    }

    /// Recipients of `event_type`, sorted.
    pub fn recipients_of(&self, event_type: &str) -> Vec<String> {
        let mut recipients: Vec<String> = self
            .inner
            .lock()
            .unwrap()
            .delivered
            .iter()
            .filter(|e| e.event.event_type() == event_type)
            .map(|e| e.recipient_id.clone())
            .collect();
        recipients.sort();
        recipients
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.delivered.clear();
        inner.attempts = 0;
    }
}

#[async_trait]
impl PushService for RecordingPush {
    async fn push(&self, envelope: &PushEnvelope) -> Result<(), LiveError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.attempts += 1;
            if inner.offline.contains(&envelope.recipient_id) {
                Err(LiveError::Upstream("push-service returned 503".to_string()))
            } else {
                inner.delivered.push(envelope.clone());
                Ok(())
            }
        };
        self.changed.notify_waiters();
        result
    }
}
