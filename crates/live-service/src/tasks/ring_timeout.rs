//! Ring timeout scheduler.
//!
//! One cancellable one-shot timer per ringing room. When a timer fires it
//! runs the callback it was armed with (the orchestrator's missed-call
//! path, which re-checks room state before acting). Teardown paths cancel
//! the timer explicitly so no stale wakeups remain.
//!
//! # Graceful Shutdown
//!
//! Every timer token is a child of the scheduler's shutdown token;
//! cancelling it stops all pending timers without firing them.

use crate::observability::metrics;
use common::types::RoomId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

struct TimerEntry {
    token: CancellationToken,
    /// Distinguishes a re-armed timer from the one it replaced.
    generation: u64,
}

/// Per-room one-shot timers keyed by room id.
#[derive(Clone)]
pub struct RingTimeoutScheduler {
    timers: Arc<Mutex<HashMap<RoomId, TimerEntry>>>,
    shutdown: CancellationToken,
    generation: Arc<AtomicU64>,
}

impl RingTimeoutScheduler {
    /// Create a scheduler whose timers stop when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `on_fire` after `delay` unless cancelled first.
    ///
    /// Arming a room that already has a timer replaces it.
    pub async fn arm<F>(&self, room_id: RoomId, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut timers = self.timers.lock().await;
            if let Some(previous) = timers.insert(
                room_id,
                TimerEntry {
                    token: token.clone(),
                    generation,
                },
            ) {
                previous.token.cancel();
            }
            metrics::set_ring_timers_active(timers.len());
        }

        debug!(
            target: "live.ring_timeout",
            room_id = %room_id,
            delay_secs = delay.as_secs(),
            "Ring timer armed"
        );

        let timers = Arc::clone(&self.timers);
        let span = tracing::info_span!(target: "live.ring_timeout", "ring_timeout", room_id = %room_id);
        tokio::spawn(
            async move {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!(target: "live.ring_timeout", "Ring timer cancelled");
                    }
                    () = tokio::time::sleep(delay) => {
                        {
                            let mut timers = timers.lock().await;
                            if timers.get(&room_id).is_some_and(|e| e.generation == generation) {
                                timers.remove(&room_id);
                            }
                            metrics::set_ring_timers_active(timers.len());
                        }
                        info!(target: "live.ring_timeout", "Ring timeout fired");
                        on_fire.await;
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Stop the room's timer if one is pending. Returns whether one was.
    pub async fn cancel(&self, room_id: &RoomId) -> bool {
        let mut timers = self.timers.lock().await;
        let cancelled = match timers.remove(room_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        };
        metrics::set_ring_timers_active(timers.len());
        cancelled
    }

    /// Whether a timer is pending for the room.
    pub async fn is_armed(&self, room_id: &RoomId) -> bool {
        self.timers.lock().await.contains_key(room_id)
    }

    /// Number of pending timers.
    pub async fn active_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Cancel every pending timer.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut timers = self.timers.lock().await;
        let pending = timers.len();
        timers.clear();
        metrics::set_ring_timers_active(0);
        info!(target: "live.ring_timeout", pending, "Ring timeout scheduler stopped");
    }
}
