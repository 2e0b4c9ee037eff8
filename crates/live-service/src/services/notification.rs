//! Notification dispatcher.
//!
//! Fire-and-forget delivery of call events. Each `notify` call spawns one
//! task that pushes the event to every recipient in turn; failures are
//! logged and counted but never reach the caller.

use crate::observability::metrics;
use crate::services::push_client::{CallEvent, PushEnvelope, PushService};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Spawns push deliveries on the runtime.
#[derive(Clone)]
pub struct NotificationDispatcher {
    push: Arc<dyn PushService>,
}

impl NotificationDispatcher {
    pub fn new(push: Arc<dyn PushService>) -> Self {
        Self { push }
    }

    /// Deliver `event` to each of `recipients` in the background.
    pub fn notify(&self, recipients: Vec<String>, event: CallEvent) {
        if recipients.is_empty() {
            return;
        }

        let push = Arc::clone(&self.push);
        let span = tracing::debug_span!(
            target: "live.notify",
            "notify",
            event_type = event.event_type(),
            room_id = %event.base().room.id,
            recipients = recipients.len()
        );

        tokio::spawn(
            async move {
                for recipient in &recipients {
                    let envelope = PushEnvelope::new(recipient, &event);
                    match push.push(&envelope).await {
                        Ok(()) => {
                            debug!(target: "live.notify", recipient_id = %recipient, "Event delivered");
                        }
                        Err(e) => {
                            metrics::record_push_failure();
                            warn!(
                                target: "live.notify",
                                recipient_id = %recipient,
                                error = %e,
                                "Push delivery failed"
                            );
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}
