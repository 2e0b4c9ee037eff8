//! Push service client and call event envelopes.
//!
//! One envelope is delivered per recipient:
//!
//! ```json
//! {
//!   "recipientId": "bob",
//!   "eventType": "user_call_requested",
//!   "payload": { "room": { ... }, "senderId": "alice", "recipientId": "bob" }
//! }
//! ```

use crate::errors::LiveError;
use crate::models::Room;
use crate::services::upstream::UpstreamHttp;
use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;

/// Fields every call event payload carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBase {
    pub room: Room,
    pub sender_id: String,
    pub recipient_id: String,
}

impl EventBase {
    /// Base with the recipient left blank; filled in per delivery.
    pub fn new(room: &Room, sender_id: &str) -> Self {
        Self {
            room: room.clone(),
            sender_id: sender_id.to_string(),
            recipient_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPayload {
    #[serde(flatten)]
    pub base: EventBase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCallPayload {
    #[serde(flatten)]
    pub base: EventBase,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndedPayload {
    #[serde(flatten)]
    pub base: EventBase,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLeftPayload {
    #[serde(flatten)]
    pub base: EventBase,
    pub participant_id: String,
}

/// Call events pushed to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "eventType", content = "payload", rename_all = "snake_case")]
pub enum CallEvent {
    UserCallRequested(CallPayload),
    GroupCallRequested(GroupCallPayload),
    CallAccepted(CallPayload),
    CallRejected(CallPayload),
    CallEnded(CallEndedPayload),
    CallMissed(CallPayload),
    ParticipantLeft(ParticipantLeftPayload),
}

impl CallEvent {
    pub fn user_call_requested(room: &Room, sender_id: &str) -> Self {
        CallEvent::UserCallRequested(CallPayload {
            base: EventBase::new(room, sender_id),
        })
    }

    pub fn group_call_requested(room: &Room, sender_id: &str, group_id: &str) -> Self {
        CallEvent::GroupCallRequested(GroupCallPayload {
            base: EventBase::new(room, sender_id),
            group_id: group_id.to_string(),
        })
    }

    pub fn call_accepted(room: &Room, sender_id: &str) -> Self {
        CallEvent::CallAccepted(CallPayload {
            base: EventBase::new(room, sender_id),
        })
    }

    pub fn call_rejected(room: &Room, sender_id: &str) -> Self {
        CallEvent::CallRejected(CallPayload {
            base: EventBase::new(room, sender_id),
        })
    }

    pub fn call_ended(room: &Room, sender_id: &str, duration_seconds: u64) -> Self {
        CallEvent::CallEnded(CallEndedPayload {
            base: EventBase::new(room, sender_id),
            duration_seconds,
        })
    }

    pub fn call_missed(room: &Room, sender_id: &str) -> Self {
        CallEvent::CallMissed(CallPayload {
            base: EventBase::new(room, sender_id),
        })
    }

    pub fn participant_left(room: &Room, sender_id: &str) -> Self {
        CallEvent::ParticipantLeft(ParticipantLeftPayload {
            base: EventBase::new(room, sender_id),
            participant_id: sender_id.to_string(),
        })
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::UserCallRequested(_) => "user_call_requested",
            CallEvent::GroupCallRequested(_) => "group_call_requested",
            CallEvent::CallAccepted(_) => "call_accepted",
            CallEvent::CallRejected(_) => "call_rejected",
            CallEvent::CallEnded(_) => "call_ended",
            CallEvent::CallMissed(_) => "call_missed",
            CallEvent::ParticipantLeft(_) => "participant_left",
        }
    }

    pub fn base(&self) -> &EventBase {
        match self {
            CallEvent::UserCallRequested(p)
            | CallEvent::CallAccepted(p)
            | CallEvent::CallRejected(p)
            | CallEvent::CallMissed(p) => &p.base,
            CallEvent::GroupCallRequested(p) => &p.base,
            CallEvent::CallEnded(p) => &p.base,
            CallEvent::ParticipantLeft(p) => &p.base,
        }
    }

    fn base_mut(&mut self) -> &mut EventBase {
        match self {
            CallEvent::UserCallRequested(p)
            | CallEvent::CallAccepted(p)
            | CallEvent::CallRejected(p)
            | CallEvent::CallMissed(p) => &mut p.base,
            CallEvent::GroupCallRequested(p) => &mut p.base,
            CallEvent::CallEnded(p) => &mut p.base,
            CallEvent::ParticipantLeft(p) => &mut p.base,
        }
    }

    /// Copy of this event addressed to `recipient_id`.
    pub fn for_recipient(&self, recipient_id: &str) -> Self {
        let mut event = self.clone();
        event.base_mut().recipient_id = recipient_id.to_string();
        event
    }
}

/// One push delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub recipient_id: String,
    #[serde(flatten)]
    pub event: CallEvent,
}

impl PushEnvelope {
    pub fn new(recipient_id: &str, event: &CallEvent) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            event: event.for_recipient(recipient_id),
        }
    }
}

/// Push delivery transport.
#[async_trait]
pub trait PushService: Send + Sync {
    async fn push(&self, envelope: &PushEnvelope) -> Result<(), LiveError>;
}

/// HTTP client for the push service.
#[derive(Clone)]
pub struct PushClient {
    http: UpstreamHttp,
}

impl PushClient {
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, LiveError> {
        Ok(Self {
            http: UpstreamHttp::new("push-service", base_url)?,
        })
    }
}

#[async_trait]
impl PushService for PushClient {
    #[instrument(skip_all, fields(recipient_id = %envelope.recipient_id, event_type = envelope.event.event_type()))]
    async fn push(&self, envelope: &PushEnvelope) -> Result<(), LiveError> {
        self.http.send("/v1/push", envelope).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{RoomOption, RoomType};

    fn room() -> Room {
        Room::new(
            RoomType::GroupCall,
            "alice",
            Some("g1".to_string()),
            &["bob".to_string()],
            10,
            RoomOption::default(),
        )
    }

    #[test]
    fn test_envelope_wire_format() {
        let room = room();
        let event = CallEvent::group_call_requested(&room, "alice", "g1");
        let json = serde_json::to_value(PushEnvelope::new("bob", &event)).unwrap();

        assert_eq!(json["recipientId"], "bob");
        assert_eq!(json["eventType"], "group_call_requested");
        assert_eq!(json["payload"]["senderId"], "alice");
        assert_eq!(json["payload"]["recipientId"], "bob");
        assert_eq!(json["payload"]["groupId"], "g1");
        assert_eq!(json["payload"]["room"]["creator"], "alice");
    }

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let room = room();
        for event in [
            CallEvent::user_call_requested(&room, "alice"),
            CallEvent::call_accepted(&room, "bob"),
            CallEvent::call_rejected(&room, "bob"),
            CallEvent::call_ended(&room, "bob", 42),
            CallEvent::call_missed(&room, "alice"),
            CallEvent::participant_left(&room, "bob"),
        ] {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["eventType"], event.event_type());
        }
    }

    #[test]
    fn test_for_recipient_only_changes_recipient() {
        let room = room();
        let event = CallEvent::call_ended(&room, "bob", 42);
        let addressed = event.for_recipient("alice");

        assert_eq!(addressed.base().recipient_id, "alice");
        assert_eq!(addressed.base().sender_id, "bob");
        assert!(event.base().recipient_id.is_empty());
    }
}
