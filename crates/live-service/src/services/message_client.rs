//! Message service client.
//!
//! Posts call summaries ("Call rejected", "Call duration 02:13", ...) into
//! the one-to-one conversation between the call parties.

use crate::errors::LiveError;
use crate::services::upstream::UpstreamHttp;
use async_trait::async_trait;
use common::types::RoomId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

/// Kind of chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Call,
}

/// A message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub msg_type: MessageType,
    pub content: String,
    /// Call the message refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Unix milliseconds.
    pub send_time: i64,
}

/// Summary text of how a one-to-one call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSummary {
    Rejected,
    Cancelled,
    Missed,
    Duration(Duration),
}

impl CallSummary {
    pub fn content(&self) -> String {
        match self {
            CallSummary::Rejected => "Call rejected".to_string(),
            CallSummary::Cancelled => "Call cancelled".to_string(),
            CallSummary::Missed => "Missed call".to_string(),
            CallSummary::Duration(d) => format!("Call duration {}", format_duration(*d)),
        }
    }
}

/// `HH:MM:SS`, or `MM:SS` under an hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Chat message delivery.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn send_user_message(&self, message: &UserMessage) -> Result<(), LiveError>;
}

/// HTTP client for the message service.
#[derive(Clone)]
pub struct MessageClient {
    http: UpstreamHttp,
}

impl MessageClient {
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, LiveError> {
        Ok(Self {
            http: UpstreamHttp::new("message-service", base_url)?,
        })
    }
}

#[async_trait]
impl MessageService for MessageClient {
    #[instrument(skip_all, fields(sender_id = %message.sender_id, receiver_id = %message.receiver_id))]
    async fn send_user_message(&self, message: &UserMessage) -> Result<(), LiveError> {
        self.http.send("/v1/messages/user", message).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_under_an_hour() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00");
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3599)), "59:59");
    }

    #[test]
    fn test_format_duration_with_hours() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "01:00:00");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 7)), "03:00:07");
    }

    #[test]
    fn test_summary_content() {
        assert_eq!(CallSummary::Rejected.content(), "Call rejected");
        assert_eq!(CallSummary::Cancelled.content(), "Call cancelled");
        assert_eq!(CallSummary::Missed.content(), "Missed call");
        assert_eq!(
            CallSummary::Duration(Duration::from_secs(133)).content(),
            "Call duration 02:13"
        );
    }

    #[test]
    fn test_message_wire_format() {
        let message = UserMessage {
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            msg_type: MessageType::Call,
            content: "Missed call".to_string(),
            room_id: None,
            send_time: 1,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["msg_type"], "call");
        assert!(json.get("room_id").is_none());
    }
}
