//! Live service models.
//!
//! The `Room` record stored in the cache, its participants, and the
//! request/response bodies of the HTTP API.

use chrono::Utc;
use common::types::RoomId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Participant ceiling for one-to-one calls.
pub const USER_CALL_MAX_PARTICIPANTS: u32 = 2;

/// Call type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    /// One-to-one call between two contacts.
    UserCall,

    /// Call scoped to a group.
    GroupCall,
}

impl RoomType {
    /// Returns the string representation used in metric labels and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::UserCall => "user_call",
            RoomType::GroupCall => "group_call",
        }
    }
}

/// Per-participant state machine.
///
/// `Waiting -> Joining -> Joined -> Active`, with `Disconnected`
/// reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Waiting,
    Joining,
    Joined,
    Active,
    Disconnected,
}

impl ParticipantStatus {
    /// Whether entering this status marks the participant connected.
    pub fn is_connected_state(&self) -> bool {
        matches!(self, ParticipantStatus::Joined | ParticipantStatus::Active)
    }
}

/// A participant entry in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveParticipant {
    pub connected: bool,
    pub status: ParticipantStatus,
    #[serde(default)]
    pub driver_id: String,
}

impl ActiveParticipant {
    /// An invited participant that has not reacted yet.
    pub fn waiting() -> Self {
        Self {
            connected: false,
            status: ParticipantStatus::Waiting,
            driver_id: String::new(),
        }
    }

    /// Move to `status`. `connected` follows the status.
    pub fn transition(&mut self, status: ParticipantStatus) {
        self.status = status;
        self.connected = status.is_connected_state();
    }
}

/// Client-supplied media options. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomOption {
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub resolution: String,
    pub frame_rate: u32,
    pub codec: String,
}

/// A call session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,

    #[serde(rename = "type")]
    pub room_type: RoomType,

    pub creator: String,

    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    pub num_participants: u32,

    pub max_participants: u32,

    pub participants: HashMap<String, ActiveParticipant>,

    #[serde(default)]
    pub option: RoomOption,

    /// Creation time, unix milliseconds.
    pub created_at: i64,
}

impl Room {
    /// Build a fresh room.
    ///
    /// The creator enters `Joining` (not yet connected), every invitee
    /// enters `Waiting`. `num_participants` starts at zero and counts
    /// occupied seats; the creator of a one-to-one call holds a seat from
    /// the moment the callee answers.
    pub fn new(
        room_type: RoomType,
        creator: &str,
        group_id: Option<String>,
        invitees: &[String],
        max_participants: u32,
        option: RoomOption,
    ) -> Self {
        let mut participants: HashMap<String, ActiveParticipant> = invitees
            .iter()
            .filter(|id| id.as_str() != creator)
            .map(|id| (id.clone(), ActiveParticipant::waiting()))
            .collect();
        participants.insert(
            creator.to_string(),
            ActiveParticipant {
                connected: false,
                status: ParticipantStatus::Joining,
                driver_id: String::new(),
            },
        );

        Self {
            id: RoomId::new(),
            room_type,
            creator: creator.to_string(),
            owner: creator.to_string(),
            group_id,
            num_participants: 0,
            max_participants,
            participants,
            option,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn is_participant(&self, identity: &str) -> bool {
        self.participants.contains_key(identity)
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.participants
            .get(identity)
            .is_some_and(|p| p.connected)
    }

    /// Whether somebody other than the creator has picked up.
    pub fn is_answered(&self) -> bool {
        self.participants
            .iter()
            .any(|(id, p)| p.connected && *id != self.creator)
    }

    /// Connected participants other than `identity`.
    pub fn other_connected(&self, identity: &str) -> usize {
        self.participants
            .iter()
            .filter(|(id, p)| p.connected && id.as_str() != identity)
            .count()
    }

    /// Every participant id, sorted for stable fan-out order.
    pub fn participant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.participants.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every participant id except `identity`.
    pub fn recipients_except(&self, identity: &str) -> Vec<String> {
        self.participant_ids()
            .into_iter()
            .filter(|id| id != identity)
            .collect()
    }

    /// The other party of a one-to-one call.
    pub fn peer_of(&self, identity: &str) -> Option<String> {
        self.participants
            .keys()
            .find(|id| id.as_str() != identity)
            .cloned()
    }
}

// ============================================================================
// Signaling views
// ============================================================================

/// A media room as reported by the signaling service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingRoomInfo {
    pub name: String,
    pub num_participants: u32,
    pub max_participants: u32,
    /// Unix seconds.
    pub creation_time: i64,
}

/// A media participant as reported by the signaling service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveParticipant {
    pub identity: String,
    pub state: String,
    pub is_publisher: bool,
    /// Unix seconds.
    pub joined_at: i64,
}

// ============================================================================
// HTTP API Models
// ============================================================================

/// Body of `POST /v1/live/rooms`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(rename = "type")]
    pub room_type: RoomType,

    #[serde(default)]
    pub group_id: Option<String>,

    /// Invited identities, excluding the caller.
    #[serde(default)]
    pub participants: Vec<String>,

    #[serde(default)]
    pub option: RoomOption,
}

/// Response of `POST /v1/live/rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    /// Signaling endpoint clients connect to.
    pub url: String,
    pub ring_timeout_seconds: u64,
}

/// Response of `POST /v1/live/rooms/{room_id}/join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub room: Room,
    pub url: String,
    /// Signaling access token.
    pub token: String,
}

/// Response of the room query endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub room: Room,
    pub url: String,
    /// Live media membership from the signaling service.
    pub live_participants: Vec<LiveParticipant>,
}
