//! Scriptable media signaling server.
//!
//! Rooms live in memory. Media membership only changes when a test says
//! so (`connect`/`disconnect`), the way real clients connect to the media
//! server on their own after obtaining a token.

use async_trait::async_trait;
use live_service::errors::LiveError;
use live_service::models::{LiveParticipant, SignalingRoomInfo};
use live_service::services::SignalingService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MediaRoom {
    max_participants: u32,
    creation_time: i64,
    participants: Vec<LiveParticipant>,
    extra_occupancy: u32,
}

impl MediaRoom {
    fn info(&self, name: &str) -> SignalingRoomInfo {
        SignalingRoomInfo {
            name: name.to_string(),
            num_participants: u32::try_from(self.participants.len()).unwrap()
                + self.extra_occupancy,
            max_participants: self.max_participants,
            creation_time: self.creation_time,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    rooms: HashMap<String, MediaRoom>,
    created: Vec<String>,
    deleted: Vec<String>,
    removed: Vec<(String, String)>,
    fail_create: bool,
    unavailable: bool,
}

/// In-memory `SignalingService`.
#[derive(Debug, Clone, Default)]
pub struct MockSignaling {
    inner: Arc<Mutex<Inner>>,
}

impl MockSignaling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next room creations with a signaling error.
    pub fn fail_create(&self, fail: bool) {
        self.inner.lock().unwrap().fail_create = fail;
    }

    /// Fail every call with a signaling error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Simulate a client connecting to the media room.
    pub fn connect(&self, room: &str, identity: &str) {
        let mut inner = self.inner.lock().unwrap();
        let media = inner.rooms.get_mut(room).expect("media room exists");
        media.participants.push(LiveParticipant {
            identity: identity.to_string(),
            state: "ACTIVE".to_string(),
            is_publisher: true,
            joined_at: chrono::Utc::now().timestamp(),
        });
    }

    /// Simulate a client dropping off the media room.
    pub fn disconnect(&self, room: &str, identity: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(media) = inner.rooms.get_mut(room) {
            media.participants.retain(|p| p.identity != identity);
        }
    }

    /// Pretend `count` extra clients occupy the room (e.g. reconnect ghosts).
    pub fn add_phantom_occupants(&self, room: &str, count: u32) {
        let mut inner = self.inner.lock().unwrap();
        let media = inner.rooms.get_mut(room).expect("media room exists");
        media.extra_occupancy += count;
    }

    /// Backdate a room's creation time.
    pub fn set_creation_time(&self, room: &str, unix_seconds: i64) {
        let mut inner = self.inner.lock().unwrap();
        let media = inner.rooms.get_mut(room).expect("media room exists");
        media.creation_time = unix_seconds;
    }

    /// Make a room vanish as if its empty timeout had elapsed.
    pub fn expire_room(&self, room: &str) {
        self.inner.lock().unwrap().rooms.remove(room);
    }

    pub fn has_room(&self, room: &str) -> bool {
        self.inner.lock().unwrap().rooms.contains_key(room)
    }

    pub fn created_rooms(&self) -> Vec<String> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn deleted_rooms(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }

    /// `(room, identity)` pairs removed through the API.
    pub fn removed_participants(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().removed.clone()
    }

    fn check_available(&self) -> Result<(), LiveError> {
        if self.inner.lock().unwrap().unavailable {
            return Err(LiveError::Signaling("signaling unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SignalingService for MockSignaling {
    async fn create_room(
        &self,
        name: &str,
        _empty_timeout: Duration,
        max_participants: u32,
    ) -> Result<SignalingRoomInfo, LiveError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create {
            return Err(LiveError::Signaling("CreateRoom failed".to_string()));
        }
        let media = inner
            .rooms
            .entry(name.to_string())
            .or_insert_with(|| MediaRoom {
                max_participants,
                creation_time: chrono::Utc::now().timestamp(),
                participants: Vec::new(),
                extra_occupancy: 0,
            })
            .clone();
        inner.created.push(name.to_string());
        Ok(media.info(name))
    }

    async fn delete_room(&self, name: &str) -> Result<(), LiveError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.rooms.remove(name);
        inner.deleted.push(name.to_string());
        Ok(())
    }

    async fn list_rooms(&self, names: &[String]) -> Result<Vec<SignalingRoomInfo>, LiveError> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        Ok(names
            .iter()
            .filter_map(|name| inner.rooms.get(name).map(|room| room.info(name)))
            .collect())
    }

    async fn list_participants(&self, room: &str) -> Result<Vec<LiveParticipant>, LiveError> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rooms
            .get(room)
            .map(|r| r.participants.clone())
            .unwrap_or_default())
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), LiveError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(media) = inner.rooms.get_mut(room) {
            media.participants.retain(|p| p.identity != identity);
        }
        inner.removed.push((room.to_string(), identity.to_string()));
        Ok(())
    }

    fn issue_token(&self, room: &str, identity: &str, admin: bool) -> Result<String, LiveError> {
        let role = if admin { "admin" } else { "participant" };
        Ok(format!("token:{room}:{identity}:{role}"))
    }
}
