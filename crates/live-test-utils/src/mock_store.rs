//! In-memory room store.
//!
//! Implements `RoomRepository` over a key map with per-key deadlines on the
//! tokio clock, so `tokio::time::pause`/`advance` drives expiry. Keys and
//! claim/repair/persist rules mirror the Redis store, including the room
//! records being stored as JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = InMemoryRoomStore::new(Duration::from_secs(60));
//! store.seed_user_pointer("bob", &RoomId::new()); // dangling pointer
//!
//! assert!(matches!(store.get_user_rooms("bob").await, Err(LiveError::CallNotFound)));
//! assert_eq!(store.user_pointer("bob"), None); // repaired
//! ```

use async_trait::async_trait;
use common::types::RoomId;
use live_service::errors::LiveError;
use live_service::models::Room;
use live_service::repositories::rooms::{group_key, room_key, user_key, ROOM_KEY_PREFIX};
use live_service::repositories::{Expiration, RoomRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, Entry>,
    unavailable: bool,
    repaired_pointers: usize,
}

impl Inner {
    fn purge(&mut self, key: &str) {
        let now = Instant::now();
        if self
            .keys
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|deadline| deadline <= now)
        {
            self.keys.remove(key);
        }
    }

    fn get(&mut self, key: &str) -> Option<Entry> {
        self.purge(key);
        self.keys.get(key).cloned()
    }

    fn exists(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expiring(Duration),
}

/// In-memory `RoomRepository`.
#[derive(Debug, Clone)]
pub struct InMemoryRoomStore {
    inner: Arc<Mutex<Inner>>,
    default_ttl: Duration,
}

impl InMemoryRoomStore {
    /// Create an empty store whose new keys live for `default_ttl`.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            default_ttl,
        }
    }

    /// Make every subsequent operation fail with a cache error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Point `user_id` at `room_id` directly, bypassing claim rules.
    pub fn seed_user_pointer(&self, user_id: &str, room_id: &RoomId) {
        let deadline = Instant::now() + self.default_ttl;
        self.inner.lock().unwrap().keys.insert(
            user_key(user_id),
            Entry {
                value: room_id.to_string(),
                expires_at: Some(deadline),
            },
        );
    }

    /// Point `group_id` at `room_id` directly, bypassing claim rules.
    pub fn seed_group_pointer(&self, group_id: &str, room_id: &RoomId) {
        let deadline = Instant::now() + self.default_ttl;
        self.inner.lock().unwrap().keys.insert(
            group_key(group_id),
            Entry {
                value: room_id.to_string(),
                expires_at: Some(deadline),
            },
        );
    }

    /// Remove a room record without touching pointers.
    pub fn drop_room(&self, room_id: &RoomId) {
        self.inner.lock().unwrap().keys.remove(&room_key(room_id));
    }

    /// Room the user pointer currently names, if any.
    pub fn user_pointer(&self, user_id: &str) -> Option<RoomId> {
        self.pointer(&user_key(user_id))
    }

    /// Room the group pointer currently names, if any.
    pub fn group_pointer(&self, group_id: &str) -> Option<RoomId> {
        self.pointer(&group_key(group_id))
    }

    fn pointer(&self, key: &str) -> Option<RoomId> {
        let mut inner = self.inner.lock().unwrap();
        inner.get(key).and_then(|e| e.value.parse().ok())
    }

    /// Stored room record, if live.
    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .get(&room_key(room_id))
            .map(|e| serde_json::from_str(&e.value).unwrap())
    }

    pub fn room_ttl(&self, room_id: &RoomId) -> KeyTtl {
        self.ttl(&room_key(room_id))
    }

    pub fn user_ttl(&self, user_id: &str) -> KeyTtl {
        self.ttl(&user_key(user_id))
    }

    pub fn group_ttl(&self, group_id: &str) -> KeyTtl {
        self.ttl(&group_key(group_id))
    }

    fn ttl(&self, key: &str) -> KeyTtl {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(deadline),
                ..
            }) => KeyTtl::Expiring(deadline.saturating_duration_since(Instant::now())),
        }
    }

    /// Number of live keys of any kind.
    pub fn live_key_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<String> = inner.keys.keys().cloned().collect();
        keys.iter().filter(|k| inner.exists(k)).count()
    }

    /// Dangling pointers removed by lookups so far.
    pub fn repaired_pointers(&self) -> usize {
        self.inner.lock().unwrap().repaired_pointers
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, LiveError> {
        let inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(LiveError::Cache("cache unavailable".to_string()));
        }
        Ok(inner)
    }

    fn deadline(&self) -> Option<Instant> {
        Some(Instant::now() + self.default_ttl)
    }

    /// Returns the index of the first conflicting key.
    fn claim(&self, room_id: &RoomId, keys: &[String]) -> Result<Option<usize>, LiveError> {
        let mut inner = self.lock()?;
        let value = room_id.to_string();

        for (index, key) in keys.iter().enumerate() {
            if let Some(existing) = inner.get(key) {
                let other_room = format!("{ROOM_KEY_PREFIX}{}", existing.value);
                if existing.value != value && inner.exists(&other_room) {
                    return Ok(Some(index));
                }
            }
        }

        let deadline = self.deadline();
        for key in keys {
            let keep_persistent = inner
                .get(key)
                .is_some_and(|e| e.value == value && e.expires_at.is_none());
            if !keep_persistent {
                inner.keys.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        expires_at: deadline,
                    },
                );
            }
        }
        Ok(None)
    }

    fn compare_and_delete(&self, keys: &[String], expected: &str) -> Result<usize, LiveError> {
        let mut inner = self.lock()?;
        let mut deleted = 0;
        for key in keys {
            if inner.get(key).is_some_and(|e| e.value == expected) {
                inner.keys.remove(key);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn persist_all(&self, keys: &[String]) -> Result<(), LiveError> {
        let mut inner = self.lock()?;
        if !keys.iter().all(|k| inner.exists(k)) {
            return Err(LiveError::CallNotFound);
        }
        for key in keys {
            if let Some(entry) = inner.keys.get_mut(key) {
                entry.expires_at = None;
            }
        }
        Ok(())
    }

    async fn resolve_pointer(&self, key: String) -> Result<Room, LiveError> {
        let raw = {
            let mut inner = self.lock()?;
            match inner.get(&key) {
                Some(entry) => entry.value,
                None => return Err(LiveError::CallNotFound),
            }
        };

        let lookup = match raw.parse::<RoomId>() {
            Ok(room_id) => self.get_room(&room_id).await,
            Err(_) => Err(LiveError::CallNotFound),
        };

        if let Err(LiveError::CallNotFound) = lookup {
            if self.compare_and_delete(std::slice::from_ref(&key), &raw)? > 0 {
                self.inner.lock().unwrap().repaired_pointers += 1;
            }
        }
        lookup
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomStore {
    async fn create_room(&self, room: &Room) -> Result<(), LiveError> {
        let value = serde_json::to_string(room)?;
        let deadline = self.deadline();
        self.lock()?.keys.insert(
            room_key(&room.id),
            Entry {
                value,
                expires_at: deadline,
            },
        );
        Ok(())
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Room, LiveError> {
        let entry = self
            .lock()?
            .get(&room_key(room_id))
            .ok_or(LiveError::CallNotFound)?;
        Ok(serde_json::from_str(&entry.value)?)
    }

    async fn update_room_with_expiration(
        &self,
        room: &Room,
        expiration: Expiration,
    ) -> Result<(), LiveError> {
        let value = serde_json::to_string(room)?;
        let key = room_key(&room.id);
        let mut inner = self.lock()?;
        let current = inner.get(&key).ok_or(LiveError::CallNotFound)?;

        let expires_at = match expiration {
            Expiration::Persist => None,
            Expiration::KeepCurrent => current.expires_at,
            Expiration::After(ttl) => Some(Instant::now() + ttl),
        };
        inner.keys.insert(key, Entry { value, expires_at });
        Ok(())
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<(), LiveError> {
        self.lock()?.keys.remove(&room_key(room_id));
        Ok(())
    }

    async fn create_users_live(
        &self,
        room_id: &RoomId,
        user_ids: &[String],
    ) -> Result<(), LiveError> {
        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();
        match self.claim(room_id, &keys)? {
            None => Ok(()),
            Some(index) => Err(LiveError::AlreadyInCall(format!(
                "User {} is already in a call",
                user_ids.get(index).map_or("unknown", String::as_str)
            ))),
        }
    }

    async fn delete_users_live(
        &self,
        room_id: &RoomId,
        user_ids: &[String],
    ) -> Result<(), LiveError> {
        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();
        self.compare_and_delete(&keys, &room_id.to_string())?;
        Ok(())
    }

    async fn create_group_live(&self, room_id: &RoomId, group_id: &str) -> Result<(), LiveError> {
        match self.claim(room_id, &[group_key(group_id)])? {
            None => Ok(()),
            Some(_) => Err(LiveError::AlreadyInCall(
                "Group already has an active call".to_string(),
            )),
        }
    }

    async fn delete_group_live(&self, room_id: &RoomId, group_id: &str) -> Result<(), LiveError> {
        self.compare_and_delete(&[group_key(group_id)], &room_id.to_string())?;
        Ok(())
    }

    async fn get_group_room(&self, group_id: &str) -> Result<Room, LiveError> {
        self.resolve_pointer(group_key(group_id)).await
    }

    async fn get_user_rooms(&self, user_id: &str) -> Result<Room, LiveError> {
        self.resolve_pointer(user_key(user_id)).await
    }

    async fn set_user_live_persist(&self, user_ids: &[String]) -> Result<(), LiveError> {
        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();
        self.persist_all(&keys)
    }

    async fn set_group_live_persist(&self, group_id: &str) -> Result<(), LiveError> {
        self.persist_all(&[group_key(group_id)])
    }

    async fn set_room_persist(&self, room_id: &RoomId) -> Result<(), LiveError> {
        self.persist_all(&[room_key(room_id)])
    }
}
