//! Room state repository.
//!
//! Rooms and presence pointers live in separate cache keys with their own
//! TTLs. The store never touches a room's business fields; it only writes
//! what it is given and manages expiration.

use crate::errors::LiveError;
use crate::models::Room;
use async_trait::async_trait;
use common::types::RoomId;
use std::time::Duration;

/// Key prefix for per-user presence pointers.
pub const USER_KEY_PREFIX: &str = "live.User.";

/// Key prefix for per-group presence pointers.
pub const GROUP_KEY_PREFIX: &str = "live.Group.";

/// Key prefix for serialized rooms.
pub const ROOM_KEY_PREFIX: &str = "live.Room.";

pub fn user_key(user_id: &str) -> String {
    format!("{USER_KEY_PREFIX}{user_id}")
}

pub fn group_key(group_id: &str) -> String {
    format!("{GROUP_KEY_PREFIX}{group_id}")
}

pub fn room_key(room_id: &RoomId) -> String {
    format!("{ROOM_KEY_PREFIX}{room_id}")
}

/// TTL policy for overwriting an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Drop the TTL; the key lives until deleted.
    Persist,
    /// Keep whatever TTL currently remains (none stays none).
    KeepCurrent,
    /// Replace the TTL.
    After(Duration),
}

/// Repository over the expiring cache holding call state.
///
/// Writes that create keys use the store's default TTL (the ring timeout
/// plus a short grace).
/// Every operation is bounded by the store's operation deadline.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Write a new room with the default TTL.
    async fn create_room(&self, room: &Room) -> Result<(), LiveError>;

    /// Load a room. `CallNotFound` if absent or expired.
    async fn get_room(&self, room_id: &RoomId) -> Result<Room, LiveError>;

    /// Overwrite a room, keeping its remaining TTL.
    async fn update_room(&self, room: &Room) -> Result<(), LiveError> {
        self.update_room_with_expiration(room, Expiration::KeepCurrent)
            .await
    }

    /// Overwrite a room with an explicit TTL policy.
    ///
    /// Only existing rooms are overwritten; a room that expired in the
    /// meantime yields `CallNotFound` instead of being resurrected.
    async fn update_room_with_expiration(
        &self,
        room: &Room,
        expiration: Expiration,
    ) -> Result<(), LiveError>;

    /// Idempotent delete.
    async fn delete_room(&self, room_id: &RoomId) -> Result<(), LiveError>;

    /// Claim presence pointers for `user_ids`, all or nothing.
    ///
    /// Fails with `AlreadyInCall` if any identity already points at a
    /// different live room. Re-claiming for the same room succeeds.
    /// Pointers into rooms that no longer exist are overwritten.
    async fn create_users_live(&self, room_id: &RoomId, user_ids: &[String])
        -> Result<(), LiveError>;

    /// Clear presence pointers of `user_ids` that still point at `room_id`.
    async fn delete_users_live(&self, room_id: &RoomId, user_ids: &[String])
        -> Result<(), LiveError>;

    /// Claim the group pointer. Same rules as [`Self::create_users_live`].
    async fn create_group_live(&self, room_id: &RoomId, group_id: &str) -> Result<(), LiveError>;

    /// Clear the group pointer if it still points at `room_id`.
    async fn delete_group_live(&self, room_id: &RoomId, group_id: &str) -> Result<(), LiveError>;

    /// Resolve the group pointer to its room.
    ///
    /// `CallNotFound` if there is no pointer. A pointer into a missing room
    /// is removed and also reported as `CallNotFound`.
    async fn get_group_room(&self, group_id: &str) -> Result<Room, LiveError>;

    /// Resolve the user pointer to its room, with the same repair rule as
    /// [`Self::get_group_room`].
    async fn get_user_rooms(&self, user_id: &str) -> Result<Room, LiveError>;

    /// Drop the TTL of the listed user pointers. `CallNotFound` if any of
    /// them has already expired.
    async fn set_user_live_persist(&self, user_ids: &[String]) -> Result<(), LiveError>;

    /// Drop the TTL of the group pointer. `CallNotFound` if expired.
    async fn set_group_live_persist(&self, group_id: &str) -> Result<(), LiveError>;

    /// Drop the TTL of the room. `CallNotFound` if expired.
    async fn set_room_persist(&self, room_id: &RoomId) -> Result<(), LiveError>;
}
