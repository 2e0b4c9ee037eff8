//! Redis-backed room store.
//!
//! # Key Patterns
//!
//! - `live.User.<user_id>` - Room id the user is in (string)
//! - `live.Group.<group_id>` - Room id of the group's call (string)
//! - `live.Room.<room_id>` - Serialized `Room` (JSON)
//!
//! New keys get the ring timeout as TTL; answering a call persists them.
//!
//! # Connection Pattern
//!
//! `MultiplexedConnection` is cheap to clone and safe for concurrent use.
//! Every operation clones it; no locking.

use crate::errors::LiveError;
use crate::models::Room;
use crate::observability::metrics;
use crate::redis::lua_scripts;
use crate::repositories::rooms::{group_key, room_key, user_key, ROOM_KEY_PREFIX};
use crate::repositories::{Expiration, RoomRepository};
use async_trait::async_trait;
use common::types::RoomId;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Room store backed by Redis.
///
/// Cheaply cloneable; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisRoomStore {
    connection: MultiplexedConnection,
    /// TTL for newly written keys (the ring timeout).
    default_ttl: Duration,
    /// Deadline for a single cache round trip.
    op_timeout: Duration,
    update_keep_ttl_script: Script,
    update_if_exists_script: Script,
    claim_pointers_script: Script,
    persist_if_exists_script: Script,
    compare_and_delete_script: Script,
}

/// Which kind of presence pointer a key is.
#[derive(Debug, Clone, Copy)]
enum PointerKind {
    User,
    Group,
}

impl PointerKind {
    fn as_str(self) -> &'static str {
        match self {
            PointerKind::User => "user",
            PointerKind::Group => "group",
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

impl RedisRoomStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::Cache` if the URL is invalid or the connection fails.
    pub async fn new(
        redis_url: &str,
        default_ttl: Duration,
        op_timeout: Duration,
    ) -> Result<Self, LiveError> {
        // Do NOT log redis_url: it may carry a password
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "live.redis", error = %e, "Failed to open Redis client");
            LiveError::Cache(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = tokio::time::timeout(op_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| LiveError::Cache("Timed out connecting to Redis".to_string()))?
            .map_err(|e| {
                error!(target: "live.redis", error = %e, "Failed to connect to Redis");
                LiveError::Cache(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            default_ttl,
            op_timeout,
            update_keep_ttl_script: Script::new(lua_scripts::UPDATE_KEEP_TTL),
            update_if_exists_script: Script::new(lua_scripts::UPDATE_IF_EXISTS),
            claim_pointers_script: Script::new(lua_scripts::CLAIM_POINTERS),
            persist_if_exists_script: Script::new(lua_scripts::PERSIST_IF_EXISTS),
            compare_and_delete_script: Script::new(lua_scripts::COMPARE_AND_DELETE),
        })
    }

    /// Run one cache round trip under the operation deadline.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, LiveError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.op_timeout, fut).await;
        metrics::record_cache_latency(operation, start.elapsed());

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(target: "live.redis", error = %e, operation, "Cache operation failed");
                Err(LiveError::Cache(format!("{operation} failed: {e}")))
            }
            Err(_) => {
                warn!(
                    target: "live.redis",
                    operation,
                    timeout_ms = ttl_millis(self.op_timeout),
                    "Cache operation timed out"
                );
                Err(LiveError::Cache(format!("{operation} timed out")))
            }
        }
    }

    async fn claim(
        &self,
        room_id: &RoomId,
        keys: &[String],
    ) -> Result<Option<usize>, LiveError> {
        let mut conn = self.connection.clone();
        let mut invocation = self.claim_pointers_script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        invocation
            .arg(room_id.to_string())
            .arg(ttl_millis(self.default_ttl))
            .arg(ROOM_KEY_PREFIX);

        let conflict: i64 = self
            .run("claim_pointers", async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;

        Ok(usize::try_from(conflict)
            .ok()
            .filter(|i| *i > 0)
            .map(|i| i - 1))
    }

    async fn compare_and_delete(&self, keys: &[String], expected: &str) -> Result<i64, LiveError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let mut invocation = self.compare_and_delete_script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        invocation.arg(expected);

        self.run("compare_and_delete", async move {
            invocation.invoke_async(&mut conn).await
        })
        .await
    }

    async fn persist_all(&self, keys: &[String]) -> Result<(), LiveError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let mut invocation = self.persist_if_exists_script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }

        let persisted: i64 = self
            .run("persist", async move { invocation.invoke_async(&mut conn).await })
            .await?;

        if persisted == 1 {
            Ok(())
        } else {
            debug!(target: "live.redis", keys = keys.len(), "Persist target already expired");
            Err(LiveError::CallNotFound)
        }
    }

    /// Follow a presence pointer to its room, removing it if it dangles.
    async fn resolve_pointer(&self, kind: PointerKind, key: String) -> Result<Room, LiveError> {
        let mut conn = self.connection.clone();
        let lookup_key = key.clone();
        let pointer: Option<String> = self
            .run("get_pointer", async move { conn.get(&lookup_key).await })
            .await?;
        let Some(raw_room_id) = pointer else {
            return Err(LiveError::CallNotFound);
        };

        let lookup = match raw_room_id.parse::<RoomId>() {
            Ok(room_id) => self.get_room(&room_id).await,
            Err(_) => Err(LiveError::CallNotFound),
        };

        match lookup {
            Err(LiveError::CallNotFound) => {
                let repaired = self
                    .compare_and_delete(std::slice::from_ref(&key), &raw_room_id)
                    .await?;
                if repaired > 0 {
                    metrics::record_stale_pointer_repaired(kind.as_str());
                    warn!(
                        target: "live.redis",
                        kind = kind.as_str(),
                        room_id = %raw_room_id,
                        "Removed presence pointer into missing room"
                    );
                }
                Err(LiveError::CallNotFound)
            }
            other => other,
        }
    }
}

#[async_trait]
impl RoomRepository for RedisRoomStore {
    #[instrument(skip_all, fields(room_id = %room.id))]
    async fn create_room(&self, room: &Room) -> Result<(), LiveError> {
        let json = serde_json::to_string(room)?;
        let key = room_key(&room.id);
        let ttl = ttl_millis(self.default_ttl);
        let mut conn = self.connection.clone();

        self.run("create_room", async move {
            redis::cmd("SET")
                .arg(&key)
                .arg(&json)
                .arg("PX")
                .arg(ttl)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;

        debug!(target: "live.redis", room_id = %room.id, "Stored room");
        Ok(())
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn get_room(&self, room_id: &RoomId) -> Result<Room, LiveError> {
        let key = room_key(room_id);
        let mut conn = self.connection.clone();
        let raw: Option<String> = self
            .run("get_room", async move { conn.get(&key).await })
            .await?;

        match raw {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                error!(target: "live.redis", error = %e, room_id = %room_id, "Corrupt room record");
                LiveError::Cache(format!("Failed to deserialize room: {e}"))
            }),
            None => Err(LiveError::CallNotFound),
        }
    }

    #[instrument(skip_all, fields(room_id = %room.id, expiration = ?expiration))]
    async fn update_room_with_expiration(
        &self,
        room: &Room,
        expiration: Expiration,
    ) -> Result<(), LiveError> {
        let json = serde_json::to_string(room)?;
        let key = room_key(&room.id);
        let mut conn = self.connection.clone();

        let written: i64 = match expiration {
            Expiration::KeepCurrent => {
                let mut invocation = self.update_keep_ttl_script.prepare_invoke();
                invocation.key(&key).arg(&json);
                self.run("update_room", async move {
                    invocation.invoke_async(&mut conn).await
                })
                .await?
            }
            Expiration::Persist | Expiration::After(_) => {
                let ttl = match expiration {
                    Expiration::After(ttl) => ttl_millis(ttl).max(1),
                    _ => 0,
                };
                let mut invocation = self.update_if_exists_script.prepare_invoke();
                invocation.key(&key).arg(&json).arg(ttl);
                self.run("update_room", async move {
                    invocation.invoke_async(&mut conn).await
                })
                .await?
            }
        };

        if written == 1 {
            Ok(())
        } else {
            debug!(target: "live.redis", room_id = %room.id, "Update target already expired");
            Err(LiveError::CallNotFound)
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn delete_room(&self, room_id: &RoomId) -> Result<(), LiveError> {
        let key = room_key(room_id);
        let mut conn = self.connection.clone();
        let _: i64 = self
            .run("delete_room", async move { conn.del(&key).await })
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(room_id = %room_id, count = user_ids.len()))]
    async fn create_users_live(
        &self,
        room_id: &RoomId,
        user_ids: &[String],
    ) -> Result<(), LiveError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();

        match self.claim(room_id, &keys).await? {
            None => Ok(()),
            Some(index) => {
                let user_id = user_ids.get(index).map_or("unknown", String::as_str);
                debug!(target: "live.redis", room_id = %room_id, user_id = %user_id, "Presence claim conflict");
                Err(LiveError::AlreadyInCall(format!(
                    "User {user_id} is already in a call"
                )))
            }
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id, count = user_ids.len()))]
    async fn delete_users_live(
        &self,
        room_id: &RoomId,
        user_ids: &[String],
    ) -> Result<(), LiveError> {
        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();
        self.compare_and_delete(&keys, &room_id.to_string()).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(room_id = %room_id, group_id = %group_id))]
    async fn create_group_live(&self, room_id: &RoomId, group_id: &str) -> Result<(), LiveError> {
        match self.claim(room_id, &[group_key(group_id)]).await? {
            None => Ok(()),
            Some(_) => Err(LiveError::AlreadyInCall(
                "Group already has an active call".to_string(),
            )),
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id, group_id = %group_id))]
    async fn delete_group_live(&self, room_id: &RoomId, group_id: &str) -> Result<(), LiveError> {
        self.compare_and_delete(&[group_key(group_id)], &room_id.to_string())
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(group_id = %group_id))]
    async fn get_group_room(&self, group_id: &str) -> Result<Room, LiveError> {
        self.resolve_pointer(PointerKind::Group, group_key(group_id))
            .await
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn get_user_rooms(&self, user_id: &str) -> Result<Room, LiveError> {
        self.resolve_pointer(PointerKind::User, user_key(user_id))
            .await
    }

    #[instrument(skip_all, fields(count = user_ids.len()))]
    async fn set_user_live_persist(&self, user_ids: &[String]) -> Result<(), LiveError> {
        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();
        self.persist_all(&keys).await
    }

    #[instrument(skip_all, fields(group_id = %group_id))]
    async fn set_group_live_persist(&self, group_id: &str) -> Result<(), LiveError> {
        self.persist_all(&[group_key(group_id)]).await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn set_room_persist(&self, room_id: &RoomId) -> Result<(), LiveError> {
        self.persist_all(&[room_key(room_id)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_saturates() {
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_pointer_kind_labels() {
        assert_eq!(PointerKind::User.as_str(), "user");
        assert_eq!(PointerKind::Group.as_str(), "group");
    }

    #[tokio::test]
    async fn test_new_rejects_malformed_url() {
        let result = RedisRoomStore::new(
            "not-a-redis-url",
            Duration::from_secs(60),
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(LiveError::Cache(_))));
    }
}
