//! Room repository contract tests.
//!
//! The shared checks run against the in-memory store used by the service
//! tests. The `redis_backed` module runs the same checks against a real Redis
//! (`LIVE_TEST_REDIS_URL`) and is ignored by default.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use live_service::errors::LiveError;
use live_service::models::{Room, RoomOption, RoomType};
use live_service::repositories::{Expiration, RoomRepository};
use live_test_utils::{InMemoryRoomStore, KeyTtl};
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

fn user_call(creator: &str, callee: &str) -> Room {
    Room::new(
        RoomType::UserCall,
        creator,
        None,
        &[callee.to_string()],
        2,
        RoomOption::default(),
    )
}

fn ids(users: &[&str]) -> Vec<String> {
    users.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Shared contract
// ============================================================================

async fn check_room_round_trip(store: &dyn RoomRepository) -> Result<(), anyhow::Error> {
    let mut room = user_call("alice", "bob");
    store.create_room(&room).await?;

    let loaded = store.get_room(&room.id).await?;
    assert_eq!(loaded, room);

    room.num_participants = 1;
    store.update_room(&room).await?;
    assert_eq!(store.get_room(&room.id).await?.num_participants, 1);

    store.delete_room(&room.id).await?;
    store.delete_room(&room.id).await?;
    assert!(matches!(
        store.get_room(&room.id).await,
        Err(LiveError::CallNotFound)
    ));
    Ok(())
}

async fn check_update_does_not_resurrect(store: &dyn RoomRepository) -> Result<(), anyhow::Error> {
    let room = user_call("alice", "bob");

    let result = store
        .update_room_with_expiration(&room, Expiration::Persist)
        .await;

    assert!(matches!(result, Err(LiveError::CallNotFound)));
    assert!(store.get_room(&room.id).await.is_err());
    Ok(())
}

async fn check_claims(store: &dyn RoomRepository) -> Result<(), anyhow::Error> {
    let first = user_call("carol", "dave");
    let second = user_call("carol", "erin");
    store.create_room(&first).await?;
    store.create_room(&second).await?;

    store
        .create_users_live(&first.id, &ids(&["carol", "dave"]))
        .await?;
    // Re-claiming for the same room is fine
    store
        .create_users_live(&first.id, &ids(&["carol", "dave"]))
        .await?;

    let conflict = store
        .create_users_live(&second.id, &ids(&["erin", "carol"]))
        .await;
    assert!(matches!(conflict, Err(LiveError::AlreadyInCall(_))));
    // All or nothing: erin was not claimed
    assert!(matches!(
        store.get_user_rooms("erin").await,
        Err(LiveError::CallNotFound)
    ));

    assert_eq!(store.get_user_rooms("dave").await?.id, first.id);

    // Releasing with the wrong room id leaves the pointer alone
    store.delete_users_live(&second.id, &ids(&["carol"])).await?;
    assert_eq!(store.get_user_rooms("carol").await?.id, first.id);

    store
        .delete_users_live(&first.id, &ids(&["carol", "dave"]))
        .await?;
    assert!(store.get_user_rooms("carol").await.is_err());

    store.delete_room(&first.id).await?;
    store.delete_room(&second.id).await?;
    Ok(())
}

async fn check_stale_pointer_is_replaced(store: &dyn RoomRepository) -> Result<(), anyhow::Error> {
    let old = user_call("frank", "grace");
    let new = user_call("frank", "heidi");
    store.create_room(&old).await?;
    store.create_room(&new).await?;
    store.create_users_live(&old.id, &ids(&["frank"])).await?;

    store.delete_room(&old.id).await?;
    store.create_users_live(&new.id, &ids(&["frank"])).await?;

    assert_eq!(store.get_user_rooms("frank").await?.id, new.id);

    store.delete_users_live(&new.id, &ids(&["frank"])).await?;
    store.delete_room(&new.id).await?;
    Ok(())
}

async fn check_group_pointer(store: &dyn RoomRepository) -> Result<(), anyhow::Error> {
    let room = Room::new(
        RoomType::GroupCall,
        "ivan",
        Some("g-contract".to_string()),
        &[],
        8,
        RoomOption::default(),
    );
    let other = user_call("ivan", "judy");
    store.create_room(&room).await?;
    store.create_room(&other).await?;

    store.create_group_live(&room.id, "g-contract").await?;
    assert!(matches!(
        store.create_group_live(&other.id, "g-contract").await,
        Err(LiveError::AlreadyInCall(_))
    ));
    assert_eq!(store.get_group_room("g-contract").await?.id, room.id);

    store.set_group_live_persist("g-contract").await?;
    store.delete_group_live(&room.id, "g-contract").await?;
    assert!(matches!(
        store.get_group_room("g-contract").await,
        Err(LiveError::CallNotFound)
    ));

    store.delete_room(&room.id).await?;
    store.delete_room(&other.id).await?;
    Ok(())
}

async fn check_persist_requires_live_key(store: &dyn RoomRepository) -> Result<(), anyhow::Error> {
    let room = user_call("mallory", "niaj");

    assert!(matches!(
        store.set_room_persist(&room.id).await,
        Err(LiveError::CallNotFound)
    ));
    assert!(matches!(
        store.set_user_live_persist(&ids(&["nobody-here"])).await,
        Err(LiveError::CallNotFound)
    ));

    store.create_room(&room).await?;
    store.set_room_persist(&room.id).await?;
    store.delete_room(&room.id).await?;
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_in_memory_contract() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new(TTL);

    check_room_round_trip(&store).await?;
    check_update_does_not_resurrect(&store).await?;
    check_claims(&store).await?;
    check_stale_pointer_is_replaced(&store).await?;
    check_group_pointer(&store).await?;
    check_persist_requires_live_key(&store).await?;

    assert_eq!(store.live_key_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_keys_expire_after_default_ttl() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new(TTL);
    let room = user_call("alice", "bob");
    store.create_room(&room).await?;
    store
        .create_users_live(&room.id, &ids(&["alice", "bob"]))
        .await?;

    tokio::time::sleep(TTL - Duration::from_secs(1)).await;
    assert!(store.get_room(&room.id).await.is_ok());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(
        store.get_room(&room.id).await,
        Err(LiveError::CallNotFound)
    ));
    assert_eq!(store.user_ttl("alice"), KeyTtl::Missing);
    assert_eq!(store.live_key_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_update_expiration_policies() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new(TTL);
    let room = user_call("alice", "bob");
    store.create_room(&room).await?;

    tokio::time::sleep(Duration::from_secs(20)).await;
    store.update_room(&room).await?;
    assert_eq!(store.room_ttl(&room.id), KeyTtl::Expiring(Duration::from_secs(40)));

    store
        .update_room_with_expiration(&room, Expiration::After(Duration::from_secs(90)))
        .await?;
    assert_eq!(store.room_ttl(&room.id), KeyTtl::Expiring(Duration::from_secs(90)));

    store
        .update_room_with_expiration(&room, Expiration::Persist)
        .await?;
    assert_eq!(store.room_ttl(&room.id), KeyTtl::Persistent);

    // Keeping the current TTL of a persistent key keeps it persistent
    store.update_room(&room).await?;
    assert_eq!(store.room_ttl(&room.id), KeyTtl::Persistent);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_persisting_expired_pointer_fails() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new(TTL);
    let room = user_call("alice", "bob");
    store.create_room(&room).await?;
    store
        .create_users_live(&room.id, &ids(&["alice", "bob"]))
        .await?;

    tokio::time::sleep(TTL + Duration::from_secs(1)).await;

    assert!(matches!(
        store.set_user_live_persist(&ids(&["alice", "bob"])).await,
        Err(LiveError::CallNotFound)
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reclaim_keeps_persistent_pointer() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new(TTL);
    let room = user_call("alice", "bob");
    store.create_room(&room).await?;
    store.create_users_live(&room.id, &ids(&["alice"])).await?;
    store.set_user_live_persist(&ids(&["alice"])).await?;

    store
        .create_users_live(&room.id, &ids(&["alice", "bob"]))
        .await?;

    assert_eq!(store.user_ttl("alice"), KeyTtl::Persistent);
    assert!(matches!(store.user_ttl("bob"), KeyTtl::Expiring(_)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_repairs_dangling_pointer() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new(TTL);
    let room = user_call("alice", "bob");
    store.create_room(&room).await?;
    store.create_users_live(&room.id, &ids(&["alice"])).await?;
    store.drop_room(&room.id);

    assert!(matches!(
        store.get_user_rooms("alice").await,
        Err(LiveError::CallNotFound)
    ));
    assert_eq!(store.user_pointer("alice"), None);
    assert_eq!(store.repaired_pointers(), 1);

    // Nothing left to repair
    assert!(store.get_user_rooms("alice").await.is_err());
    assert_eq!(store.repaired_pointers(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_store_reports_cache_error() {
    let store = InMemoryRoomStore::new(TTL);
    store.set_unavailable(true);

    let result = store.get_room(&user_call("alice", "bob").id).await;

    assert!(matches!(result, Err(LiveError::Cache(_))));
}

// ============================================================================
// Redis
// ============================================================================

mod redis_backed {
    use super::*;
    use live_service::redis::RedisRoomStore;

    async fn connect() -> Result<RedisRoomStore, anyhow::Error> {
        let url = std::env::var("LIVE_TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Ok(RedisRoomStore::new(&url, TTL, Duration::from_secs(2)).await?)
    }

    #[tokio::test]
    #[ignore = "Requires a running Redis (LIVE_TEST_REDIS_URL)"]
    async fn test_redis_contract() -> Result<(), anyhow::Error> {
        let store = connect().await?;

        check_room_round_trip(&store).await?;
        check_update_does_not_resurrect(&store).await?;
        check_claims(&store).await?;
        check_stale_pointer_is_replaced(&store).await?;
        check_group_pointer(&store).await?;
        check_persist_requires_live_key(&store).await?;
        Ok(())
    }
}
