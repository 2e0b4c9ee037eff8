//! In-memory relation, user, group and message services.
//!
//! Relations are directional, as in the relation service: `with_friends`
//! adds both directions, `with_one_way_friend` only one.

use async_trait::async_trait;
use live_service::errors::LiveError;
use live_service::services::group_client::{GroupInfo, GroupService, GroupStatus};
use live_service::services::message_client::{MessageService, UserMessage};
use live_service::services::relation_client::{
    GroupRelation, MemberStatus, RelationService, RelationStatus, UserRelation,
};
use live_service::services::user_client::{UserInfo, UserService, UserStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Default)]
struct RelationsInner {
    contacts: HashMap<(String, String), UserRelation>,
    members: HashMap<(String, String), GroupRelation>,
}

/// In-memory `RelationService`.
#[derive(Debug, Clone, Default)]
pub struct MockRelations {
    inner: Arc<Mutex<RelationsInner>>,
}

impl MockRelations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutual, unblocked contacts.
    pub fn add_friends(&self, a: &str, b: &str) {
        self.add_one_way_friend(a, b);
        self.add_one_way_friend(b, a);
    }

    /// `user_id` lists `friend_id` as a contact; not the other way round.
    pub fn add_one_way_friend(&self, user_id: &str, friend_id: &str) {
        self.set_relation(user_id, friend_id, RelationStatus::Normal, false);
    }

    /// `user_id` blocks `friend_id`.
    pub fn block(&self, user_id: &str, friend_id: &str) {
        self.set_relation(user_id, friend_id, RelationStatus::Normal, true);
    }

    fn set_relation(&self, user_id: &str, friend_id: &str, status: RelationStatus, blocked: bool) {
        self.inner.lock().unwrap().contacts.insert(
            (user_id.to_string(), friend_id.to_string()),
            UserRelation {
                user_id: user_id.to_string(),
                friend_id: friend_id.to_string(),
                status,
                blocked,
            },
        );
    }

    pub fn add_member(&self, group_id: &str, user_id: &str) {
        self.set_member(group_id, user_id, MemberStatus::Normal, false);
    }

    pub fn add_silenced_member(&self, group_id: &str, user_id: &str) {
        self.set_member(group_id, user_id, MemberStatus::Normal, true);
    }

    pub fn add_former_member(&self, group_id: &str, user_id: &str) {
        self.set_member(group_id, user_id, MemberStatus::Left, false);
    }

    fn set_member(&self, group_id: &str, user_id: &str, status: MemberStatus, silenced: bool) {
        self.inner.lock().unwrap().members.insert(
            (group_id.to_string(), user_id.to_string()),
            GroupRelation {
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
                status,
                silenced,
            },
        );
    }
}

#[async_trait]
impl RelationService for MockRelations {
    async fn get_user_relation(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<UserRelation, LiveError> {
        self.inner
            .lock()
            .unwrap()
            .contacts
            .get(&(user_id.to_string(), friend_id.to_string()))
            .cloned()
            .ok_or_else(|| LiveError::RelationNotFound("No such relation".to_string()))
    }

    async fn get_user_relation_by_user_ids(
        &self,
        user_id: &str,
        friend_ids: &[String],
    ) -> Result<Vec<UserRelation>, LiveError> {
        let inner = self.inner.lock().unwrap();
        Ok(friend_ids
            .iter()
            .filter_map(|f| inner.contacts.get(&(user_id.to_string(), f.clone())).cloned())
            .collect())
    }

    async fn get_group_relation(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<GroupRelation, LiveError> {
        self.inner
            .lock()
            .unwrap()
            .members
            .get(&(group_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| LiveError::RelationNotFound("Not a group member".to_string()))
    }

    async fn get_batch_group_relation(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<GroupRelation>, LiveError> {
        let inner = self.inner.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|u| inner.members.get(&(group_id.to_string(), u.clone())).cloned())
            .collect())
    }
}

// ============================================================================
// Users
// ============================================================================

/// In-memory `UserService`. Unknown users are reported as normal accounts.
#[derive(Debug, Clone, Default)]
pub struct MockUsers {
    statuses: Arc<Mutex<HashMap<String, UserStatus>>>,
}

impl MockUsers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, user_id: &str, status: UserStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(user_id.to_string(), status);
    }

    fn info(&self, user_id: &str) -> UserInfo {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(UserStatus::Normal);
        UserInfo {
            user_id: user_id.to_string(),
            nickname: user_id.to_string(),
            avatar: String::new(),
            status,
        }
    }
}

#[async_trait]
impl UserService for MockUsers {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, LiveError> {
        Ok(self.info(user_id))
    }

    async fn get_batch_user_info(&self, user_ids: &[String]) -> Result<Vec<UserInfo>, LiveError> {
        Ok(user_ids.iter().map(|id| self.info(id)).collect())
    }
}

// ============================================================================
// Groups
// ============================================================================

/// In-memory `GroupService`. Unknown groups are not available.
#[derive(Debug, Clone, Default)]
pub struct MockGroups {
    groups: Arc<Mutex<HashMap<String, GroupStatus>>>,
}

impl MockGroups {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, group_id: &str, status: GroupStatus) {
        self.groups
            .lock()
            .unwrap()
            .insert(group_id.to_string(), status);
    }
}

#[async_trait]
impl GroupService for MockGroups {
    async fn get_group_info_by_gid(&self, group_id: &str) -> Result<GroupInfo, LiveError> {
        let status = self
            .groups
            .lock()
            .unwrap()
            .get(group_id)
            .copied()
            .ok_or_else(|| LiveError::GroupStatusNotAvailable("Unknown group".to_string()))?;
        Ok(GroupInfo {
            group_id: group_id.to_string(),
            name: format!("group {group_id}"),
            status,
            member_count: 0,
        })
    }
}

// ============================================================================
// Messages
// ============================================================================

/// In-memory `MessageService` recording every message.
#[derive(Debug, Clone, Default)]
pub struct RecordingMessages {
    sent: Arc<Mutex<Vec<UserMessage>>>,
}

impl RecordingMessages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<UserMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Contents of the messages sent so far, in order.
    pub fn contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }
}

#[async_trait]
impl MessageService for RecordingMessages {
    async fn send_user_message(&self, message: &UserMessage) -> Result<(), LiveError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
