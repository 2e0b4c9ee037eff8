//! Relation service client.
//!
//! Answers "are these two users contacts" and "is this user a member of
//! that group".

use crate::errors::LiveError;
use crate::services::upstream::UpstreamHttp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Status of a user-to-user relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
    Normal,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// One direction of a contact relation (`user_id` -> `friend_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRelation {
    pub user_id: String,
    pub friend_id: String,
    pub status: RelationStatus,
    /// `user_id` has blocked `friend_id`.
    #[serde(default)]
    pub blocked: bool,
}

impl UserRelation {
    /// A live, unblocked relation.
    pub fn is_usable(&self) -> bool {
        self.status == RelationStatus::Normal && !self.blocked
    }
}

/// Membership status inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Normal,
    Left,
    Removed,
    #[serde(other)]
    Unknown,
}

/// A user's membership of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRelation {
    pub group_id: String,
    pub user_id: String,
    pub status: MemberStatus,
    /// Muted by a group admin.
    #[serde(default)]
    pub silenced: bool,
}

impl GroupRelation {
    pub fn is_member(&self) -> bool {
        self.status == MemberStatus::Normal
    }
}

/// Contact and membership lookups.
#[async_trait]
pub trait RelationService: Send + Sync {
    /// Relation from `user_id` to `friend_id`. `RelationNotFound` if none.
    async fn get_user_relation(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<UserRelation, LiveError>;

    /// Relations from `user_id` to each of `friend_ids` that exist.
    async fn get_user_relation_by_user_ids(
        &self,
        user_id: &str,
        friend_ids: &[String],
    ) -> Result<Vec<UserRelation>, LiveError>;

    /// Membership of `user_id` in `group_id`. `RelationNotFound` if none.
    async fn get_group_relation(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<GroupRelation, LiveError>;

    /// Memberships of `user_ids` in `group_id` that exist.
    async fn get_batch_group_relation(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<GroupRelation>, LiveError>;
}

#[derive(Serialize)]
struct UserRelationQuery<'a> {
    user_id: &'a str,
    friend_id: &'a str,
}

#[derive(Serialize)]
struct UserRelationBatchQuery<'a> {
    user_id: &'a str,
    friend_ids: &'a [String],
}

#[derive(Serialize)]
struct GroupRelationQuery<'a> {
    group_id: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
struct GroupRelationBatchQuery<'a> {
    group_id: &'a str,
    user_ids: &'a [String],
}

#[derive(Deserialize)]
struct UserRelationList {
    #[serde(default)]
    relations: Vec<UserRelation>,
}

#[derive(Deserialize)]
struct GroupRelationList {
    #[serde(default)]
    relations: Vec<GroupRelation>,
}

/// HTTP client for the relation service.
#[derive(Clone)]
pub struct RelationClient {
    http: UpstreamHttp,
}

impl RelationClient {
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, LiveError> {
        Ok(Self {
            http: UpstreamHttp::new("relation-service", base_url)?,
        })
    }
}

#[async_trait]
impl RelationService for RelationClient {
    #[instrument(skip_all, fields(user_id = %user_id, friend_id = %friend_id))]
    async fn get_user_relation(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<UserRelation, LiveError> {
        self.http
            .post(
                "/v1/relations/user",
                &UserRelationQuery { user_id, friend_id },
            )
            .await?
            .ok_or_else(|| LiveError::RelationNotFound("Not a contact".to_string()))
    }

    #[instrument(skip_all, fields(user_id = %user_id, count = friend_ids.len()))]
    async fn get_user_relation_by_user_ids(
        &self,
        user_id: &str,
        friend_ids: &[String],
    ) -> Result<Vec<UserRelation>, LiveError> {
        let list: Option<UserRelationList> = self
            .http
            .post(
                "/v1/relations/user/batch",
                &UserRelationBatchQuery {
                    user_id,
                    friend_ids,
                },
            )
            .await?;
        Ok(list.map(|l| l.relations).unwrap_or_default())
    }

    #[instrument(skip_all, fields(group_id = %group_id, user_id = %user_id))]
    async fn get_group_relation(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<GroupRelation, LiveError> {
        self.http
            .post(
                "/v1/relations/group",
                &GroupRelationQuery { group_id, user_id },
            )
            .await?
            .ok_or_else(|| LiveError::RelationNotFound("Not a group member".to_string()))
    }

    #[instrument(skip_all, fields(group_id = %group_id, count = user_ids.len()))]
    async fn get_batch_group_relation(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<GroupRelation>, LiveError> {
        let list: Option<GroupRelationList> = self
            .http
            .post(
                "/v1/relations/group/batch",
                &GroupRelationBatchQuery { group_id, user_ids },
            )
            .await?;
        Ok(list.map(|l| l.relations).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_unknown_status_does_not_fail_parsing() {
        let relation: UserRelation = serde_json::from_value(json!({
            "user_id": "a", "friend_id": "b", "status": "pending_review"
        }))
        .unwrap();
        assert_eq!(relation.status, RelationStatus::Unknown);
        assert!(!relation.is_usable());
    }

    #[test]
    fn test_blocked_relation_is_not_usable() {
        let relation = UserRelation {
            user_id: "a".to_string(),
            friend_id: "b".to_string(),
            status: RelationStatus::Normal,
            blocked: true,
        };
        assert!(!relation.is_usable());
    }

    #[tokio::test]
    async fn test_missing_relation_is_relation_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/relations/user"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RelationClient::new(&server.uri()).unwrap();
        let result = client.get_user_relation("alice", "bob").await;
        assert!(matches!(result, Err(LiveError::RelationNotFound(_))));
    }

    #[tokio::test]
    async fn test_batch_group_relation_parses_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/relations/group/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "relations": [
                    {"group_id": "g1", "user_id": "bob", "status": "normal"},
                    {"group_id": "g1", "user_id": "carol", "status": "normal", "silenced": true}
                ]
            })))
            .mount(&server)
            .await;

        let client = RelationClient::new(&server.uri()).unwrap();
        let relations = client
            .get_batch_group_relation("g1", &["bob".to_string(), "carol".to_string()])
            .await
            .unwrap();
        assert_eq!(relations.len(), 2);
        assert!(relations[1].silenced);
    }
}
