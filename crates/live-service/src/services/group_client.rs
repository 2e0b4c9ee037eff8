//! Group service client.

use crate::errors::LiveError;
use crate::services::upstream::UpstreamHttp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Lifecycle status of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Normal,
    Locked,
    Disbanded,
    #[serde(other)]
    Unknown,
}

/// Group metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: String,
    #[serde(default)]
    pub name: String,
    pub status: GroupStatus,
    #[serde(default)]
    pub member_count: u32,
}

impl GroupInfo {
    pub fn is_available(&self) -> bool {
        self.status == GroupStatus::Normal
    }
}

/// Group metadata lookups.
#[async_trait]
pub trait GroupService: Send + Sync {
    /// `GroupStatusNotAvailable` if the group does not exist.
    async fn get_group_info_by_gid(&self, group_id: &str) -> Result<GroupInfo, LiveError>;
}

#[derive(Serialize)]
struct GroupQuery<'a> {
    group_id: &'a str,
}

/// HTTP client for the group service.
#[derive(Clone)]
pub struct GroupClient {
    http: UpstreamHttp,
}

impl GroupClient {
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, LiveError> {
        Ok(Self {
            http: UpstreamHttp::new("group-service", base_url)?,
        })
    }
}

#[async_trait]
impl GroupService for GroupClient {
    #[instrument(skip_all, fields(group_id = %group_id))]
    async fn get_group_info_by_gid(&self, group_id: &str) -> Result<GroupInfo, LiveError> {
        self.http
            .post("/v1/groups/info", &GroupQuery { group_id })
            .await?
            .ok_or_else(|| LiveError::GroupStatusNotAvailable("Group does not exist".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_normal_groups_are_available() {
        let mut info: GroupInfo = serde_json::from_value(json!({
            "group_id": "g1", "name": "Team", "status": "normal", "member_count": 4
        }))
        .unwrap();
        assert!(info.is_available());

        info.status = GroupStatus::Disbanded;
        assert!(!info.is_available());
    }
}
