//! User service client.

use crate::errors::LiveError;
use crate::services::upstream::UpstreamHttp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Normal,
    Disabled,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
    pub status: UserStatus,
}

impl UserInfo {
    pub fn is_normal(&self) -> bool {
        self.status == UserStatus::Normal
    }
}

/// User profile lookups.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Profile of one user. `InvalidParameter` if the user does not exist.
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, LiveError>;

    /// Profiles of the users among `user_ids` that exist.
    async fn get_batch_user_info(&self, user_ids: &[String]) -> Result<Vec<UserInfo>, LiveError>;
}

#[derive(Serialize)]
struct UserQuery<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
struct BatchUserQuery<'a> {
    user_ids: &'a [String],
}

#[derive(Deserialize)]
struct UserInfoList {
    #[serde(default)]
    users: Vec<UserInfo>,
}

/// HTTP client for the user service.
#[derive(Clone)]
pub struct UserClient {
    http: UpstreamHttp,
}

impl UserClient {
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, LiveError> {
        Ok(Self {
            http: UpstreamHttp::new("user-service", base_url)?,
        })
    }
}

#[async_trait]
impl UserService for UserClient {
    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, LiveError> {
        self.http
            .post("/v1/users/info", &UserQuery { user_id })
            .await?
            .ok_or_else(|| LiveError::InvalidParameter(format!("Unknown user {user_id}")))
    }

    #[instrument(skip_all, fields(count = user_ids.len()))]
    async fn get_batch_user_info(&self, user_ids: &[String]) -> Result<Vec<UserInfo>, LiveError> {
        let list: Option<UserInfoList> = self
            .http
            .post("/v1/users/info/batch", &BatchUserQuery { user_ids })
            .await?;
        Ok(list.map(|l| l.users).unwrap_or_default())
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
    fn test_user_info_defaults() {
        let info: UserInfo =
            serde_json::from_value(json!({"user_id": "bob", "status": "disabled"})).unwrap();
        assert!(!info.is_normal());
        assert!(info.nickname.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_is_invalid_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/users/info"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = UserClient::new(&server.uri()).unwrap();
        let result = client.user_info("ghost").await;
        assert!(matches!(result, Err(LiveError::InvalidParameter(_))));
    }
}
