//! Signaling service client.
//!
//! Talks to the real-time media server's Twirp JSON server API
//! (`/twirp/livekit.RoomService/<Method>`) and issues the HS256 access
//! tokens clients present when they connect.
//!
//! The signaling service is authoritative for whether media is flowing.
//! Deleting a room or removing a participant that is already gone counts
//! as success so teardown stays idempotent.
//!
//! # Security
//!
//! - Server API calls carry a short-lived admin token in `Authorization`
//! - The API secret is held in a `SecretString` and never logged
//! - Client tokens expire after the ring timeout

use crate::config::Config;
use crate::errors::LiveError;
use crate::models::{LiveParticipant, SignalingRoomInfo};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::Utc;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Default timeout for signaling API requests in seconds.
const SIGNALING_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Lifetime of the token authenticating a single server API call.
const SERVER_TOKEN_TTL_SECS: i64 = 600;

/// Twirp service path prefix.
const ROOM_SERVICE_PATH: &str = "/twirp/livekit.RoomService";

/// Media room operations and token issuance.
#[async_trait]
pub trait SignalingService: Send + Sync {
    /// Create a media room that closes itself after `empty_timeout`
    /// without participants.
    async fn create_room(
        &self,
        name: &str,
        empty_timeout: Duration,
        max_participants: u32,
    ) -> Result<SignalingRoomInfo, LiveError>;

    /// Delete a media room. Absent rooms are not an error.
    async fn delete_room(&self, name: &str) -> Result<(), LiveError>;

    /// Rooms among `names` that currently exist.
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<SignalingRoomInfo>, LiveError>;

    /// Media participants of a room. Empty if the room is absent.
    async fn list_participants(&self, room: &str) -> Result<Vec<LiveParticipant>, LiveError>;

    /// Disconnect one participant. Absent room or participant is not an error.
    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), LiveError>;

    /// Issue a join token for `identity`. `admin` adds create/list/admin grants.
    fn issue_token(&self, room: &str, identity: &str, admin: bool) -> Result<String, LiveError>;
}

// ============================================================================
// Access tokens
// ============================================================================

/// Video grant carried in the `video` claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_create: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_list: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_admin: bool,
}

impl VideoGrant {
    /// Grant for a regular participant.
    pub fn participant(room: &str) -> Self {
        Self {
            room_join: true,
            room: Some(room.to_string()),
            ..Self::default()
        }
    }

    /// Grant for the call creator.
    pub fn admin(room: &str) -> Self {
        Self {
            room_join: true,
            room: Some(room.to_string()),
            room_create: true,
            room_list: true,
            room_admin: true,
        }
    }

    /// Grant for server API calls (no join).
    fn server() -> Self {
        Self {
            room_create: true,
            room_list: true,
            room_admin: true,
            ..Self::default()
        }
    }
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// API key.
    pub iss: String,
    /// Participant identity (empty for server calls).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

// ============================================================================
// Wire types
// ============================================================================

/// Accept int64 as a JSON number or a string (proto3 JSON encodes it as a string).
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Serialize)]
struct CreateRoomBody<'a> {
    name: &'a str,
    empty_timeout: u64,
    max_participants: u32,
}

#[derive(Debug, Serialize)]
struct RoomBody<'a> {
    room: &'a str,
}

#[derive(Debug, Serialize)]
struct ListRoomsBody<'a> {
    names: &'a [String],
}

#[derive(Debug, Serialize)]
struct RemoveParticipantBody<'a> {
    room: &'a str,
    identity: &'a str,
}

#[derive(Debug, Deserialize)]
struct RoomWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    num_participants: u32,
    #[serde(default)]
    max_participants: u32,
    #[serde(default, deserialize_with = "lenient_i64")]
    creation_time: i64,
}

impl From<RoomWire> for SignalingRoomInfo {
    fn from(wire: RoomWire) -> Self {
        Self {
            name: wire.name,
            num_participants: wire.num_participants,
            max_participants: wire.max_participants,
            creation_time: wire.creation_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListRoomsWire {
    #[serde(default)]
    rooms: Vec<RoomWire>,
}

fn default_state() -> String {
    "JOINING".to_string()
}

#[derive(Debug, Deserialize)]
struct ParticipantWire {
    #[serde(default)]
    identity: String,
    #[serde(default = "default_state")]
    state: String,
    #[serde(default)]
    is_publisher: bool,
    #[serde(default, deserialize_with = "lenient_i64")]
    joined_at: i64,
}

impl From<ParticipantWire> for LiveParticipant {
    fn from(wire: ParticipantWire) -> Self {
        Self {
            identity: wire.identity,
            state: wire.state,
            is_publisher: wire.is_publisher,
            joined_at: wire.joined_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParticipantsWire {
    #[serde(default)]
    participants: Vec<ParticipantWire>,
}

/// Twirp error body.
#[derive(Debug, Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

/// Outcome of a server API call whose target may be gone.
enum Reply<T> {
    Ok(T),
    NotFound,
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the signaling server API.
#[derive(Clone)]
pub struct SignalingClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    /// Lifetime of participant tokens.
    token_ttl: Duration,
}

impl SignalingClient {
    /// Create a new signaling client.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: String,
        api_secret: SecretString,
        token_ttl: Duration,
    ) -> Result<Self, LiveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SIGNALING_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "live.signaling", error = %e, "Failed to build HTTP client");
                LiveError::Internal("Failed to build signaling HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            token_ttl,
        })
    }

    /// Client for the configured signaling server.
    ///
    /// Participant tokens live as long as the call may ring.
    pub fn from_config(config: &Config) -> Result<Self, LiveError> {
        Self::new(
            &config.signaling_url,
            config.signaling_api_key.clone(),
            config.signaling_api_secret.clone(),
            config.ring_timeout,
        )
    }

    fn sign(&self, claims: &AccessClaims) -> Result<String, LiveError> {
        let key = EncodingKey::from_secret(self.api_secret.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key).map_err(|e| {
            error!(target: "live.signaling", error = %e, "Token signing failed");
            LiveError::Internal("Token signing failed".to_string())
        })
    }

    fn claims(&self, identity: &str, video: VideoGrant, ttl_secs: i64) -> AccessClaims {
        let now = Utc::now().timestamp();
        AccessClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now,
            exp: now + ttl_secs,
            video,
        }
    }

    /// POST one Twirp method and decode the reply.
    async fn call<B, T>(&self, method: &'static str, body: &B) -> Result<Reply<T>, LiveError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let token = self.sign(&self.claims("", VideoGrant::server(), SERVER_TOKEN_TTL_SECS))?;
        let url = format!("{}{ROOM_SERVICE_PATH}/{method}", self.base_url);

        let start = Instant::now();
        let result = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await;
        metrics::record_signaling_latency(method, start.elapsed());

        let response = result.map_err(|e| {
            warn!(target: "live.signaling", error = %e, method, "Signaling request failed");
            LiveError::Signaling(format!("{method} request failed: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map(Reply::Ok).map_err(|e| {
                error!(target: "live.signaling", error = %e, method, "Failed to parse signaling response");
                LiveError::Signaling(format!("{method} returned malformed body"))
            });
        }

        let error: Option<TwirpError> = response.json().await.ok();
        let code = error.as_ref().map_or("", |e| e.code.as_str());
        if status == StatusCode::NOT_FOUND || code == "not_found" {
            debug!(target: "live.signaling", method, "Signaling target not found");
            return Ok(Reply::NotFound);
        }

        let msg = error.as_ref().map_or("", |e| e.msg.as_str());
        warn!(
            target: "live.signaling",
            method,
            status = %status,
            code = %code,
            msg = %msg,
            "Signaling service returned error"
        );
        Err(LiveError::Signaling(format!("{method} failed with {status}")))
    }
}

/// Unit reply for methods with empty responses.
#[derive(Debug, Deserialize)]
struct Empty {}

#[async_trait]
impl SignalingService for SignalingClient {
    #[instrument(skip_all, fields(room = %name, max_participants = max_participants))]
    async fn create_room(
        &self,
        name: &str,
        empty_timeout: Duration,
        max_participants: u32,
    ) -> Result<SignalingRoomInfo, LiveError> {
        let body = CreateRoomBody {
            name,
            empty_timeout: empty_timeout.as_secs(),
            max_participants,
        };

        match self.call::<_, RoomWire>("CreateRoom", &body).await? {
            Reply::Ok(room) => Ok(room.into()),
            Reply::NotFound => Err(LiveError::Signaling(
                "CreateRoom endpoint not found".to_string(),
            )),
        }
    }

    #[instrument(skip_all, fields(room = %name))]
    async fn delete_room(&self, name: &str) -> Result<(), LiveError> {
        match self.call::<_, Empty>("DeleteRoom", &RoomBody { room: name }).await? {
            Reply::Ok(_) | Reply::NotFound => Ok(()),
        }
    }

    #[instrument(skip_all, fields(count = names.len()))]
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<SignalingRoomInfo>, LiveError> {
        match self
            .call::<_, ListRoomsWire>("ListRooms", &ListRoomsBody { names })
            .await?
        {
            Reply::Ok(list) => Ok(list.rooms.into_iter().map(Into::into).collect()),
            Reply::NotFound => Ok(Vec::new()),
        }
    }

    #[instrument(skip_all, fields(room = %room))]
    async fn list_participants(&self, room: &str) -> Result<Vec<LiveParticipant>, LiveError> {
        match self
            .call::<_, ListParticipantsWire>("ListParticipants", &RoomBody { room })
            .await?
        {
            Reply::Ok(list) => Ok(list.participants.into_iter().map(Into::into).collect()),
            Reply::NotFound => Ok(Vec::new()),
        }
    }

    #[instrument(skip_all, fields(room = %room, identity = %identity))]
    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), LiveError> {
        let body = RemoveParticipantBody { room, identity };
        match self.call::<_, Empty>("RemoveParticipant", &body).await? {
            Reply::Ok(_) | Reply::NotFound => Ok(()),
        }
    }

    fn issue_token(&self, room: &str, identity: &str, admin: bool) -> Result<String, LiveError> {
        let grant = if admin {
            VideoGrant::admin(room)
        } else {
            VideoGrant::participant(room)
        };
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX / 2);
        self.sign(&self.claims(identity, grant, ttl))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn client() -> SignalingClient {
        SignalingClient::new(
            "http://signaling:7880/",
            "APIkey".to_string(),
            SecretString::from("test-secret-test-secret-test-secret".to_string()),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    fn decode_claims(token: &str) -> AccessClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(b"test-secret-test-secret-test-secret"),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "http://signaling:7880");
    }

    #[test]
    fn test_participant_token_has_join_grant_only() {
        let token = client().issue_token("room-1", "bob", false).unwrap();
        let claims = decode_claims(&token);

        assert_eq!(claims.iss, "APIkey");
        assert_eq!(claims.sub, "bob");
        assert_eq!(claims.exp - claims.nbf, 60);
        assert_eq!(claims.video, VideoGrant::participant("room-1"));
        assert!(!claims.video.room_admin);
    }

    #[test]
    fn test_configured_client_tokens_expire_with_ring_timeout() {
        let vars: std::collections::HashMap<String, String> = [
            ("REDIS_URL", "redis://localhost:6379"),
            ("SIGNALING_URL", "http://signaling:7880"),
            ("SIGNALING_API_KEY", "APIkey"),
            ("SIGNALING_API_SECRET", "test-secret-test-secret-test-secret"),
            ("LIVE_RING_TIMEOUT_SECONDS", "15"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = Config::from_vars(&vars).unwrap();

        let signaling = SignalingClient::from_config(&config).unwrap();
        let claims = decode_claims(&signaling.issue_token("room-1", "bob", false).unwrap());
        assert_eq!(claims.exp - claims.nbf, 15);

        let claims = decode_claims(&signaling.issue_token("room-1", "alice", true).unwrap());
        assert_eq!(claims.exp - claims.nbf, 15);
    }

    #[test]
    fn test_admin_token_has_elevated_grant() {
        let token = client().issue_token("room-1", "alice", true).unwrap();
        let claims = decode_claims(&token);

        assert!(claims.video.room_join);
        assert!(claims.video.room_admin);
        assert!(claims.video.room_create);
        assert!(claims.video.room_list);
        assert_eq!(claims.video.room.as_deref(), Some("room-1"));
    }

    #[test]
    fn test_video_grant_wire_names() {
        let json = serde_json::to_value(VideoGrant::participant("r")).unwrap();
        assert_eq!(json["roomJoin"], true);
        assert_eq!(json["room"], "r");
        // false grants are omitted
        assert!(json.get("roomAdmin").is_none());
    }

    #[test]
    fn test_room_wire_accepts_string_int64() {
        let wire: RoomWire = serde_json::from_str(
            r#"{"name":"r","num_participants":1,"max_participants":2,"creation_time":"1700000000"}"#,
        )
        .unwrap();
        assert_eq!(wire.creation_time, 1_700_000_000);

        let wire: RoomWire = serde_json::from_str(r#"{"name":"r","creation_time":1700000001}"#).unwrap();
        assert_eq!(wire.creation_time, 1_700_000_001);
        assert_eq!(wire.num_participants, 0);
    }

    #[test]
    fn test_participant_wire_defaults() {
        let wire: ParticipantWire = serde_json::from_str(r#"{"identity":"bob"}"#).unwrap();
        let participant: LiveParticipant = wire.into();
        assert_eq!(participant.state, "JOINING");
        assert!(!participant.is_publisher);
    }
}
