//! Call handlers.
//!
//! - `POST   /v1/live/rooms` - Start a call
//! - `GET    /v1/live/rooms/current` - The caller's active call
//! - `GET    /v1/live/groups/:group_id/room` - A group's active call
//! - `POST   /v1/live/rooms/:room_id/join` - Join and obtain a media token
//! - `POST   /v1/live/rooms/:room_id/reject` - Decline a ringing call
//! - `POST   /v1/live/rooms/:room_id/leave` - Hang up
//! - `DELETE /v1/live/rooms/:room_id` - Hang up (alias of leave)
//!
//! All routes require the caller header (see `middleware::identity`).

use crate::errors::LiveError;
use crate::middleware::Caller;
use crate::models::{CreateRoomRequest, CreateRoomResponse, JoinRoomResponse, RoomView};
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::RoomId;
use std::sync::Arc;
use tracing::instrument;

fn parse_room_id(raw: &str) -> Result<RoomId, LiveError> {
    raw.parse::<RoomId>()
        .map_err(|_| LiveError::InvalidParameter("Malformed room id".to_string()))
}

/// Handler for POST /v1/live/rooms
///
/// # Response
///
/// - 201 Created with the room id, signaling url and ring timeout
/// - 400 for a malformed body, 403 for relation/group failures
/// - 409 if anybody involved is already in a call
#[instrument(skip_all, fields(caller = %caller.id()))]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), LiveError> {
    let Json(request) = body.map_err(|e| LiveError::InvalidParameter(e.body_text()))?;
    let response = state.calls.create_room(caller.id(), request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /v1/live/rooms/current
#[instrument(skip_all, fields(caller = %caller.id()))]
pub async fn get_current_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<RoomView>, LiveError> {
    Ok(Json(state.calls.get_user_room(caller.id()).await?))
}

/// Handler for GET /v1/live/groups/:group_id/room
#[instrument(skip_all, fields(caller = %caller.id(), group_id = %group_id))]
pub async fn get_group_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(group_id): Path<String>,
) -> Result<Json<RoomView>, LiveError> {
    Ok(Json(
        state.calls.get_group_room(caller.id(), &group_id).await?,
    ))
}

/// Handler for POST /v1/live/rooms/:room_id/join
#[instrument(skip_all, fields(caller = %caller.id(), room_id = %room_id))]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<String>,
) -> Result<Json<JoinRoomResponse>, LiveError> {
    let room_id = parse_room_id(&room_id)?;
    Ok(Json(state.calls.join_room(caller.id(), &room_id).await?))
}

/// Handler for POST /v1/live/rooms/:room_id/reject
#[instrument(skip_all, fields(caller = %caller.id(), room_id = %room_id))]
pub async fn reject_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, LiveError> {
    let room_id = parse_room_id(&room_id)?;
    state.calls.reject_room(caller.id(), &room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /v1/live/rooms/:room_id/leave
#[instrument(skip_all, fields(caller = %caller.id(), room_id = %room_id))]
pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, LiveError> {
    let room_id = parse_room_id(&room_id)?;
    state.calls.leave_room(caller.id(), &room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for DELETE /v1/live/rooms/:room_id
#[instrument(skip_all, fields(caller = %caller.id(), room_id = %room_id))]
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, LiveError> {
    let room_id = parse_room_id(&room_id)?;
    state.calls.delete_room(caller.id(), &room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_room_id_rejects_garbage() {
        assert!(matches!(
            parse_room_id("not-a-uuid"),
            Err(LiveError::InvalidParameter(_))
        ));
        let id = RoomId::new();
        assert!(matches!(parse_room_id(&id.to_string()), Ok(parsed) if parsed == id));
    }
}
