//! Call session orchestrator.
//!
//! Creates, joins, rejects and tears down one-to-one and group calls.
//! State lives in three places that cannot be updated atomically together:
//! the room store (system of record for who is in which call), the
//! signaling service (system of record for media membership) and the
//! participants' devices (reached through push). Every operation is a
//! read-modify-write against the store, cross-checked with signaling
//! where capacity matters, followed by fire-and-forget notifications.
//!
//! Ordering rules:
//! - Room and presence pointers are durable before anybody is notified.
//! - A join always re-validates capacity against the signaling service.
//! - A room the signaling service no longer knows is deleted on sight.

use crate::errors::LiveError;
use crate::models::{
    CreateRoomRequest, CreateRoomResponse, JoinRoomResponse, ParticipantStatus, Room,
    RoomType, RoomView, SignalingRoomInfo, USER_CALL_MAX_PARTICIPANTS,
};
use crate::observability::metrics;
use crate::repositories::{Expiration, RoomRepository};
use crate::services::group_client::GroupService;
use crate::services::message_client::{CallSummary, MessageService, MessageType, UserMessage};
use crate::services::notification::NotificationDispatcher;
use crate::services::push_client::{CallEvent, PushService};
use crate::services::relation_client::RelationService;
use crate::services::signaling::SignalingService;
use crate::services::user_client::UserService;
use crate::tasks::RingTimeoutScheduler;
use chrono::Utc;
use common::types::RoomId;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Extra lifetime of a ringing call's cache keys past its ring timer, so
/// the timer still finds the room when it fires.
pub const RING_TTL_GRACE: Duration = Duration::from_secs(10);

/// Why a call was torn down (metric label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    Rejected,
    Hangup,
    Missed,
}

impl EndReason {
    fn as_str(self) -> &'static str {
        match self {
            EndReason::Rejected => "rejected",
            EndReason::Hangup => "hangup",
            EndReason::Missed => "missed",
        }
    }
}

/// Tunables of the orchestrator.
#[derive(Debug, Clone)]
pub struct CallSessionSettings {
    /// How long an unanswered call rings.
    pub ring_timeout: Duration,
    /// Participant ceiling for group calls.
    pub group_max_participants: u32,
    /// Signaling endpoint handed to clients.
    pub signaling_public_url: String,
}

/// External collaborators of the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RoomRepository>,
    pub signaling: Arc<dyn SignalingService>,
    pub push: Arc<dyn PushService>,
    pub relations: Arc<dyn RelationService>,
    pub users: Arc<dyn UserService>,
    pub groups: Arc<dyn GroupService>,
    pub messages: Arc<dyn MessageService>,
}

/// The call session state machine.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct CallSessionService {
    store: Arc<dyn RoomRepository>,
    signaling: Arc<dyn SignalingService>,
    notifier: NotificationDispatcher,
    relations: Arc<dyn RelationService>,
    users: Arc<dyn UserService>,
    groups: Arc<dyn GroupService>,
    messages: Arc<dyn MessageService>,
    timers: RingTimeoutScheduler,
    settings: Arc<CallSessionSettings>,
}

impl CallSessionService {
    pub fn new(
        collaborators: Collaborators,
        timers: RingTimeoutScheduler,
        settings: CallSessionSettings,
    ) -> Self {
        Self {
            store: collaborators.store,
            signaling: collaborators.signaling,
            notifier: NotificationDispatcher::new(collaborators.push),
            relations: collaborators.relations,
            users: collaborators.users,
            groups: collaborators.groups,
            messages: collaborators.messages,
            timers,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &CallSessionSettings {
        &self.settings
    }

    pub fn timers(&self) -> &RingTimeoutScheduler {
        &self.timers
    }

    fn ringing_ttl(&self) -> Duration {
        self.settings.ring_timeout + RING_TTL_GRACE
    }

    // ========================================================================
    // CreateRoom
    // ========================================================================

    /// Start a call.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for a malformed request
    /// - `AlreadyInCall` if the caller, callee or group is busy
    /// - `MaxParticipantsExceeded` if too many identities are invited
    /// - `RelationNotFound` if the parties are not contacts / not members
    /// - `GroupStatusNotAvailable` if the group cannot host calls
    #[instrument(skip_all, fields(caller = %caller, room_type = request.room_type.as_str()))]
    pub async fn create_room(
        &self,
        caller: &str,
        request: CreateRoomRequest,
    ) -> Result<CreateRoomResponse, LiveError> {
        let invitees: Vec<String> = request
            .participants
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && *id != caller)
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let group_id = match request.room_type {
            RoomType::UserCall => {
                if invitees.is_empty() {
                    return Err(LiveError::InvalidParameter(
                        "A user call needs a callee".to_string(),
                    ));
                }
                None
            }
            RoomType::GroupCall => match request.group_id.as_deref().map(str::trim) {
                Some(gid) if !gid.is_empty() => Some(gid.to_string()),
                _ => {
                    return Err(LiveError::InvalidParameter(
                        "A group call needs a group_id".to_string(),
                    ))
                }
            },
        };

        self.ensure_not_in_call(caller).await?;
        if let Some(gid) = &group_id {
            match self.store.get_group_room(gid).await {
                Ok(_) => {
                    return Err(LiveError::AlreadyInCall(
                        "Group already has an active call".to_string(),
                    ))
                }
                Err(LiveError::CallNotFound) => {}
                Err(e) => return Err(e),
            }
        }

        let max_participants = match request.room_type {
            RoomType::UserCall => USER_CALL_MAX_PARTICIPANTS,
            RoomType::GroupCall => self.settings.group_max_participants,
        };
        let requested = u32::try_from(invitees.len()).unwrap_or(u32::MAX).saturating_add(1);
        if requested > max_participants {
            return Err(LiveError::MaxParticipantsExceeded(format!(
                "At most {max_participants} participants allowed"
            )));
        }

        let invitees = match &group_id {
            None => {
                let callee = invitees.first().cloned().unwrap_or_default();
                self.check_contacts(caller, &callee).await?;
                self.ensure_not_in_call(&callee).await?;
                vec![callee]
            }
            Some(gid) => self.callable_group_members(caller, gid, &invitees).await?,
        };

        let room = Room::new(
            request.room_type,
            caller,
            group_id,
            &invitees,
            max_participants,
            request.option,
        );

        self.signaling
            .create_room(
                &room.id.to_string(),
                self.settings.ring_timeout,
                max_participants,
            )
            .await?;

        if let Err(e) = self.store.create_room(&room).await {
            self.discard(&room, &[]).await;
            return Err(e);
        }

        // One-to-one calls hold both parties; group members claim on join
        let claimed = match room.room_type {
            RoomType::UserCall => room.participant_ids(),
            RoomType::GroupCall => vec![caller.to_string()],
        };
        if let Err(e) = self.store.create_users_live(&room.id, &claimed).await {
            self.discard(&room, &[]).await;
            return Err(e);
        }

        if let Some(gid) = &room.group_id {
            if let Err(e) = self.store.create_group_live(&room.id, gid).await {
                self.discard(&room, &claimed).await;
                return Err(e);
            }
        }

        let event = match &room.group_id {
            None => CallEvent::user_call_requested(&room, caller),
            Some(gid) => CallEvent::group_call_requested(&room, caller, gid),
        };
        self.notifier.notify(room.recipients_except(caller), event);

        self.arm_ring_timer(room.id).await;
        metrics::record_call_created(room.room_type.as_str());

        info!(
            target: "live.call_session",
            room_id = %room.id,
            invited = invitees.len(),
            "Call created"
        );

        Ok(CreateRoomResponse {
            room_id: room.id,
            url: self.settings.signaling_public_url.clone(),
            ring_timeout_seconds: self.settings.ring_timeout.as_secs(),
        })
    }

    /// `AlreadyInCall` if `user_id` resolves to a live room.
    async fn ensure_not_in_call(&self, user_id: &str) -> Result<(), LiveError> {
        match self.store.get_user_rooms(user_id).await {
            Ok(room) => {
                debug!(target: "live.call_session", user_id = %user_id, room_id = %room.id, "Identity busy");
                Err(LiveError::AlreadyInCall(format!(
                    "User {user_id} is already in a call"
                )))
            }
            Err(LiveError::CallNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Caller and callee must be mutual, unblocked contacts.
    async fn check_contacts(&self, caller: &str, callee: &str) -> Result<(), LiveError> {
        let forward = self
            .relations
            .get_user_relation_by_user_ids(caller, &[callee.to_string()])
            .await?;
        let forward_ok = forward
            .iter()
            .any(|r| r.friend_id == callee && r.is_usable());
        if !forward_ok {
            return Err(LiveError::RelationNotFound(
                "Callee is not a contact".to_string(),
            ));
        }

        let reverse = self.relations.get_user_relation(callee, caller).await?;
        if !reverse.is_usable() {
            return Err(LiveError::RelationNotFound(
                "Callee is not a contact".to_string(),
            ));
        }
        Ok(())
    }

    /// Invitees that are current, non-silenced members with a normal account.
    /// Anyone else is dropped from the invite without failing the call.
    async fn callable_group_members(
        &self,
        caller: &str,
        group_id: &str,
        invitees: &[String],
    ) -> Result<Vec<String>, LiveError> {
        let group = self.groups.get_group_info_by_gid(group_id).await?;
        if !group.is_available() {
            return Err(LiveError::GroupStatusNotAvailable(
                "Group cannot host calls".to_string(),
            ));
        }

        let membership = self.relations.get_group_relation(group_id, caller).await?;
        if !membership.is_member() {
            return Err(LiveError::RelationNotFound(
                "Caller is not a group member".to_string(),
            ));
        }

        if invitees.is_empty() {
            return Ok(Vec::new());
        }

        let members: BTreeSet<String> = self
            .relations
            .get_batch_group_relation(group_id, invitees)
            .await?
            .into_iter()
            .filter(|r| r.is_member() && !r.silenced)
            .map(|r| r.user_id)
            .collect();

        let candidates: Vec<String> = invitees
            .iter()
            .filter(|id| members.contains(id.as_str()))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let normal: BTreeSet<String> = self
            .users
            .get_batch_user_info(&candidates)
            .await?
            .into_iter()
            .filter(|u| u.is_normal())
            .map(|u| u.user_id)
            .collect();

        let callable: Vec<String> = candidates
            .into_iter()
            .filter(|id| normal.contains(id))
            .collect();

        if callable.len() < invitees.len() {
            debug!(
                target: "live.call_session",
                group_id = %group_id,
                dropped = invitees.len() - callable.len(),
                "Dropped uncallable group members from invite"
            );
        }
        Ok(callable)
    }

    /// Best-effort rollback of a half-created call.
    async fn discard(&self, room: &Room, claimed: &[String]) {
        if !claimed.is_empty() {
            if let Err(e) = self.store.delete_users_live(&room.id, claimed).await {
                warn!(target: "live.call_session", room_id = %room.id, error = %e, "Rollback: pointer delete failed");
            }
        }
        if let Err(e) = self.store.delete_room(&room.id).await {
            warn!(target: "live.call_session", room_id = %room.id, error = %e, "Rollback: room delete failed");
        }
        if let Err(e) = self.signaling.delete_room(&room.id.to_string()).await {
            warn!(target: "live.call_session", room_id = %room.id, error = %e, "Rollback: media room delete failed");
        }
    }

    async fn arm_ring_timer(&self, room_id: RoomId) {
        let this = self.clone();
        self.timers
            .arm(room_id, self.settings.ring_timeout, async move {
                if let Err(e) = this.handle_ring_timeout(room_id).await {
                    warn!(
                        target: "live.call_session",
                        room_id = %room_id,
                        error = %e,
                        "Ring timeout handling failed"
                    );
                }
            })
            .await;
    }

    // ========================================================================
    // JoinRoom
    // ========================================================================

    /// Enter a call and obtain a signaling token.
    ///
    /// # Errors
    ///
    /// - `CallNotFound` if the room is gone (locally or on the signaling side)
    /// - `Forbidden` if a user call is joined by a non-participant
    /// - `RelationNotFound` if a group call is joined by a non-member
    /// - `AlreadyInCall` if already connected here or busy elsewhere
    /// - `MaxParticipantsExceeded` if the room or the media room is full
    #[instrument(skip_all, fields(caller = %caller, room_id = %room_id))]
    pub async fn join_room(
        &self,
        caller: &str,
        room_id: &RoomId,
    ) -> Result<JoinRoomResponse, LiveError> {
        let room = self.store.get_room(room_id).await?;

        let room = match room.room_type {
            RoomType::UserCall => self.join_user_call(caller, room).await?,
            RoomType::GroupCall => self.join_group_call(caller, room).await?,
        };

        let token = self
            .signaling
            .issue_token(&room.id.to_string(), caller, caller == room.creator)?;

        if caller != room.creator {
            self.notifier.notify(
                room.recipients_except(caller),
                CallEvent::call_accepted(&room, caller),
            );
        }
        metrics::record_join(room.room_type.as_str());

        info!(
            target: "live.call_session",
            room_id = %room.id,
            num_participants = room.num_participants,
            "Participant joined"
        );

        Ok(JoinRoomResponse {
            room,
            url: self.settings.signaling_public_url.clone(),
            token,
        })
    }

    async fn join_user_call(&self, caller: &str, mut room: Room) -> Result<Room, LiveError> {
        if !room.is_participant(caller) {
            return Err(LiveError::Forbidden(
                "Not a participant of this call".to_string(),
            ));
        }
        if room.is_connected(caller) {
            return Err(LiveError::AlreadyInCall(
                "Already joined this call".to_string(),
            ));
        }
        self.ensure_not_elsewhere(caller, &room.id).await?;
        // The creator's seat is never given away
        if caller != room.creator && room.num_participants >= room.max_participants {
            return Err(LiveError::MaxParticipantsExceeded(
                "Call is full".to_string(),
            ));
        }
        self.check_media_capacity(&room).await?;

        let was_answered = room.is_answered();
        mark_joined(&mut room, caller);
        room.num_participants = user_call_seats(&room);

        if !was_answered && room.is_answered() {
            // Answered: nothing rings any more
            self.store
                .update_room_with_expiration(&room, Expiration::Persist)
                .await?;
            self.store
                .set_user_live_persist(&room.participant_ids())
                .await?;
            self.timers.cancel(&room.id).await;
        } else if was_answered {
            // Creator catching up with an answered call
            self.store.update_room(&room).await?;
        } else {
            self.store
                .update_room_with_expiration(
                    &room,
                    Expiration::After(self.ringing_ttl()),
                )
                .await?;
            self.store
                .create_users_live(&room.id, &room.participant_ids())
                .await?;
        }
        Ok(room)
    }

    async fn join_group_call(&self, caller: &str, mut room: Room) -> Result<Room, LiveError> {
        let group_id = room.group_id.clone().ok_or_else(|| {
            LiveError::Internal("Group call without group id".to_string())
        })?;

        if caller != room.creator {
            let membership = self.relations.get_group_relation(&group_id, caller).await?;
            if !membership.is_member() {
                return Err(LiveError::RelationNotFound(
                    "Not a group member".to_string(),
                ));
            }
        }
        if room.is_connected(caller) {
            return Err(LiveError::AlreadyInCall(
                "Already joined this call".to_string(),
            ));
        }
        self.ensure_not_elsewhere(caller, &room.id).await?;
        if room.num_participants >= room.max_participants {
            return Err(LiveError::MaxParticipantsExceeded(
                "Call is full".to_string(),
            ));
        }
        self.check_media_capacity(&room).await?;

        let was_answered = room.is_answered();
        mark_joined(&mut room, caller);
        let answered_now = !was_answered && room.is_answered();

        self.store.create_users_live(&room.id, &[caller.to_string()]).await?;

        if answered_now {
            self.store
                .update_room_with_expiration(&room, Expiration::Persist)
                .await?;
            self.store.set_group_live_persist(&group_id).await?;
            let mut holders = connected_ids(&room);
            if !holders.contains(&room.creator) {
                holders.push(room.creator.clone());
            }
            self.store.set_user_live_persist(&holders).await?;
            self.timers.cancel(&room.id).await;
        } else if was_answered {
            self.store.update_room(&room).await?;
            self.store
                .set_user_live_persist(&[caller.to_string()])
                .await?;
        } else {
            self.store
                .update_room_with_expiration(
                    &room,
                    Expiration::After(self.ringing_ttl()),
                )
                .await?;
        }
        Ok(room)
    }

    /// `AlreadyInCall` if `user_id` is in a room other than `room_id`.
    async fn ensure_not_elsewhere(&self, user_id: &str, room_id: &RoomId) -> Result<(), LiveError> {
        match self.store.get_user_rooms(user_id).await {
            Ok(other) if other.id != *room_id => Err(LiveError::AlreadyInCall(
                "Already in another call".to_string(),
            )),
            Ok(_) | Err(LiveError::CallNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Authoritative capacity check against the media room.
    async fn check_media_capacity(&self, room: &Room) -> Result<(), LiveError> {
        let media = self.media_room(room).await?;
        if media.num_participants >= room.max_participants {
            warn!(
                target: "live.call_session",
                room_id = %room.id,
                local = room.num_participants,
                media = media.num_participants,
                "Media room full while local count has space"
            );
            return Err(LiveError::MaxParticipantsExceeded(
                "Call is full".to_string(),
            ));
        }
        Ok(())
    }

    /// The media room backing `room`.
    ///
    /// If the signaling service no longer has it, the call is dead: its
    /// cache state is removed and `CallNotFound` returned.
    async fn media_room(&self, room: &Room) -> Result<SignalingRoomInfo, LiveError> {
        let name = room.id.to_string();
        let media = self
            .signaling
            .list_rooms(std::slice::from_ref(&name))
            .await?
            .into_iter()
            .find(|r| r.name == name);

        match media {
            Some(info) => Ok(info),
            None => {
                warn!(
                    target: "live.call_session",
                    room_id = %room.id,
                    "Media room missing, removing cached call state"
                );
                self.timers.cancel(&room.id).await;
                self.clear_state(room).await?;
                Err(LiveError::CallNotFound)
            }
        }
    }

    // ========================================================================
    // RejectRoom
    // ========================================================================

    /// Decline a ringing call.
    ///
    /// # Errors
    ///
    /// - `CallNotFound` if the room is gone
    /// - `Forbidden` if the caller is not invited
    /// - `RejectNotAllowed` for the creator or an already connected participant
    #[instrument(skip_all, fields(caller = %caller, room_id = %room_id))]
    pub async fn reject_room(&self, caller: &str, room_id: &RoomId) -> Result<(), LiveError> {
        let mut room = self.store.get_room(room_id).await?;

        if !room.is_participant(caller) {
            return Err(LiveError::Forbidden(
                "Not a participant of this call".to_string(),
            ));
        }
        if caller == room.creator {
            return Err(LiveError::RejectNotAllowed(
                "The caller cannot reject their own call".to_string(),
            ));
        }
        if room.is_connected(caller) {
            return Err(LiveError::RejectNotAllowed(
                "Call already answered".to_string(),
            ));
        }

        match room.room_type {
            RoomType::UserCall => {
                self.teardown(&room, EndReason::Rejected).await?;
                self.post_summary(caller, &room.creator, &room.id, CallSummary::Rejected)
                    .await;
                self.notifier.notify(
                    room.recipients_except(caller),
                    CallEvent::call_rejected(&room, caller),
                );
            }
            RoomType::GroupCall => {
                room.participants.remove(caller);
                let nobody_left = !room
                    .participants
                    .keys()
                    .any(|id| *id != room.creator)
                    && room.other_connected(&room.creator) == 0;

                if nobody_left && !room.is_connected(&room.creator) {
                    self.teardown(&room, EndReason::Rejected).await?;
                } else {
                    self.store.update_room(&room).await?;
                    self.store
                        .delete_users_live(&room.id, &[caller.to_string()])
                        .await?;
                }
                let mut recipients = room.participant_ids();
                recipients.retain(|id| id != caller);
                self.notifier
                    .notify(recipients, CallEvent::call_rejected(&room, caller));
            }
        }

        info!(target: "live.call_session", room_id = %room.id, "Call rejected");
        Ok(())
    }

    // ========================================================================
    // LeaveRoom / DeleteRoom
    // ========================================================================

    /// Hang up.
    ///
    /// A one-to-one call always ends for both parties. A group call ends
    /// only when the last connected participant leaves.
    ///
    /// # Errors
    ///
    /// - `CallNotFound` if the room is gone
    /// - `Forbidden` if the caller is not a participant
    #[instrument(skip_all, fields(caller = %caller, room_id = %room_id))]
    pub async fn leave_room(&self, caller: &str, room_id: &RoomId) -> Result<(), LiveError> {
        let room = self.store.get_room(room_id).await?;

        if !room.is_participant(caller) {
            return Err(LiveError::Forbidden(
                "Not a participant of this call".to_string(),
            ));
        }

        match room.room_type {
            RoomType::UserCall => self.leave_user_call(caller, &room).await,
            RoomType::GroupCall => self.leave_group_call(caller, room).await,
        }
    }

    /// Alias of [`Self::leave_room`].
    pub async fn delete_room(&self, caller: &str, room_id: &RoomId) -> Result<(), LiveError> {
        self.leave_room(caller, room_id).await
    }

    async fn leave_user_call(&self, caller: &str, room: &Room) -> Result<(), LiveError> {
        let peer = room.peer_of(caller).unwrap_or_default();

        if room.is_connected(caller) {
            let duration = self.call_duration(room).await;
            self.teardown(room, EndReason::Hangup).await?;
            self.post_summary(caller, &peer, &room.id, CallSummary::Duration(duration))
                .await;
            self.notifier.notify(
                room.recipients_except(caller),
                CallEvent::call_ended(room, caller, duration.as_secs()),
            );
            info!(target: "live.call_session", room_id = %room.id, duration_secs = duration.as_secs(), "Call ended");
        } else {
            self.teardown(room, EndReason::Rejected).await?;
            let summary = if caller == room.creator {
                CallSummary::Cancelled
            } else {
                CallSummary::Rejected
            };
            self.post_summary(caller, &peer, &room.id, summary).await;
            self.notifier.notify(
                room.recipients_except(caller),
                CallEvent::call_rejected(room, caller),
            );
            info!(target: "live.call_session", room_id = %room.id, "Call abandoned before connecting");
        }
        Ok(())
    }

    async fn leave_group_call(&self, caller: &str, mut room: Room) -> Result<(), LiveError> {
        let was_connected = room.is_connected(caller);
        let last_one_out = room.other_connected(caller) == 0
            && (was_connected || caller == room.creator);

        if last_one_out {
            let duration = self.call_duration(&room).await;
            self.teardown(&room, EndReason::Hangup).await?;
            self.notifier.notify(
                room.recipients_except(caller),
                CallEvent::call_ended(&room, caller, duration.as_secs()),
            );
            info!(target: "live.call_session", room_id = %room.id, "Group call ended");
            return Ok(());
        }

        room.participants.remove(caller);
        if was_connected {
            room.num_participants = room.num_participants.saturating_sub(1);
        }
        self.store.update_room(&room).await?;
        self.store
            .delete_users_live(&room.id, &[caller.to_string()])
            .await?;
        if let Err(e) = self
            .signaling
            .remove_participant(&room.id.to_string(), caller)
            .await
        {
            warn!(target: "live.call_session", room_id = %room.id, error = %e, "Failed to remove media participant");
        }

        let mut recipients = room.participant_ids();
        recipients.retain(|id| id != caller);
        self.notifier
            .notify(recipients, CallEvent::participant_left(&room, caller));

        info!(
            target: "live.call_session",
            room_id = %room.id,
            num_participants = room.num_participants,
            "Participant left group call"
        );
        Ok(())
    }

    // ========================================================================
    // Ring timeout
    // ========================================================================

    /// Missed-call path, run when a ring timer fires.
    ///
    /// Re-reads the room: if it is gone or answered this is a no-op.
    /// Returns whether the call was torn down.
    ///
    /// # Errors
    ///
    /// Cache or signaling failures during teardown.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn handle_ring_timeout(&self, room_id: RoomId) -> Result<bool, LiveError> {
        let room = match self.store.get_room(&room_id).await {
            Ok(room) => room,
            Err(LiveError::CallNotFound) => {
                debug!(target: "live.call_session", "Ring timeout for finished call");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if room.is_answered() {
            debug!(target: "live.call_session", "Ring timeout for answered call");
            return Ok(false);
        }

        self.teardown(&room, EndReason::Missed).await?;

        if room.room_type == RoomType::UserCall {
            if let Some(callee) = room.peer_of(&room.creator) {
                self.post_summary(&room.creator, &callee, &room.id, CallSummary::Missed)
                    .await;
            }
        }
        self.notifier.notify(
            room.participant_ids(),
            CallEvent::call_missed(&room, &room.creator),
        );

        info!(target: "live.call_session", "Call missed");
        Ok(true)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The caller's active call with its live media membership.
    ///
    /// # Errors
    ///
    /// `CallNotFound` if the caller has no call or its media room is gone.
    #[instrument(skip_all, fields(caller = %caller))]
    pub async fn get_user_room(&self, caller: &str) -> Result<RoomView, LiveError> {
        let room = self.store.get_user_rooms(caller).await?;
        self.view(room).await
    }

    /// The group's active call. The caller must be a member.
    ///
    /// # Errors
    ///
    /// - `RelationNotFound` if the caller is not a member
    /// - `CallNotFound` if the group has no call or its media room is gone
    #[instrument(skip_all, fields(caller = %caller, group_id = %group_id))]
    pub async fn get_group_room(&self, caller: &str, group_id: &str) -> Result<RoomView, LiveError> {
        let membership = self.relations.get_group_relation(group_id, caller).await?;
        if !membership.is_member() {
            return Err(LiveError::RelationNotFound(
                "Not a group member".to_string(),
            ));
        }
        let room = self.store.get_group_room(group_id).await?;
        self.view(room).await
    }

    async fn view(&self, room: Room) -> Result<RoomView, LiveError> {
        self.media_room(&room).await?;
        let live_participants = self
            .signaling
            .list_participants(&room.id.to_string())
            .await?;
        Ok(RoomView {
            room,
            url: self.settings.signaling_public_url.clone(),
            live_participants,
        })
    }

    // ========================================================================
    // Teardown helpers
    // ========================================================================

    /// End the call for everyone.
    async fn teardown(&self, room: &Room, reason: EndReason) -> Result<(), LiveError> {
        self.timers.cancel(&room.id).await;
        self.clear_state(room).await?;

        // The record is already gone; a lingering media room closes itself
        // once empty
        if let Err(e) = self.signaling.delete_room(&room.id.to_string()).await {
            warn!(target: "live.call_session", room_id = %room.id, error = %e, "Failed to delete media room");
        }

        metrics::record_call_ended(reason.as_str());
        Ok(())
    }

    /// Remove pointers and the room record.
    async fn clear_state(&self, room: &Room) -> Result<(), LiveError> {
        self.store
            .delete_users_live(&room.id, &room.participant_ids())
            .await?;
        if let Some(gid) = &room.group_id {
            self.store.delete_group_live(&room.id, gid).await?;
        }
        self.store.delete_room(&room.id).await
    }

    /// Time since the media room was created, falling back to the room's
    /// own creation time.
    async fn call_duration(&self, room: &Room) -> Duration {
        let now_ms = Utc::now().timestamp_millis();
        let name = room.id.to_string();

        let started_ms = match self.signaling.list_rooms(std::slice::from_ref(&name)).await {
            Ok(rooms) => rooms
                .into_iter()
                .find(|r| r.name == name && r.creation_time > 0)
                .map_or(room.created_at, |r| r.creation_time.saturating_mul(1000)),
            Err(e) => {
                debug!(target: "live.call_session", error = %e, "Falling back to local creation time");
                room.created_at
            }
        };

        let elapsed_ms = u64::try_from(now_ms.saturating_sub(started_ms)).unwrap_or(0);
        Duration::from_millis(elapsed_ms)
    }

    /// Post a call summary into the two parties' conversation. Best effort.
    async fn post_summary(
        &self,
        sender_id: &str,
        receiver_id: &str,
        room_id: &RoomId,
        summary: CallSummary,
    ) {
        if receiver_id.is_empty() {
            return;
        }
        let message = UserMessage {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            msg_type: MessageType::Call,
            content: summary.content(),
            room_id: Some(*room_id),
            send_time: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.messages.send_user_message(&message).await {
            warn!(
                target: "live.call_session",
                room_id = %room_id,
                error = %e,
                "Failed to post call summary"
            );
        }
    }
}

/// Move `identity` to `Joined`, creating its entry if needed.
fn mark_joined(room: &mut Room, identity: &str) {
    let entry = room
        .participants
        .entry(identity.to_string())
        .or_insert_with(crate::models::ActiveParticipant::waiting);
    entry.transition(ParticipantStatus::Joined);
    room.num_participants = room.num_participants.saturating_add(1);
}

/// Occupied seats of a one-to-one call: the connected parties, plus the
/// creator's seat once the callee has answered.
fn user_call_seats(room: &Room) -> u32 {
    let connected = room.participants.values().filter(|p| p.connected).count();
    let creator_held = room.is_answered() && !room.is_connected(&room.creator);
    u32::try_from(connected + usize::from(creator_held)).unwrap_or(u32::MAX)
}

fn connected_ids(room: &Room) -> Vec<String> {
    room.participant_ids()
        .into_iter()
        .filter(|id| room.is_connected(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoomOption, RoomType};

    #[test]
    fn test_mark_joined_creates_missing_entry() {
        let mut room = Room::new(
            RoomType::GroupCall,
            "alice",
            Some("g1".to_string()),
            &[],
            10,
            RoomOption::default(),
        );

        mark_joined(&mut room, "dave");

        assert!(room.is_connected("dave"));
        assert_eq!(room.num_participants, 1);
        assert_eq!(connected_ids(&room), vec!["dave".to_string()]);
    }

    #[test]
    fn test_user_call_seats_reserve_creator_on_answer() {
        let mut room = Room::new(
            RoomType::UserCall,
            "alice",
            None,
            &["bob".to_string()],
            2,
            RoomOption::default(),
        );
        assert_eq!(user_call_seats(&room), 0);

        mark_joined(&mut room, "bob");
        assert_eq!(user_call_seats(&room), 2);

        mark_joined(&mut room, "alice");
        assert_eq!(user_call_seats(&room), 2);
    }

    #[test]
    fn test_end_reason_labels() {
        assert_eq!(EndReason::Rejected.as_str(), "rejected");
        assert_eq!(EndReason::Hangup.as_str(), "hangup");
        assert_eq!(EndReason::Missed.as_str(), "missed");
    }
}
