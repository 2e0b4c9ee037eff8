//! Test fixtures for the live call service.
//!
//! [`TestHarness`] wires a real `CallSessionService` to the in-memory
//! mocks and keeps handles on each mock for assertions.

use crate::mock_directory::{MockGroups, MockRelations, MockUsers, RecordingMessages};
use crate::mock_push::RecordingPush;
use crate::mock_signaling::MockSignaling;
use crate::mock_store::InMemoryRoomStore;
use live_service::models::{CreateRoomRequest, RoomOption, RoomType};
use live_service::services::group_client::GroupStatus;
use live_service::services::{
    CallSessionService, CallSessionSettings, Collaborators, RING_TTL_GRACE,
};
use live_service::tasks::RingTimeoutScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ring timeout used by the harness unless overridden.
pub const TEST_RING_TIMEOUT: Duration = Duration::from_secs(60);

/// Group participant ceiling used by the harness unless overridden.
pub const TEST_GROUP_MAX: u32 = 8;

/// Signaling URL handed to clients by the harness.
pub const TEST_SIGNALING_URL: &str = "wss://media.test";

/// Request body for a one-to-one call to `callee`.
#[must_use]
pub fn user_call_request(callee: &str) -> CreateRoomRequest {
    CreateRoomRequest {
        room_type: RoomType::UserCall,
        group_id: None,
        participants: vec![callee.to_string()],
        option: RoomOption::default(),
    }
}

/// Request body for a group call inviting `invitees`.
#[must_use]
pub fn group_call_request(group_id: &str, invitees: &[&str]) -> CreateRoomRequest {
    CreateRoomRequest {
        room_type: RoomType::GroupCall,
        group_id: Some(group_id.to_string()),
        participants: invitees.iter().map(|s| (*s).to_string()).collect(),
        option: RoomOption::default(),
    }
}

/// A `CallSessionService` over in-memory collaborators.
pub struct TestHarness {
    pub calls: CallSessionService,
    pub store: InMemoryRoomStore,
    pub signaling: MockSignaling,
    pub push: RecordingPush,
    pub relations: MockRelations,
    pub users: MockUsers,
    pub groups: MockGroups,
    pub messages: RecordingMessages,
    pub timers: RingTimeoutScheduler,
    pub shutdown: CancellationToken,
}

impl TestHarness {
    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Harness with default settings and no relations.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    ring_timeout: Duration,
    group_max: u32,
    relations: MockRelations,
    groups: MockGroups,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            ring_timeout: TEST_RING_TIMEOUT,
            group_max: TEST_GROUP_MAX,
            relations: MockRelations::new(),
            groups: MockGroups::new(),
        }
    }
}

impl TestHarnessBuilder {
    #[must_use]
    pub fn ring_timeout(mut self, ring_timeout: Duration) -> Self {
        self.ring_timeout = ring_timeout;
        self
    }

    #[must_use]
    pub fn group_max(mut self, group_max: u32) -> Self {
        self.group_max = group_max;
        self
    }

    /// Make `a` and `b` mutual contacts.
    #[must_use]
    pub fn with_friends(self, a: &str, b: &str) -> Self {
        self.relations.add_friends(a, b);
        self
    }

    /// A normal group with the given members.
    #[must_use]
    pub fn with_group(self, group_id: &str, members: &[&str]) -> Self {
        self.groups.set_status(group_id, GroupStatus::Normal);
        for member in members {
            self.relations.add_member(group_id, member);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> TestHarness {
        let store = InMemoryRoomStore::new(self.ring_timeout + RING_TTL_GRACE);
        let signaling = MockSignaling::new();
        let push = RecordingPush::new();
        let users = MockUsers::new();
        let messages = RecordingMessages::new();
        let shutdown = CancellationToken::new();
        let timers = RingTimeoutScheduler::new(shutdown.child_token());

        let collaborators = Collaborators {
            store: Arc::new(store.clone()),
            signaling: Arc::new(signaling.clone()),
            push: Arc::new(push.clone()),
            relations: Arc::new(self.relations.clone()),
            users: Arc::new(users.clone()),
            groups: Arc::new(self.groups.clone()),
            messages: Arc::new(messages.clone()),
        };

        let calls = CallSessionService::new(
            collaborators,
            timers.clone(),
            CallSessionSettings {
                ring_timeout: self.ring_timeout,
                group_max_participants: self.group_max,
                signaling_public_url: TEST_SIGNALING_URL.to_string(),
            },
        );

        TestHarness {
            calls,
            store,
            signaling,
            push,
            relations: self.relations,
            users,
            groups: self.groups,
            messages,
            timers,
            shutdown,
        }
    }
}
