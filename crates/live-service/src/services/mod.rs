//! Services for the live call service.
//!
//! - `call_session` - Call state machine (create, join, reject, leave)
//! - `signaling` - Media signaling server client and access tokens
//! - `notification` - Fire-and-forget event delivery
//! - `relation_client`, `user_client`, `group_client`, `message_client`,
//!   `push_client` - Sibling service clients
//! - `upstream` - Shared JSON-over-HTTP plumbing for the sibling clients

pub mod call_session;
pub mod group_client;
pub mod message_client;
pub mod notification;
pub mod push_client;
pub mod relation_client;
pub mod signaling;
pub mod upstream;
pub mod user_client;

pub use call_session::{CallSessionService, CallSessionSettings, Collaborators, RING_TTL_GRACE};
pub use group_client::{GroupClient, GroupService};
pub use message_client::{MessageClient, MessageService};
pub use notification::NotificationDispatcher;
pub use push_client::{PushClient, PushService};
pub use relation_client::{RelationClient, RelationService};
pub use signaling::{SignalingClient, SignalingService};
pub use user_client::{UserClient, UserService};
