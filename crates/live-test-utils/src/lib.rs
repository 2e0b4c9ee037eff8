//! # Live Test Utilities
//!
//! Mocks and fixtures for testing the live call service without Redis,
//! a signaling server or any sibling service.
//!
//! ## Modules
//!
//! - `mock_store` - In-memory room store with real TTL semantics
//! - `mock_signaling` - Scriptable media signaling server
//! - `mock_push` - Recording push transport
//! - `mock_directory` - Relation, user, group and message services
//! - `fixtures` - A fully wired `CallSessionService` over the mocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = TestHarness::builder().with_friends("alice", "bob").build();
//!
//!     let created = harness.calls.create_room("alice", user_call_request("bob")).await?;
//!     harness.calls.join_room("alice", &created.room_id).await?;
//!
//!     assert!(harness.store.user_pointer("bob").is_some());
//! }
//! ```

pub mod fixtures;
pub mod mock_directory;
pub mod mock_push;
pub mod mock_signaling;
pub mod mock_store;

pub use fixtures::*;
pub use mock_directory::*;
pub use mock_push::*;
pub use mock_signaling::*;
pub use mock_store::*;
