//! HTTP request handlers for the live call service.

pub mod calls;
pub mod metrics;

pub use calls::{
    create_room, delete_room, get_current_room, get_group_room, join_room, leave_room,
    reject_room,
};
pub use metrics::metrics_handler;
