//! Repositories for call state.

pub mod rooms;

pub use rooms::{Expiration, RoomRepository};
