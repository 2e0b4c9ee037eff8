//! Redis storage for call state.

pub mod client;
pub mod lua_scripts;

pub use client::RedisRoomStore;
