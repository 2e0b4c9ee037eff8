//! Middleware for the live call service.
//!
//! - `identity` - Resolves the calling user from the gateway header

pub mod identity;

pub use identity::{require_caller, Caller, CALLER_HEADER};
