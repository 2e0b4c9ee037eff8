//! Live call service library.
//!
//! Orchestrates one-to-one and group voice/video calls on top of an
//! external media signaling server. The service owns call state (who is
//! ringing, who is connected, which room a user or group is in); media
//! transport is entirely the signaling server's job.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/call_session.rs
//!                                     |-> repositories (RoomRepository, Redis-backed)
//!                                     |-> services/signaling.rs (media rooms, tokens)
//!                                     |-> services/notification.rs (push fan-out)
//!                                     `-> tasks/ring_timeout.rs (missed-call timers)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Caller identity extraction
//! - `models` - Room state and API models
//! - `observability` - Metrics and health probes
//! - `redis` - Redis-backed room store
//! - `repositories` - Room store abstraction
//! - `routes` - Axum router setup
//! - `services` - Call orchestration and collaborator clients
//! - `tasks` - Ring timeout scheduler

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod redis;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
