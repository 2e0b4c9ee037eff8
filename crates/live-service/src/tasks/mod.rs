//! Background tasks for the live call service.
//!
//! - `ring_timeout` - Tears down calls nobody answered in time

pub mod ring_timeout;

pub use ring_timeout::RingTimeoutScheduler;
