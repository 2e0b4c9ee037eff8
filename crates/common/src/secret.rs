//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use them for every
//! sensitive value a Parley service handles: cache URLs carrying passwords,
//! signaling API secrets, and the access tokens minted from them.
//!
//! `SecretString` implements `Debug` with redaction, so a config struct that
//! derives `Debug` cannot leak its credentials through `{:?}` or tracing.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SignalingCredentials {
//!     api_key: String,
//!     api_secret: SecretString,
//! }
//!
//! let creds = SignalingCredentials {
//!     api_key: "APIkey".to_string(),
//!     api_secret: SecretString::from("signing-secret"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("signing-secret"));
//! assert_eq!(creds.api_secret.expose_secret(), "signing-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
