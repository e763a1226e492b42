//! Shared building blocks for the Tor manager workspace.
//!
//! This crate holds the small, dependency-light types that every other crate
//! needs: source-location tracking for errors and a secret wrapper for the
//! control password.
//!
//! ## Architecture
//!
//! - **common** (this crate): Leaf types with no business logic
//! - **control-core**: Control protocol, daemon supervision and discovery
//! - **tor-manager**: Command-line front end wiring everything together

pub mod error;
pub mod redacted_password;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_password::RedactedPassword;
