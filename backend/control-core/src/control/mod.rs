//! The authenticated control connection.
//!
//! - [`channel`]: line framing over a byte stream (no protocol semantics)
//! - [`auth`]: the AUTHENTICATE / GETCONF handshake on top of a channel

pub mod auth;
pub mod channel;

pub use auth::{SUCCESS_TOKEN, authenticate};
pub use channel::ControlChannel;
