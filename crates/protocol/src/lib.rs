//! Wire types for the termlink interactive-session protocol.
//!
//! Every frame on the socket is a single JSON object with a `type`
//! discriminator; see [`WireMessage`]. Typed payloads for the message kinds
//! this layer produces and consumes live alongside it.

pub mod auth_exchange;
pub mod message;

pub use auth_exchange::{AUTH_FAILED, AuthReply, AuthRequest, AuthVerdict};
pub use message::{OutputPayload, ResizePayload, SubscribePayload, WireMessage, close_code, kind};
