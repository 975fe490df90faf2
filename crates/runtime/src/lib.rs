//! Authenticated WebSocket transport for the termlink terminal console.
//!
//! [`ConnectionManager`] opens a socket to the terminal server, performs the
//! token handshake, fans inbound messages out to per-kind handlers in
//! registration order, and reconnects on abnormal closes with a bounded,
//! fixed-interval policy.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod transport;

pub use auth::{AlwaysConnected, AuthState, CredentialProvider, StaticCredential};
pub use config::{ConnectionConfig, Endpoint};
pub use connection::{ConnectionManager, ConnectionState, Lifecycle};
pub use error::{Error, Result};
pub use handlers::{Handler, HandlerId, handler};
pub use termlink_protocol as protocol;
