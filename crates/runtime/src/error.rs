//! Error types for the termlink transport.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, authenticating, or using a socket.
#[derive(Debug, Error)]
pub enum Error {
	/// No credential was available when `connect` was called.
	#[error("No authentication token available")]
	MissingCredential,

	/// The socket could not be opened.
	#[error("Failed to connect to terminal server: {0}")]
	ConnectionFailed(String),

	/// The server refused the credential.
	#[error("Authentication failed: {0}")]
	AuthFailed(String),

	/// No handshake verdict arrived in time.
	#[error("Authentication timed out after {timeout_ms}ms")]
	AuthTimeout { timeout_ms: u64 },

	/// The socket closed, or was superseded, before the operation finished.
	#[error("Connection closed")]
	ChannelClosed,

	/// The server URL or path could not be turned into a socket URL.
	#[error("Invalid endpoint: {0}")]
	InvalidEndpoint(String),

	/// A message handler reported a failure.
	#[error("Handler error: {0}")]
	Handler(String),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns `true` for handshake timeouts.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::AuthTimeout { .. })
	}

	/// Returns `true` when the credential was missing or refused.
	pub fn is_auth_failure(&self) -> bool {
		matches!(self, Error::MissingCredential | Error::AuthFailed(_))
	}
}
