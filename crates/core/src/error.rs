//! Error types for session management.

use thiserror::Error;

use crate::session::SessionId;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors returned by [`SessionStore`](crate::SessionStore) and session operations.
#[derive(Debug, Error)]
pub enum SessionError {
	/// No session with this id exists.
	#[error("Session not found: {0}")]
	NotFound(SessionId),

	/// The store keeps at least one session open.
	#[error("Cannot close {0}: it is the last open session")]
	LastSession(SessionId),

	/// The session's transport could not connect or authenticate.
	#[error(transparent)]
	Transport(#[from] termlink_runtime::Error),
}
