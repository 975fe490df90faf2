//! Lifecycle notifications published by the store and its sessions.

use termlink_runtime::ConnectionState;

use crate::session::SessionId;

/// Observable change to a session or to the store's active selection.
///
/// Delivered on a [`tokio::sync::broadcast`] channel; see
/// [`SessionStore::subscribe`](crate::SessionStore::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
	Created { id: SessionId, name: String },
	StateChanged { id: SessionId, state: ConnectionState },
	Renamed { id: SessionId, name: String },
	Resized { id: SessionId, cols: u16, rows: u16 },
	Cleared { id: SessionId },
	ActiveChanged { id: Option<SessionId> },
	Closed { id: SessionId },
}

impl SessionEvent {
	/// Session the event concerns, if any.
	pub fn session_id(&self) -> Option<SessionId> {
		match self {
			SessionEvent::Created { id, .. }
			| SessionEvent::StateChanged { id, .. }
			| SessionEvent::Renamed { id, .. }
			| SessionEvent::Resized { id, .. }
			| SessionEvent::Cleared { id }
			| SessionEvent::Closed { id } => Some(*id),
			SessionEvent::ActiveChanged { id } => *id,
		}
	}
}
