//! Authentication exchange performed right after the socket opens.
//!
//! The protocol is simple:
//!
//! 1. Client sends `{"type":"auth","payload":{"token":...}}`
//! 2. Server replies `{"type":"auth","payload":{"authenticated":true,...}}` on success,
//!    or `{"type":"error","code":"AUTH_FAILED","error":...}` on rejection
//!
//! Anything else arriving while the client waits is not part of the exchange;
//! [`AuthVerdict::from_message`] returns [`None`] for it.

use serde::{Deserialize, Serialize};

use crate::message::{WireMessage, kind};

/// Error code the server attaches to an `error` message when the credential is refused.
pub const AUTH_FAILED: &str = "AUTH_FAILED";

/// Payload of the outbound `auth` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
	/// Bearer credential issued to the console user.
	pub token: String,
}

/// Payload of the inbound `auth` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthReply {
	pub authenticated: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
}

/// Outcome of the exchange as decided by a single inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
	/// Server accepted the credential.
	Accepted { username: Option<String> },
	/// Server refused the credential, with its reason.
	Rejected { reason: String },
}

impl AuthVerdict {
	/// Classifies `message` as a handshake outcome.
	///
	/// Returns [`None`] for messages that do not settle the exchange, including
	/// `error` messages carrying a code other than [`AUTH_FAILED`].
	pub fn from_message(message: &WireMessage) -> Option<Self> {
		match message.kind.as_str() {
			kind::AUTH => {
				let reply: AuthReply = message.payload_as()?;
				if reply.authenticated {
					Some(Self::Accepted { username: reply.username })
				} else {
					Some(Self::Rejected {
						reason: message.error_text().unwrap_or("Authentication rejected").to_string(),
					})
				}
			}
			kind::ERROR if message.error_code() == Some(AUTH_FAILED) => Some(Self::Rejected {
				reason: message.error_text().unwrap_or("Authentication failed").to_string(),
			}),
			_ => None,
		}
	}
}
