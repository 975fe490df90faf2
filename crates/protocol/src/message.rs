//! The JSON envelope shared by every message kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth_exchange::AuthRequest;

/// Message kinds produced and consumed by the session layer.
pub mod kind {
	/// Outbound credential, inbound handshake reply.
	pub const AUTH: &str = "auth";
	/// Inbound failure report; `code` distinguishes auth failures.
	pub const ERROR: &str = "error";
	/// Outbound request to start a shell with the given geometry.
	pub const SUBSCRIBE: &str = "subscribe";
	/// Inbound bytes to display.
	pub const OUTPUT: &str = "output";
	/// Outbound bytes typed by the user.
	pub const INPUT: &str = "input";
	/// Outbound viewport change.
	pub const RESIZE: &str = "resize";
}

/// WebSocket close codes with protocol meaning.
pub mod close_code {
	/// Intentional close; the peer must not reconnect.
	pub const NORMAL: u16 = 1000;
	/// Connection dropped without a close frame.
	pub const ABNORMAL: u16 = 1006;
}

/// A single frame on the socket.
///
/// Fields other than `type` are optional and kind-specific. Unknown fields
/// are ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
}

/// Payload of the outbound `subscribe` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
	pub cols: u16,
	pub rows: u16,
	pub shell: String,
}

/// Payload of the outbound `resize` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizePayload {
	pub cols: u16,
	pub rows: u16,
}

/// Payload of the inbound `output` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPayload {
	pub data: String,
}

impl WireMessage {
	/// Creates a message of `kind` with no fields set.
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			payload: None,
			data: None,
			error: None,
			code: None,
		}
	}

	/// Attaches a serialized payload.
	///
	/// Payload types in this crate always serialize; a value that fails to
	/// serialize is stored as `null`.
	pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
		self.payload = Some(serde_json::to_value(payload).unwrap_or(Value::Null));
		self
	}

	/// Sets the top-level `data` field.
	pub fn with_data(mut self, data: impl Into<String>) -> Self {
		self.data = Some(data.into());
		self
	}

	/// Outbound credential for the handshake.
	pub fn auth(token: impl Into<String>) -> Self {
		Self::new(kind::AUTH).with_payload(&AuthRequest { token: token.into() })
	}

	/// Outbound request to start a shell.
	pub fn subscribe(cols: u16, rows: u16, shell: impl Into<String>) -> Self {
		Self::new(kind::SUBSCRIBE).with_payload(&SubscribePayload {
			cols,
			rows,
			shell: shell.into(),
		})
	}

	/// Outbound keystrokes. Carried in the top-level `data` field.
	pub fn input(data: impl Into<String>) -> Self {
		Self::new(kind::INPUT).with_data(data)
	}

	/// Outbound viewport change.
	pub fn resize(cols: u16, rows: u16) -> Self {
		Self::new(kind::RESIZE).with_payload(&ResizePayload { cols, rows })
	}

	/// Inbound display bytes, as the server frames them.
	pub fn output(data: impl Into<String>) -> Self {
		Self::new(kind::OUTPUT).with_payload(&OutputPayload { data: data.into() })
	}

	/// Decodes the payload as `T`, or [`None`] when absent or mismatched.
	pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
		self.payload.as_ref().and_then(|value| T::deserialize(value).ok())
	}

	/// Display bytes of an `output` message.
	///
	/// Reads `payload.data`, falling back to the top-level `data` field.
	pub fn output_data(&self) -> Option<&str> {
		self.payload
			.as_ref()
			.and_then(|p| p.get("data"))
			.and_then(Value::as_str)
			.or(self.data.as_deref())
	}

	/// Error code, from the top level or from the payload.
	pub fn error_code(&self) -> Option<&str> {
		self.code.as_deref().or_else(|| self.payload_str("code"))
	}

	/// Human-readable error text, from the top level or from the payload.
	pub fn error_text(&self) -> Option<&str> {
		self.error.as_deref().or_else(|| self.payload_str("error"))
	}

	fn payload_str(&self, field: &str) -> Option<&str> {
		self.payload.as_ref().and_then(|p| p.get(field)).and_then(Value::as_str)
	}
}
