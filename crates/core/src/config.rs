//! Session defaults and store policy.

use termlink_runtime::{ConnectionConfig, Endpoint};

/// Path of the terminal socket on the console server.
pub const TERMINAL_PATH: &str = "/ws/terminal";
pub const DEFAULT_SHELL: &str = "/bin/bash";
/// Output chunks kept per session for replay.
pub const DEFAULT_SCROLLBACK_LIMIT: usize = 1000;
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Settings shared by every session a store creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
	pub endpoint: Endpoint,
	/// Shell the server starts on `subscribe`.
	pub shell: String,
	pub scrollback_limit: usize,
	pub cols: u16,
	pub rows: u16,
	pub connection: ConnectionConfig,
}

impl SessionConfig {
	pub fn new(endpoint: Endpoint) -> Self {
		Self {
			endpoint,
			shell: DEFAULT_SHELL.to_string(),
			scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
			cols: DEFAULT_COLS,
			rows: DEFAULT_ROWS,
			connection: ConnectionConfig::default(),
		}
	}

	pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
		self.shell = shell.into();
		self
	}

	pub fn with_scrollback_limit(mut self, limit: usize) -> Self {
		self.scrollback_limit = limit;
		self
	}

	/// Initial geometry, clamped to at least one cell each way.
	pub fn with_geometry(mut self, cols: u16, rows: u16) -> Self {
		self.cols = cols.max(1);
		self.rows = rows.max(1);
		self
	}

	pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
		self.connection = connection;
		self
	}
}

/// Rules the store applies when closing sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
	/// Refuse to close the only remaining session.
	pub keep_last_session: bool,
}

impl Default for StorePolicy {
	fn default() -> Self {
		Self { keep_last_session: true }
	}
}
