//! Connection tuning and endpoint resolution.

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Reconnect attempts allowed after the last successful open.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Fixed delay before each reconnect attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
/// Time the server has to answer the auth message.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tuning for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
	pub max_reconnect_attempts: u32,
	pub reconnect_interval: Duration,
	pub auth_timeout: Duration,
	/// Also pass the token as a `token` query parameter on the socket URL.
	pub token_in_query: bool,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
			reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
			auth_timeout: DEFAULT_AUTH_TIMEOUT,
			token_in_query: true,
		}
	}
}

impl ConnectionConfig {
	pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
		self.max_reconnect_attempts = attempts;
		self
	}

	pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
		self.reconnect_interval = interval;
		self
	}

	pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
		self.auth_timeout = timeout;
		self
	}

	pub fn with_token_in_query(mut self, enabled: bool) -> Self {
		self.token_in_query = enabled;
		self
	}
}

/// Where the socket lives.
///
/// Built from the server's base URL (any of `http`, `https`, `ws`, `wss`)
/// and a path. HTTP schemes map to their WebSocket counterparts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	url: Url,
	path: String,
}

impl Endpoint {
	pub fn new(base: &str, path: &str) -> Result<Self> {
		let mut url = Url::parse(base).map_err(|e| Error::InvalidEndpoint(format!("{base}: {e}")))?;
		let scheme = match url.scheme() {
			"http" | "ws" => "ws",
			"https" | "wss" => "wss",
			other => return Err(Error::InvalidEndpoint(format!("unsupported scheme '{other}'"))),
		};
		url.set_scheme(scheme)
			.map_err(|()| Error::InvalidEndpoint(format!("cannot use scheme '{scheme}' for {base}")))?;
		let url = url.join(path).map_err(|e| Error::InvalidEndpoint(format!("{path}: {e}")))?;
		Ok(Self {
			url,
			path: path.to_string(),
		})
	}

	/// Path as given at construction, used in log fields.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Socket URL without credentials.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Socket URL, with `token` appended as a query parameter when given.
	pub fn socket_url(&self, token: Option<&str>) -> Url {
		let mut url = self.url.clone();
		if let Some(token) = token {
			url.query_pairs_mut().append_pair("token", token);
		}
		url
	}
}
