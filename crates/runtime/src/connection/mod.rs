//! Authenticated socket lifecycle: connect, handshake, dispatch, reconnect.
//!
//! A [`ConnectionManager`] owns at most one socket at a time. Every socket
//! is tagged with an epoch; events from a socket whose epoch is no longer
//! current (superseded by a newer `connect` or torn down by `disconnect`)
//! are ignored.
//!
//! Reconnects use a fixed interval and a bounded attempt budget that resets
//! whenever a socket opens. A close with code 1000, or any close after
//! [`ConnectionManager::disconnect`], never schedules a reconnect.
//!
//! State changes are published while the shared lock is held, so
//! [`ConnectionManager::lifecycle`] always pairs a state with the reconnect
//! activity that produced it.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use termlink_protocol::{AuthVerdict, WireMessage, close_code, kind};
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;

use crate::auth::{AuthState, CredentialProvider};
use crate::config::{ConnectionConfig, Endpoint};
use crate::error::{Error, Result};
use crate::handlers::{self, Handler, HandlerId, Subscribers};
use crate::transport::{Inbound, TransportParts, TransportReceiver, TransportSender, WebSocketTransport};

const TARGET: &str = "termlink::transport";

/// Coarse lifecycle state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ConnectionState::Disconnected => "disconnected",
			ConnectionState::Connecting => "connecting",
			ConnectionState::Connected => "connected",
		})
	}
}

/// A [`ConnectionState`] together with reconnect activity, read atomically.
///
/// `reconnecting` is `true` from the moment an abnormal close schedules a
/// reconnect until an attempt authenticates, the budget runs out, the user is
/// signed out, or an attempt is refused. `authentications` counts successful
/// handshakes over the manager's life, so a new socket is visible even when
/// watch notifications coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
	pub state: ConnectionState,
	pub reconnecting: bool,
	pub authentications: u64,
}

struct Socket {
	epoch: u64,
	sender: TransportSender,
	reader: Option<AbortHandle>,
}

impl Socket {
	fn close(self, code: u16, reason: &'static str) {
		self.sender.close(code, reason);
		if let Some(reader) = self.reader {
			reader.abort();
		}
	}
}

#[derive(Default)]
struct Shared {
	epoch: u64,
	socket: Option<Socket>,
	authenticated: bool,
	authentications: u64,
	reconnect_attempts: u32,
	intentional_disconnect: bool,
	reconnecting: bool,
	reconnect_timer: Option<AbortHandle>,
}

struct Inner {
	endpoint: Endpoint,
	config: ConnectionConfig,
	credentials: Arc<dyn CredentialProvider>,
	auth_state: Arc<dyn AuthState>,
	shared: Mutex<Shared>,
	subscribers: Mutex<Subscribers>,
	state_tx: watch::Sender<ConnectionState>,
}

/// Handle to one logical connection. Clones share the same socket.
///
/// Dropping the last handle aborts the reader task and any pending reconnect
/// timer.
#[derive(Clone)]
pub struct ConnectionManager {
	inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("endpoint", &self.inner.endpoint.url().as_str())
			.field("state", &self.state())
			.finish()
	}
}

impl ConnectionManager {
	pub fn new(endpoint: Endpoint, config: ConnectionConfig, credentials: Arc<dyn CredentialProvider>, auth_state: Arc<dyn AuthState>) -> Self {
		let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
		Self {
			inner: Arc::new(Inner {
				endpoint,
				config,
				credentials,
				auth_state,
				shared: Mutex::new(Shared::default()),
				subscribers: Mutex::new(Subscribers::default()),
				state_tx,
			}),
		}
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.inner.endpoint
	}

	/// Opens a socket and performs the auth handshake.
	///
	/// Any previous socket and pending reconnect timer are discarded first.
	/// Resolves once the server accepts the token; rejects with
	/// [`Error::MissingCredential`], [`Error::ConnectionFailed`],
	/// [`Error::AuthFailed`], [`Error::AuthTimeout`], or
	/// [`Error::ChannelClosed`] when the socket goes away or this attempt is
	/// superseded mid-flight. An auth failure leaves the socket open; callers
	/// decide whether to [`disconnect`](Self::disconnect).
	pub async fn connect(&self) -> Result<()> {
		{
			let mut shared = self.inner.shared.lock();
			shared.intentional_disconnect = false;
			shared.reconnecting = false;
		}
		self.open().await
	}

	async fn open(&self) -> Result<()> {
		let Some(token) = self.inner.credentials.token().filter(|t| !t.is_empty()) else {
			tracing::warn!(target: TARGET, path = self.inner.endpoint.path(), "no token available, not connecting");
			return Err(Error::MissingCredential);
		};

		let (epoch, previous) = {
			let mut shared = self.inner.shared.lock();
			if let Some(timer) = shared.reconnect_timer.take() {
				timer.abort();
			}
			shared.authenticated = false;
			shared.epoch += 1;
			self.inner.publish(ConnectionState::Connecting);
			(shared.epoch, shared.socket.take())
		};
		if let Some(previous) = previous {
			tracing::debug!(target: TARGET, epoch = previous.epoch, "closing superseded socket");
			previous.close(close_code::NORMAL, "Superseded");
		}

		let url = self.inner.endpoint.socket_url(self.inner.config.token_in_query.then_some(token.as_str()));
		tracing::debug!(target: TARGET, epoch, path = self.inner.endpoint.path(), "opening socket");

		let TransportParts { sender, receiver } = match WebSocketTransport::connect(&url).await {
			Ok(parts) => parts,
			Err(err) => {
				tracing::warn!(target: TARGET, epoch, error = %err, "failed to open socket");
				self.inner.handle_close(epoch, close_code::ABNORMAL);
				return Err(err);
			}
		};

		let (closed_tx, closed_rx) = oneshot::channel();
		{
			let mut shared = self.inner.shared.lock();
			if shared.epoch != epoch || shared.intentional_disconnect {
				drop(shared);
				tracing::debug!(target: TARGET, epoch, "socket opened after being superseded");
				sender.close(close_code::NORMAL, "Superseded");
				return Err(Error::ChannelClosed);
			}
			shared.reconnect_attempts = 0;
			shared.socket = Some(Socket { epoch, sender, reader: None });
		}
		tracing::info!(target: TARGET, epoch, path = self.inner.endpoint.path(), "socket opened");

		let reader = tokio::spawn(read_loop(Arc::downgrade(&self.inner), epoch, receiver, closed_tx));
		{
			let mut shared = self.inner.shared.lock();
			match shared.socket.as_mut().filter(|s| s.epoch == epoch) {
				Some(socket) => socket.reader = Some(reader.abort_handle()),
				None => reader.abort(),
			}
		}

		let username = self.authenticate(&token, closed_rx).await.inspect_err(|err| {
			tracing::warn!(target: TARGET, epoch, error = %err, "authentication failed");
		})?;

		{
			let mut shared = self.inner.shared.lock();
			if shared.epoch != epoch || shared.socket.is_none() {
				return Err(Error::ChannelClosed);
			}
			shared.authenticated = true;
			shared.authentications += 1;
			shared.reconnecting = false;
			self.inner.publish(ConnectionState::Connected);
		}
		tracing::info!(target: TARGET, epoch, user = username.as_deref().unwrap_or("-"), "authenticated");
		Ok(())
	}

	async fn authenticate(&self, token: &str, closed: oneshot::Receiver<()>) -> Result<Option<String>> {
		let (verdict_tx, verdict_rx) = oneshot::channel();
		let slot = Mutex::new(Some(verdict_tx));
		let listener = handlers::handler(move |message| {
			if let Some(verdict) = AuthVerdict::from_message(message) {
				if let Some(tx) = slot.lock().take() {
					let _ = tx.send(verdict);
				}
			}
			Ok(())
		});
		self.on(kind::AUTH, listener.clone());
		self.on(kind::ERROR, listener.clone());

		let timeout = self.inner.config.auth_timeout;
		let outcome = if self.send(&WireMessage::auth(token)) {
			tokio::select! {
				verdict = verdict_rx => match verdict {
					Ok(AuthVerdict::Accepted { username }) => Ok(username),
					Ok(AuthVerdict::Rejected { reason }) => Err(Error::AuthFailed(reason)),
					Err(_) => Err(Error::ChannelClosed),
				},
				_ = closed => Err(Error::ChannelClosed),
				_ = tokio::time::sleep(timeout) => Err(Error::AuthTimeout {
					timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
				}),
			}
		} else {
			Err(Error::ChannelClosed)
		};

		self.off(kind::AUTH, &listener);
		self.off(kind::ERROR, &listener);
		outcome
	}

	/// Serializes and queues `message`. Returns `false`, and logs, when no socket is open.
	pub fn send(&self, message: &WireMessage) -> bool {
		let text = match encode(message) {
			Ok(text) => text,
			Err(err) => {
				tracing::error!(target: TARGET, kind = %message.kind, error = %err, "failed to encode message");
				return false;
			}
		};
		let shared = self.inner.shared.lock();
		match shared.socket.as_ref() {
			Some(socket) if socket.sender.send_text(text) => true,
			_ => {
				tracing::warn!(target: TARGET, kind = %message.kind, "socket not open, dropping message");
				false
			}
		}
	}

	/// Registers `handler` for messages of `kind`.
	///
	/// Registering the same handler twice for a kind has no effect and
	/// returns the original id.
	pub fn on(&self, kind: &str, handler: Handler) -> HandlerId {
		self.inner.subscribers.lock().insert(kind, handler)
	}

	/// Removes `handler` from `kind`. Returns `false` if it was not registered.
	pub fn off(&self, kind: &str, handler: &Handler) -> bool {
		self.inner.subscribers.lock().remove(kind, handler)
	}

	/// Number of handlers registered for `kind`.
	pub fn handler_count(&self, kind: &str) -> usize {
		self.inner.subscribers.lock().count(kind)
	}

	/// Closes the socket with code 1000 and clears all handlers.
	///
	/// Cancels any pending reconnect and suppresses automatic reconnects
	/// until the next [`connect`](Self::connect). Safe to call repeatedly.
	pub fn disconnect(&self) {
		let socket = {
			let mut shared = self.inner.shared.lock();
			shared.intentional_disconnect = true;
			if let Some(timer) = shared.reconnect_timer.take() {
				timer.abort();
			}
			shared.reconnecting = false;
			shared.authenticated = false;
			shared.epoch += 1;
			self.inner.publish(ConnectionState::Disconnected);
			shared.socket.take()
		};
		if let Some(socket) = socket {
			tracing::info!(target: TARGET, epoch = socket.epoch, "closing socket");
			socket.close(close_code::NORMAL, "Normal closure");
		}
		self.inner.subscribers.lock().clear();
	}

	/// `true` while a socket is open, authenticated or not.
	pub fn is_connected(&self) -> bool {
		self.inner.shared.lock().socket.as_ref().is_some_and(|s| s.sender.is_open())
	}

	pub fn is_authenticated(&self) -> bool {
		self.inner.shared.lock().authenticated
	}

	/// Attempts scheduled since the last successful open.
	pub fn reconnect_attempts(&self) -> u32 {
		self.inner.shared.lock().reconnect_attempts
	}

	pub fn has_pending_reconnect(&self) -> bool {
		self.inner.shared.lock().reconnect_timer.is_some()
	}

	/// `true` while a reconnect is scheduled or its attempt is in flight.
	pub fn is_reconnecting(&self) -> bool {
		self.inner.shared.lock().reconnecting
	}

	pub fn state(&self) -> ConnectionState {
		*self.inner.state_tx.borrow()
	}

	/// Current state and reconnect activity, consistent with each other.
	pub fn lifecycle(&self) -> Lifecycle {
		let shared = self.inner.shared.lock();
		Lifecycle {
			state: *self.inner.state_tx.borrow(),
			reconnecting: shared.reconnecting,
			authentications: shared.authentications,
		}
	}

	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.inner.state_tx.subscribe()
	}

	/// `true` if both handles refer to the same connection.
	pub fn same_connection(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	#[cfg(test)]
	pub(crate) fn simulate_close(&self, code: u16) {
		let epoch = self.inner.shared.lock().epoch;
		self.inner.handle_close(epoch, code);
	}
}

impl Inner {
	fn publish(&self, state: ConnectionState) {
		let previous = self.state_tx.send_replace(state);
		if previous != state {
			tracing::debug!(target: TARGET, from = %previous, to = %state, "state changed");
		}
	}

	fn is_current(&self, epoch: u64) -> bool {
		self.shared.lock().epoch == epoch
	}

	/// Decodes one inbound frame and fans it out to the handlers for its kind.
	fn dispatch(&self, text: &str) {
		let message = match decode(text) {
			Ok(message) => message,
			Err(err) => {
				tracing::warn!(target: TARGET, error = %err, "failed to decode inbound message");
				return;
			}
		};
		if message.kind == kind::ERROR {
			tracing::error!(
				target: TARGET,
				code = message.error_code().unwrap_or("-"),
				error = message.error_text().unwrap_or("-"),
				"server reported an error"
			);
		}
		let handlers = self.subscribers.lock().snapshot(&message.kind);
		for (id, handler) in &handlers {
			handlers::invoke(*id, handler, &message);
		}
	}

	fn handle_close(self: &Arc<Self>, epoch: u64, code: u16) {
		let mut shared = self.shared.lock();
		if shared.epoch != epoch {
			tracing::debug!(target: TARGET, epoch, code, "ignoring close from stale socket");
			return;
		}
		shared.socket = None;
		shared.authenticated = false;
		tracing::info!(target: TARGET, epoch, code, "socket closed");
		if code != close_code::NORMAL && !shared.intentional_disconnect {
			self.schedule_reconnect(&mut shared);
		} else {
			shared.reconnecting = false;
		}
		self.publish(ConnectionState::Disconnected);
	}

	fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) {
		if let Some(timer) = shared.reconnect_timer.take() {
			timer.abort();
		}
		if shared.reconnect_attempts >= self.config.max_reconnect_attempts {
			tracing::warn!(target: TARGET, attempts = shared.reconnect_attempts, "max reconnect attempts reached");
			shared.reconnecting = false;
			return;
		}
		shared.reconnect_attempts += 1;
		shared.reconnecting = true;
		let attempt = shared.reconnect_attempts;
		let delay = self.config.reconnect_interval;
		tracing::info!(
			target: TARGET,
			attempt,
			max = self.config.max_reconnect_attempts,
			delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
			"scheduling reconnect"
		);

		let weak = Arc::downgrade(self);
		let timer = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let Some(inner) = weak.upgrade() else {
				return;
			};
			let stay = inner.auth_state.should_stay_connected();
			{
				let mut shared = inner.shared.lock();
				shared.reconnect_timer = None;
				if !stay {
					shared.reconnecting = false;
					inner.publish(ConnectionState::Disconnected);
				}
			}
			if !stay {
				tracing::debug!(target: TARGET, attempt, "user no longer signed in, skipping reconnect");
				return;
			}
			let manager = ConnectionManager { inner };
			if let Err(err) = manager.open().await {
				tracing::warn!(target: TARGET, attempt, error = %err, "reconnect attempt failed");
				if matches!(err, Error::MissingCredential | Error::AuthFailed(_) | Error::AuthTimeout { .. }) {
					manager.inner.abandon_reconnect();
				}
			}
		});
		shared.reconnect_timer = Some(timer.abort_handle());
	}

	/// Ends a reconnect whose attempt was refused without its socket closing.
	fn abandon_reconnect(&self) {
		let mut shared = self.shared.lock();
		if !shared.reconnecting || shared.reconnect_timer.is_some() {
			return;
		}
		shared.reconnecting = false;
		shared.authenticated = false;
		shared.epoch += 1;
		if let Some(socket) = shared.socket.take() {
			socket.close(close_code::NORMAL, "Authentication failed");
		}
		tracing::info!(target: TARGET, "giving up on reconnecting");
		self.publish(ConnectionState::Disconnected);
	}
}

impl Drop for Inner {
	fn drop(&mut self) {
		let shared = self.shared.get_mut();
		if let Some(timer) = shared.reconnect_timer.take() {
			timer.abort();
		}
		if let Some(socket) = shared.socket.take() {
			socket.close(close_code::NORMAL, "Normal closure");
		}
	}
}

fn encode(message: &WireMessage) -> Result<String> {
	Ok(serde_json::to_string(message)?)
}

fn decode(text: &str) -> Result<WireMessage> {
	Ok(serde_json::from_str(text)?)
}

async fn read_loop(inner: Weak<Inner>, epoch: u64, mut receiver: TransportReceiver, closed: oneshot::Sender<()>) {
	let mut closed = Some(closed);
	loop {
		let event = receiver.recv().await;
		let Some(inner) = inner.upgrade() else {
			return;
		};
		match event {
			Inbound::Text(text) => {
				if !inner.is_current(epoch) {
					return;
				}
				inner.dispatch(&text);
			}
			Inbound::Closed(code) => {
				if let Some(closed) = closed.take() {
					let _ = closed.send(());
				}
				inner.handle_close(epoch, code);
				return;
			}
		}
	}
}
