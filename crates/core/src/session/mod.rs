//! One interactive shell: a transport, an optional surface, and scrollback.
//!
//! The session owns its [`ConnectionManager`] exclusively. A transport is
//! present exactly while the state is not [`ConnectionState::Disconnected`].
//! Output is always appended to scrollback; when a surface is bound it is
//! also rendered. Binding a new surface replays the scrollback into it
//! before live output resumes.
//!
//! Once connected, a background task follows the transport's lifecycle: a
//! scheduled or running reconnect shows as [`ConnectionState::Connecting`],
//! a successful one returns the session to `Connected` and re-sends
//! `subscribe`, and when the transport stops reconnecting the session drops
//! it and becomes `Disconnected`.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use termlink_protocol::{WireMessage, kind};
use termlink_runtime::{AuthState, ConnectionManager, ConnectionState, CredentialProvider, Error, Lifecycle, handler};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::scrollback::Scrollback;
use crate::surface::{Surface, SurfaceEvents};

const TARGET: &str = "termlink::session";

/// Store-assigned session identifier, displayed as `session-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
	pub fn new(n: u64) -> Self {
		Self(n)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "session-{}", self.0)
	}
}

/// Dependencies every session of a store shares.
#[derive(Clone)]
pub(crate) struct SessionContext {
	pub(crate) config: Arc<SessionConfig>,
	pub(crate) credentials: Arc<dyn CredentialProvider>,
	pub(crate) auth_state: Arc<dyn AuthState>,
	pub(crate) events: broadcast::Sender<SessionEvent>,
}

struct SessionState {
	name: String,
	state: ConnectionState,
	scrollback: Scrollback,
	cols: u16,
	rows: u16,
	created_at: SystemTime,
	last_active_at: SystemTime,
	transport: Option<ConnectionManager>,
	watcher: Option<AbortHandle>,
	subscribed_on: u64,
	surface: Option<Weak<dyn Surface>>,
	binding: u64,
}

impl SessionState {
	fn surface(&self) -> Option<Arc<dyn Surface>> {
		self.surface.as_ref().and_then(Weak::upgrade)
	}

	fn owns(&self, transport: &ConnectionManager) -> bool {
		self.transport.as_ref().is_some_and(|t| t.same_connection(transport))
	}
}

pub(crate) struct SessionInner {
	id: SessionId,
	ctx: SessionContext,
	state: Mutex<SessionState>,
}

impl Drop for SessionInner {
	fn drop(&mut self) {
		if let Some(watcher) = self.state.get_mut().watcher.take() {
			watcher.abort();
		}
	}
}

/// Handle to a session. Clones refer to the same session.
#[derive(Clone)]
pub struct InteractiveSession {
	inner: Arc<SessionInner>,
}

impl fmt::Debug for InteractiveSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("InteractiveSession")
			.field("id", &self.inner.id)
			.field("name", &state.name)
			.field("state", &state.state)
			.finish()
	}
}

impl InteractiveSession {
	pub(crate) fn new(id: SessionId, name: String, ctx: SessionContext) -> Self {
		let now = SystemTime::now();
		let state = SessionState {
			name,
			state: ConnectionState::Disconnected,
			scrollback: Scrollback::new(ctx.config.scrollback_limit),
			cols: ctx.config.cols,
			rows: ctx.config.rows,
			created_at: now,
			last_active_at: now,
			transport: None,
			watcher: None,
			subscribed_on: 0,
			surface: None,
			binding: 0,
		};
		Self {
			inner: Arc::new(SessionInner {
				id,
				ctx,
				state: Mutex::new(state),
			}),
		}
	}

	pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
		Self { inner }
	}

	pub fn id(&self) -> SessionId {
		self.inner.id
	}

	pub fn name(&self) -> String {
		self.inner.state.lock().name.clone()
	}

	pub fn state(&self) -> ConnectionState {
		self.inner.state.lock().state
	}

	pub fn is_connected(&self) -> bool {
		self.state() == ConnectionState::Connected
	}

	/// Current viewport as `(cols, rows)`.
	pub fn geometry(&self) -> (u16, u16) {
		let state = self.inner.state.lock();
		(state.cols, state.rows)
	}

	pub fn created_at(&self) -> SystemTime {
		self.inner.state.lock().created_at
	}

	pub fn last_active_at(&self) -> SystemTime {
		self.inner.state.lock().last_active_at
	}

	/// Buffered output chunks in arrival order.
	pub fn scrollback(&self) -> Vec<String> {
		self.inner.state.lock().scrollback.to_vec()
	}

	/// `true` while a live surface is bound.
	pub fn has_surface(&self) -> bool {
		self.inner.state.lock().surface().is_some()
	}

	/// Binds `surface`, replays scrollback into it, and connects if disconnected.
	///
	/// Rebinding the surface that is already bound keeps the existing binding
	/// and skips the replay.
	pub async fn initialize(&self, surface: Arc<dyn Surface>) {
		let events = {
			let mut state = self.inner.state.lock();
			let already_bound = state.surface().is_some_and(|current| Arc::ptr_eq(&current, &surface));
			if already_bound {
				None
			} else {
				state.binding += 1;
				state.surface = Some(Arc::downgrade(&surface));
				for chunk in state.scrollback.iter() {
					surface.write(chunk);
				}
				tracing::debug!(target: TARGET, session = %self.inner.id, replayed = state.scrollback.len(), "surface bound");
				Some(SurfaceEvents {
					session: Arc::downgrade(&self.inner),
					binding: state.binding,
				})
			}
		};
		if let Some(events) = events {
			surface.bind(events);
		}

		if self.state() == ConnectionState::Disconnected {
			self.connect().await;
		}
	}

	/// Opens a fresh transport, authenticates, and sends `subscribe`.
	///
	/// Does nothing while a transport already exists. Failures are logged and
	/// leave the session disconnected with no transport.
	pub async fn connect(&self) {
		if let Err(err) = self.try_connect().await {
			tracing::warn!(target: TARGET, session = %self.inner.id, error = %err, "session failed to connect");
		}
	}

	/// Like [`connect`](Self::connect), but returns the transport error.
	pub async fn try_connect(&self) -> Result<()> {
		let ctx = &self.inner.ctx;
		let transport = {
			let mut state = self.inner.state.lock();
			if state.transport.is_some() {
				tracing::debug!(target: TARGET, session = %self.inner.id, state = %state.state, "connect ignored, transport already present");
				return Ok(());
			}
			let transport = ConnectionManager::new(
				ctx.config.endpoint.clone(),
				ctx.config.connection.clone(),
				Arc::clone(&ctx.credentials),
				Arc::clone(&ctx.auth_state),
			);
			state.transport = Some(transport.clone());
			state.state = ConnectionState::Connecting;
			transport
		};
		self.emit(SessionEvent::StateChanged {
			id: self.inner.id,
			state: ConnectionState::Connecting,
		});

		let weak = Arc::downgrade(&self.inner);
		transport.on(kind::OUTPUT, handler(move |message| {
			if let Some(inner) = weak.upgrade() {
				InteractiveSession::from_inner(inner).append_output(message);
			}
			Ok(())
		}));
		let weak = Arc::downgrade(&self.inner);
		transport.on(kind::ERROR, handler(move |message| {
			if let Some(inner) = weak.upgrade() {
				let session = InteractiveSession::from_inner(inner);
				tracing::error!(
					target: TARGET,
					session = %session.id(),
					code = message.error_code().unwrap_or("-"),
					error = message.error_text().unwrap_or("-"),
					"terminal error, disconnecting"
				);
				session.disconnect();
			}
			Ok(())
		}));

		match transport.connect().await {
			Ok(()) => {
				{
					let mut state = self.inner.state.lock();
					if !state.owns(&transport) {
						tracing::debug!(target: TARGET, session = %self.inner.id, "connect superseded");
						return Err(Error::ChannelClosed.into());
					}
					transport.send(&WireMessage::subscribe(state.cols, state.rows, ctx.config.shell.as_str()));
					state.subscribed_on = transport.lifecycle().authentications;
					state.state = ConnectionState::Connected;
					state.last_active_at = SystemTime::now();
					state.watcher = Some(self.follow(&transport));
				}
				tracing::info!(target: TARGET, session = %self.inner.id, shell = %ctx.config.shell, "session connected");
				self.emit(SessionEvent::StateChanged {
					id: self.inner.id,
					state: ConnectionState::Connected,
				});
				Ok(())
			}
			Err(err) => {
				transport.disconnect();
				let changed = {
					let mut state = self.inner.state.lock();
					if state.owns(&transport) {
						state.transport = None;
						state.state = ConnectionState::Disconnected;
						true
					} else {
						false
					}
				};
				if changed {
					self.emit(SessionEvent::StateChanged {
						id: self.inner.id,
						state: ConnectionState::Disconnected,
					});
				}
				Err(err.into())
			}
		}
	}

	/// Spawns the task that mirrors `transport`'s lifecycle into this session.
	fn follow(&self, transport: &ConnectionManager) -> AbortHandle {
		let mut changes = transport.watch_state();
		changes.mark_changed();
		let transport = transport.clone();
		let session = Arc::downgrade(&self.inner);
		tokio::spawn(async move {
			while changes.changed().await.is_ok() {
				let Some(inner) = session.upgrade() else {
					return;
				};
				if !InteractiveSession::from_inner(inner).sync_with(&transport) {
					return;
				}
			}
		})
		.abort_handle()
	}

	/// Applies the transport's current lifecycle. Returns `false` once the
	/// session no longer holds `transport`.
	///
	/// Every socket the transport authenticates on its own gets a fresh
	/// `subscribe`, so the server starts a shell for it.
	fn sync_with(&self, transport: &ConnectionManager) -> bool {
		let lifecycle = transport.lifecycle();
		let next = match lifecycle {
			Lifecycle {
				state: ConnectionState::Connected,
				..
			} => ConnectionState::Connected,
			Lifecycle {
				state: ConnectionState::Connecting,
				..
			}
			| Lifecycle { reconnecting: true, .. } => ConnectionState::Connecting,
			Lifecycle { .. } => ConnectionState::Disconnected,
		};
		let (previous, released) = {
			let mut state = self.inner.state.lock();
			if !state.owns(transport) {
				return false;
			}
			if next == ConnectionState::Connected && state.subscribed_on != lifecycle.authentications {
				transport.send(&WireMessage::subscribe(state.cols, state.rows, self.inner.ctx.config.shell.as_str()));
				state.subscribed_on = lifecycle.authentications;
				state.last_active_at = SystemTime::now();
				tracing::debug!(target: TARGET, session = %self.inner.id, "resubscribed after reconnect");
			}
			let previous = std::mem::replace(&mut state.state, next);
			let released = if next == ConnectionState::Disconnected {
				state.watcher = None;
				state.transport.take()
			} else {
				None
			};
			(previous, released)
		};
		let keep_following = released.is_none();
		if let Some(transport) = released {
			transport.disconnect();
		}
		if previous != next {
			tracing::info!(target: TARGET, session = %self.inner.id, state = %next, "transport state changed");
			self.emit(SessionEvent::StateChanged { id: self.inner.id, state: next });
		}
		keep_following
	}

	/// Tears down the transport. Safe to call repeatedly.
	pub fn disconnect(&self) {
		let (transport, was) = {
			let mut state = self.inner.state.lock();
			let was = state.state;
			state.state = ConnectionState::Disconnected;
			if let Some(watcher) = state.watcher.take() {
				watcher.abort();
			}
			(state.transport.take(), was)
		};
		if let Some(transport) = transport {
			transport.disconnect();
		}
		if was != ConnectionState::Disconnected {
			tracing::info!(target: TARGET, session = %self.inner.id, "session disconnected");
			self.emit(SessionEvent::StateChanged {
				id: self.inner.id,
				state: ConnectionState::Disconnected,
			});
		}
	}

	/// Drops the transport and opens a new one.
	pub async fn reconnect(&self) {
		self.disconnect();
		self.connect().await;
	}

	/// Sends typed bytes. Returns `false` unless connected.
	pub fn send_input(&self, data: &str) -> bool {
		let mut state = self.inner.state.lock();
		if state.state != ConnectionState::Connected {
			return false;
		}
		let Some(transport) = state.transport.as_ref() else {
			return false;
		};
		let sent = transport.send(&WireMessage::input(data));
		if sent {
			state.last_active_at = SystemTime::now();
		}
		sent
	}

	/// Records a new viewport and tells the server when connected.
	pub fn resize(&self, cols: u16, rows: u16) {
		let (cols, rows) = (cols.max(1), rows.max(1));
		{
			let mut state = self.inner.state.lock();
			if (state.cols, state.rows) == (cols, rows) {
				return;
			}
			state.cols = cols;
			state.rows = rows;
			if state.state == ConnectionState::Connected {
				if let Some(transport) = state.transport.as_ref() {
					transport.send(&WireMessage::resize(cols, rows));
				}
			}
		}
		tracing::debug!(target: TARGET, session = %self.inner.id, cols, rows, "resized");
		self.emit(SessionEvent::Resized {
			id: self.inner.id,
			cols,
			rows,
		});
	}

	/// Erases the surface and the scrollback.
	pub fn clear(&self) {
		{
			let mut state = self.inner.state.lock();
			if let Some(surface) = state.surface() {
				surface.clear();
			}
			state.scrollback.clear();
		}
		self.emit(SessionEvent::Cleared { id: self.inner.id });
	}

	pub fn rename(&self, name: impl Into<String>) {
		let name = name.into();
		self.inner.state.lock().name = name.clone();
		self.emit(SessionEvent::Renamed { id: self.inner.id, name });
	}

	/// Focuses the bound surface and marks the session active.
	pub fn focus(&self) {
		let surface = {
			let mut state = self.inner.state.lock();
			state.last_active_at = SystemTime::now();
			state.surface()
		};
		if let Some(surface) = surface {
			surface.focus();
		}
	}

	/// Asks the bound surface to recompute its geometry.
	pub fn fit(&self) {
		let surface = self.inner.state.lock().surface();
		if let Some(surface) = surface {
			surface.fit();
		}
	}

	/// Releases the current surface binding without touching the transport.
	pub fn release_surface(&self) {
		let mut state = self.inner.state.lock();
		if state.surface.take().is_some() {
			state.binding += 1;
			tracing::debug!(target: TARGET, session = %self.inner.id, "surface released");
		}
	}

	/// Disconnects, releases the surface, and tells it the session is gone.
	pub fn dispose(&self) {
		self.disconnect();
		let surface = {
			let mut state = self.inner.state.lock();
			state.binding += 1;
			state.surface.take().and_then(|weak| weak.upgrade())
		};
		if let Some(surface) = surface {
			surface.dispose();
		}
		tracing::debug!(target: TARGET, session = %self.inner.id, "session disposed");
	}

	/// `true` if `surface` is the one currently bound.
	pub(crate) fn shows(&self, surface: &Weak<dyn Surface>) -> bool {
		let state = self.inner.state.lock();
		state.surface.as_ref().is_some_and(|bound| Weak::ptr_eq(bound, surface) && bound.strong_count() > 0)
	}

	pub(crate) fn is_bound_to(&self, binding: u64) -> bool {
		let state = self.inner.state.lock();
		state.binding == binding && state.surface.is_some()
	}

	fn append_output(&self, message: &WireMessage) {
		let Some(data) = message.output_data() else {
			tracing::debug!(target: TARGET, session = %self.inner.id, "output message without data");
			return;
		};
		let mut state = self.inner.state.lock();
		if let Some(surface) = state.surface() {
			surface.write(data);
		}
		state.scrollback.push(data);
	}

	fn emit(&self, event: SessionEvent) {
		// no subscribers is fine
		let _ = self.inner.ctx.events.send(event);
	}
}

#[cfg(test)]
mod tests;
