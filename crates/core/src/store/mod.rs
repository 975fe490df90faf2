//! Registry of sessions with an active selection.
//!
//! Sessions are kept in creation order. Ids come from a counter that only
//! goes up while the store lives and restarts at 1 after [`SessionStore::dispose`].
//! Every bound surface gets a [`ResizeObserver`] so a container resize can
//! re-fit all visible terminals at once.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use termlink_runtime::{AuthState, ConnectionState, CredentialProvider};
use tokio::sync::broadcast;

use crate::config::{SessionConfig, StorePolicy};
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::session::{InteractiveSession, SessionContext, SessionId};
use crate::surface::Surface;

const TARGET: &str = "termlink::store";

/// Re-fits one bound surface when its container changes size.
pub struct ResizeObserver {
	surface: Weak<dyn Surface>,
}

impl ResizeObserver {
	fn observe(surface: &Arc<dyn Surface>) -> Self {
		Self {
			surface: Arc::downgrade(surface),
		}
	}

	/// Fits the surface. Returns `false` if it no longer exists.
	pub fn notify(&self) -> bool {
		match self.surface.upgrade() {
			Some(surface) => {
				surface.fit();
				true
			}
			None => false,
		}
	}
}

#[derive(Default)]
struct StoreState {
	sessions: IndexMap<SessionId, InteractiveSession>,
	active: Option<SessionId>,
	counter: u64,
	observers: HashMap<SessionId, ResizeObserver>,
}

/// Owns every session of one console.
pub struct SessionStore {
	ctx: SessionContext,
	policy: StorePolicy,
	state: Mutex<StoreState>,
}

impl SessionStore {
	pub fn new(config: SessionConfig, credentials: Arc<dyn CredentialProvider>, auth_state: Arc<dyn AuthState>) -> Self {
		let (events, _) = broadcast::channel(256);
		Self {
			ctx: SessionContext {
				config: Arc::new(config),
				credentials,
				auth_state,
				events,
			},
			policy: StorePolicy::default(),
			state: Mutex::new(StoreState::default()),
		}
	}

	pub fn with_policy(mut self, policy: StorePolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn config(&self) -> &SessionConfig {
		&self.ctx.config
	}

	/// Receives every [`SessionEvent`] from now on.
	///
	/// Slow receivers may observe [`broadcast::error::RecvError::Lagged`].
	pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.ctx.events.subscribe()
	}

	/// Creates a disconnected session and makes it active.
	///
	/// `name` defaults to `Terminal <n>`.
	pub fn create_session(&self, name: Option<&str>) -> SessionId {
		let session = {
			let mut state = self.state.lock();
			state.counter += 1;
			let id = SessionId::new(state.counter);
			let name = name.map_or_else(|| format!("Terminal {}", state.counter), str::to_string);
			let session = InteractiveSession::new(id, name, self.ctx.clone());
			state.sessions.insert(id, session.clone());
			state.active = Some(id);
			session
		};
		let id = session.id();
		let name = session.name();
		tracing::info!(target: TARGET, session = %id, name = %name, "session created");
		self.emit(SessionEvent::Created { id, name });
		self.emit(SessionEvent::ActiveChanged { id: Some(id) });
		id
	}

	/// Binds `surface` to session `id` and connects it if needed.
	pub async fn attach_surface(&self, id: SessionId, surface: Arc<dyn Surface>) -> Result<()> {
		let session = {
			let mut state = self.state.lock();
			let session = state.sessions.get(&id).cloned().ok_or(SessionError::NotFound(id))?;
			state.observers.insert(id, ResizeObserver::observe(&surface));
			session
		};
		session.initialize(surface).await;
		Ok(())
	}

	/// Unbinds the surface of session `id`. The transport stays up.
	pub fn detach_surface(&self, id: SessionId) -> Result<()> {
		let session = {
			let mut state = self.state.lock();
			state.observers.remove(&id);
			state.sessions.get(&id).cloned().ok_or(SessionError::NotFound(id))?
		};
		session.release_surface();
		Ok(())
	}

	/// Disposes session `id` and removes it.
	///
	/// When the active session closes, the first remaining session (in
	/// creation order) becomes active.
	pub fn close_session(&self, id: SessionId) -> Result<()> {
		let (session, active_changed) = {
			let mut state = self.state.lock();
			if !state.sessions.contains_key(&id) {
				return Err(SessionError::NotFound(id));
			}
			if self.policy.keep_last_session && state.sessions.len() == 1 {
				return Err(SessionError::LastSession(id));
			}
			state.observers.remove(&id);
			let session = state.sessions.shift_remove(&id).ok_or(SessionError::NotFound(id))?;
			let active_changed = state.active == Some(id);
			if active_changed {
				state.active = state.sessions.keys().next().copied();
			}
			(session, active_changed.then_some(state.active))
		};
		session.dispose();
		tracing::info!(target: TARGET, session = %id, "session closed");
		self.emit(SessionEvent::Closed { id });
		if let Some(active) = active_changed {
			self.emit(SessionEvent::ActiveChanged { id: active });
		}
		Ok(())
	}

	/// Makes `id` the active session.
	pub fn switch_active(&self, id: SessionId) -> Result<()> {
		let session = {
			let mut state = self.state.lock();
			let session = state.sessions.get(&id).cloned().ok_or(SessionError::NotFound(id))?;
			if state.active == Some(id) {
				return Ok(());
			}
			state.active = Some(id);
			session
		};
		session.focus();
		self.emit(SessionEvent::ActiveChanged { id: Some(id) });
		Ok(())
	}

	/// Disposes every session regardless of policy and resets the id counter.
	pub fn dispose(&self) {
		let sessions: Vec<InteractiveSession> = {
			let mut state = self.state.lock();
			state.observers.clear();
			state.active = None;
			state.counter = 0;
			state.sessions.drain(..).map(|(_, session)| session).collect()
		};
		for session in &sessions {
			session.dispose();
			self.emit(SessionEvent::Closed { id: session.id() });
		}
		tracing::info!(target: TARGET, closed = sessions.len(), "store disposed");
		self.emit(SessionEvent::ActiveChanged { id: None });
	}

	/// Fits every observed surface that its session still shows.
	///
	/// Observers whose surface was dropped, disposed itself, or was replaced
	/// are forgotten.
	pub fn container_resized(&self) {
		let observed: Vec<(SessionId, Weak<dyn Surface>, Option<InteractiveSession>)> = {
			let state = self.state.lock();
			state.observers.iter().map(|(id, o)| (*id, o.surface.clone(), state.sessions.get(id).cloned())).collect()
		};
		let mut gone = Vec::new();
		for (id, surface, session) in observed {
			let shown = session.is_some_and(|s| s.shows(&surface));
			if !shown || !(ResizeObserver { surface: surface.clone() }).notify() {
				gone.push((id, surface));
			}
		}
		if !gone.is_empty() {
			let mut state = self.state.lock();
			for (id, surface) in gone {
				if state.observers.get(&id).is_some_and(|o| Weak::ptr_eq(&o.surface, &surface)) {
					state.observers.remove(&id);
				}
			}
		}
	}

	pub fn session(&self, id: SessionId) -> Option<InteractiveSession> {
		self.state.lock().sessions.get(&id).cloned()
	}

	pub fn active_id(&self) -> Option<SessionId> {
		self.state.lock().active
	}

	pub fn active_session(&self) -> Option<InteractiveSession> {
		let state = self.state.lock();
		state.active.and_then(|id| state.sessions.get(&id).cloned())
	}

	/// Sessions in creation order.
	pub fn list(&self) -> Vec<InteractiveSession> {
		self.state.lock().sessions.values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.state.lock().sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state.lock().sessions.is_empty()
	}

	/// Sessions currently in [`ConnectionState::Connected`].
	pub fn connected_count(&self) -> usize {
		self.list().iter().filter(|s| s.state() == ConnectionState::Connected).count()
	}

	/// Number of live resize observers.
	pub fn observer_count(&self) -> usize {
		self.state.lock().observers.len()
	}

	fn emit(&self, event: SessionEvent) {
		let _ = self.ctx.events.send(event);
	}
}

impl Drop for SessionStore {
	fn drop(&mut self) {
		for (_, session) in self.state.get_mut().sessions.drain(..) {
			session.disconnect();
		}
	}
}

#[cfg(test)]
mod tests;
