//! The rendering side of a session.
//!
//! A [`Surface`] displays output and produces input. Sessions hold surfaces
//! weakly; the owner of the surface decides its lifetime. When a session
//! binds a surface it hands over a [`SurfaceEvents`] that the surface uses to
//! report keystrokes, size changes, and its own disposal. Rebinding or
//! detaching turns the old handle inert.

use std::sync::Weak;

use crate::session::SessionInner;

/// A terminal emulator view.
///
/// `write` and `clear` are called while the session's state is locked, so
/// implementations must not call back into the session from them.
pub trait Surface: Send + Sync {
	/// Renders a chunk of output.
	fn write(&self, data: &str);

	/// Erases everything displayed.
	fn clear(&self);

	/// Receives the event handle for the session that just bound this surface.
	fn bind(&self, events: SurfaceEvents);

	/// Moves keyboard focus to this surface.
	fn focus(&self) {}

	/// Recomputes geometry from the container and reports it via
	/// [`SurfaceEvents::resize`] when it changed.
	fn fit(&self) {}

	/// The session that owned this surface has been closed.
	fn dispose(&self) {}
}

/// Handle a surface uses to talk back to the session that bound it.
#[derive(Clone)]
pub struct SurfaceEvents {
	pub(crate) session: Weak<SessionInner>,
	pub(crate) binding: u64,
}

impl SurfaceEvents {
	fn session(&self) -> Option<crate::InteractiveSession> {
		let inner = self.session.upgrade()?;
		let session = crate::InteractiveSession::from_inner(inner);
		session.is_bound_to(self.binding).then_some(session)
	}

	/// Forwards typed bytes. Dropped unless the session is connected.
	pub fn input(&self, data: &str) -> bool {
		self.session().is_some_and(|s| s.send_input(data))
	}

	/// Reports a new viewport size.
	pub fn resize(&self, cols: u16, rows: u16) {
		if let Some(session) = self.session() {
			session.resize(cols, rows);
		}
	}

	/// The surface went away; the session releases its binding.
	pub fn disposed(&self) {
		if let Some(session) = self.session() {
			session.release_surface();
		}
	}

	/// `false` once the session rebinds, detaches, or is dropped.
	pub fn is_bound(&self) -> bool {
		self.session().is_some()
	}
}
