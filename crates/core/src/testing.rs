//! Recording surface and context helpers for unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use termlink_runtime::Endpoint;
use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::session::SessionContext;
use crate::surface::{Surface, SurfaceEvents};

#[derive(Default)]
pub(crate) struct RecordingSurface {
	pub(crate) written: Mutex<Vec<String>>,
	pub(crate) events: Mutex<Option<SurfaceEvents>>,
	pub(crate) clears: Mutex<usize>,
	pub(crate) fits: Mutex<usize>,
	pub(crate) focused: Mutex<usize>,
	pub(crate) disposed: Mutex<bool>,
}

impl RecordingSurface {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn written(&self) -> Vec<String> {
		self.written.lock().clone()
	}

	pub(crate) fn events(&self) -> SurfaceEvents {
		self.events.lock().clone().expect("surface was bound")
	}
}

impl Surface for RecordingSurface {
	fn write(&self, data: &str) {
		self.written.lock().push(data.to_string());
	}

	fn clear(&self) {
		*self.clears.lock() += 1;
		self.written.lock().clear();
	}

	fn bind(&self, events: SurfaceEvents) {
		*self.events.lock() = Some(events);
	}

	fn focus(&self) {
		*self.focused.lock() += 1;
	}

	fn fit(&self) {
		*self.fits.lock() += 1;
	}

	fn dispose(&self) {
		*self.disposed.lock() = true;
	}
}

/// Context whose credential provider never yields a token, so connects fail fast.
pub(crate) fn offline_context() -> (SessionContext, broadcast::Receiver<crate::SessionEvent>) {
	let endpoint = Endpoint::new("http://127.0.0.1:9", crate::config::TERMINAL_PATH).expect("valid endpoint");
	let (events, rx) = broadcast::channel(256);
	let ctx = SessionContext {
		config: Arc::new(SessionConfig::new(endpoint).with_scrollback_limit(3)),
		credentials: Arc::new(|| None::<String>),
		auth_state: Arc::new(termlink_runtime::AlwaysConnected),
		events,
	};
	(ctx, rx)
}
