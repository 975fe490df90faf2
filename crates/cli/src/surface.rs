//! Renders session output on stdout.

use std::io::Write;

use parking_lot::Mutex;
use termlink::{Surface, SurfaceEvents};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Writes output straight to stdout and forwards input through the bound session.
#[derive(Default)]
pub struct StdoutSurface {
	events: Mutex<Option<SurfaceEvents>>,
}

impl StdoutSurface {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sends typed bytes to the bound session. Returns `false` when unbound or offline.
	pub fn input(&self, data: &str) -> bool {
		let events = self.events.lock().clone();
		events.is_some_and(|events| events.input(data))
	}

	fn emit(data: &str) {
		let mut out = std::io::stdout().lock();
		if let Err(err) = out.write_all(data.as_bytes()).and_then(|()| out.flush()) {
			tracing::debug!(error = %err, "stdout write failed");
		}
	}
}

impl Surface for StdoutSurface {
	fn write(&self, data: &str) {
		Self::emit(data);
	}

	fn clear(&self) {
		Self::emit(CLEAR_SCREEN);
	}

	fn bind(&self, events: SurfaceEvents) {
		*self.events.lock() = Some(events);
	}

	fn dispose(&self) {
		self.events.lock().take();
	}
}
