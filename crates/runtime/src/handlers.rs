//! Per-kind message handler registry.
//!
//! Handlers live in an [`IndexMap`] keyed by [`HandlerId`], one map per
//! message kind, so dispatch follows registration order and removal is O(1).

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use termlink_protocol::WireMessage;

use crate::error::Result;

/// Unique identifier for registered handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Handler function invoked synchronously for each matching inbound message.
///
/// Identity is the [`Arc`] allocation: registering the same `Arc` twice for a
/// kind is a no-op, and [`off`](crate::ConnectionManager::off) removes by
/// pointer.
pub type Handler = Arc<dyn Fn(&WireMessage) -> Result<()> + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
	F: Fn(&WireMessage) -> Result<()> + Send + Sync + 'static,
{
	Arc::new(f)
}

#[derive(Default)]
pub(crate) struct Subscribers {
	by_kind: HashMap<String, IndexMap<HandlerId, Handler>>,
}

impl Subscribers {
	/// Adds `handler` under `kind`, returning the existing id if it is already registered.
	pub(crate) fn insert(&mut self, kind: &str, handler: Handler) -> HandlerId {
		let set = self.by_kind.entry(kind.to_string()).or_default();
		if let Some((id, _)) = set.iter().find(|(_, h)| Arc::ptr_eq(h, &handler)) {
			return *id;
		}
		let id = next_handler_id();
		set.insert(id, handler);
		id
	}

	pub(crate) fn remove(&mut self, kind: &str, handler: &Handler) -> bool {
		let Some(set) = self.by_kind.get_mut(kind) else {
			return false;
		};
		let Some(id) = set.iter().find(|(_, h)| Arc::ptr_eq(h, handler)).map(|(id, _)| *id) else {
			return false;
		};
		set.shift_remove(&id);
		if set.is_empty() {
			self.by_kind.remove(kind);
		}
		true
	}

	/// Handlers for `kind` in registration order.
	pub(crate) fn snapshot(&self, kind: &str) -> Vec<(HandlerId, Handler)> {
		self.by_kind
			.get(kind)
			.map(|set| set.iter().map(|(id, h)| (*id, Arc::clone(h))).collect())
			.unwrap_or_default()
	}

	pub(crate) fn count(&self, kind: &str) -> usize {
		self.by_kind.get(kind).map_or(0, IndexMap::len)
	}

	pub(crate) fn clear(&mut self) {
		self.by_kind.clear();
	}
}

/// Runs one handler, containing both errors and panics.
pub(crate) fn invoke(id: HandlerId, handler: &Handler, message: &WireMessage) {
	match catch_unwind(AssertUnwindSafe(|| handler(message))) {
		Ok(Ok(())) => {}
		Ok(Err(err)) => {
			tracing::warn!(target: "termlink::transport", handler = id, kind = %message.kind, error = %err, "message handler failed");
		}
		Err(_) => {
			tracing::error!(target: "termlink::transport", handler = id, kind = %message.kind, "message handler panicked");
		}
	}
}
