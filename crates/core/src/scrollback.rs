//! Bounded FIFO of output chunks.

use std::collections::VecDeque;

/// Keeps the most recent `limit` output chunks, evicting the oldest first.
#[derive(Debug, Clone, Default)]
pub struct Scrollback {
	chunks: VecDeque<String>,
	limit: usize,
}

impl Scrollback {
	pub fn new(limit: usize) -> Self {
		Self {
			chunks: VecDeque::with_capacity(limit.min(1024)),
			limit,
		}
	}

	pub fn push(&mut self, chunk: impl Into<String>) {
		if self.limit == 0 {
			return;
		}
		if self.chunks.len() == self.limit {
			self.chunks.pop_front();
		}
		self.chunks.push_back(chunk.into());
	}

	/// Chunks in append order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.chunks.iter().map(String::as_str)
	}

	pub fn to_vec(&self) -> Vec<String> {
		self.chunks.iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn limit(&self) -> usize {
		self.limit
	}

	pub fn clear(&mut self) {
		self.chunks.clear();
	}
}
