//! Bounded, ordered log storage.

use std::collections::VecDeque;

use lanbridge_protocol::LogEntry;

/// Ring buffer of log entries that evicts the oldest entry once full.
#[derive(Debug, Clone)]
pub struct LogBuffer {
	entries: VecDeque<LogEntry>,
	capacity: usize,
}

impl LogBuffer {
	/// Creates an empty buffer holding at most `capacity` entries (minimum 1).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			entries: VecDeque::with_capacity(capacity.min(1024)),
			capacity,
		}
	}

	/// Appends `entry`, returning the evicted entry when the buffer was full.
	pub fn push(&mut self, entry: LogEntry) -> Option<LogEntry> {
		let evicted = if self.entries.len() >= self.capacity {
			self.entries.pop_front()
		} else {
			None
		};
		self.entries.push_back(entry);
		evicted
	}

	/// Copies the current entries, oldest first.
	pub fn snapshot(&self) -> Vec<LogEntry> {
		self.entries.iter().cloned().collect()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
