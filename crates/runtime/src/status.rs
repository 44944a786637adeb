//! Six-state lifecycle with guarded transitions.

use lanbridge_protocol::Status;

use crate::error::{Error, Result};

/// A committed transition, reported to subscribers as `(status, previous)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
	pub status: Status,
	pub previous: Status,
}

/// Holds the single authoritative [`Status`] value.
#[derive(Debug, Default)]
pub struct StatusMachine {
	current: Status,
}

impl StatusMachine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn current(&self) -> Status {
		self.current
	}

	/// Returns whether the lifecycle permits moving from `from` to `to`.
	///
	/// Same-state moves are always allowed and are reported as no change.
	pub fn allows(from: Status, to: Status) -> bool {
		use Status::*;

		if from == to || to == Idle {
			return true;
		}
		matches!(
			(from, to),
			(Idle | Stopped | Error, Starting)
				| (Starting, Running | Error | Stopping | Stopped)
				| (Running, Stopping | Error | Stopped)
				| (Stopping, Stopped | Error)
				| (Error, Stopping)
		)
	}

	/// Moves to `next`, returning the change when the value actually changed.
	///
	/// A disallowed move leaves the current value untouched and returns `None`;
	/// the supervisor only requests moves it has already checked.
	pub fn transition(&mut self, next: Status) -> Option<StatusChange> {
		if self.current == next || !Self::allows(self.current, next) {
			return None;
		}
		let previous = self.current;
		self.current = next;
		Some(StatusChange { status: next, previous })
	}

	/// Admission check for starting a new session.
	pub fn admit(&self, action: &'static str) -> Result<()> {
		if self.current.is_busy() {
			return Err(Error::InvalidState {
				action,
				status: self.current,
			});
		}
		Ok(())
	}
}
