//! Supervisor lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised mesh process.
///
/// Exactly one value is authoritative at any instant; the runtime crate owns
/// the transitions between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	#[default]
	Idle,
	Starting,
	Running,
	Stopping,
	Stopped,
	Error,
}

impl Status {
	/// Every status value, in lifecycle order.
	pub const ALL: [Status; 6] = [
		Status::Idle,
		Status::Starting,
		Status::Running,
		Status::Stopping,
		Status::Stopped,
		Status::Error,
	];

	/// Returns `true` while a process is being started, is running, or is being stopped.
	///
	/// A new session may only be created or joined when this is `false`.
	pub fn is_busy(self) -> bool {
		matches!(self, Status::Starting | Status::Running | Status::Stopping)
	}

	/// Returns `true` when a disconnect request has nothing to do.
	pub fn is_disconnected(self) -> bool {
		matches!(self, Status::Idle | Status::Stopped)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Status::Idle => "idle",
			Status::Starting => "starting",
			Status::Running => "running",
			Status::Stopping => "stopping",
			Status::Stopped => "stopped",
			Status::Error => "error",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
