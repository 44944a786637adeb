//! Notifications published by the supervisor.

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::session::SessionInfo;
use crate::status::Status;

/// Category of a runtime fault reported through [`SupervisorEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
	/// The child process could not be spawned.
	SpawnFailed,
	/// The child exited with a nonzero code or by signal while nobody asked it to stop.
	UnexpectedExit,
	/// The elevation wrapper most likely rejected the credential.
	///
	/// Inferred from the exit code alone, so `exit_code` is always populated.
	AuthenticationFailed,
}

/// Runtime failure surfaced to subscribers in addition to the status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFault {
	pub kind: FaultKind,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exit_code: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signal: Option<i32>,
}

/// Event delivered to every subscriber, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
	StatusChange { status: Status, previous: Status },
	Log { entry: LogEntry },
	Error { fault: ProcessFault },
	Connected { session: Option<SessionInfo> },
	Disconnected,
}
