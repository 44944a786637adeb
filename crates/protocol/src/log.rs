//! Log entries recorded for supervisor and child-process output.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Warn,
	Error,
	Debug,
}

/// Where a [`LogEntry`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
	/// A line the child printed on standard output.
	Stdout,
	/// A line the child printed on standard error.
	Stderr,
	/// A message produced by the supervisor itself.
	System,
}

/// Immutable, timestamped log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
	/// Milliseconds since the Unix epoch.
	pub timestamp_ms: u64,
	pub level: LogLevel,
	pub message: String,
	pub source: LogSource,
}

impl LogEntry {
	/// Creates an entry stamped with the current wall-clock time.
	pub fn now(level: LogLevel, message: impl Into<String>, source: LogSource) -> Self {
		Self {
			timestamp_ms: now_ms(),
			level,
			message: message.into(),
			source,
		}
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or_default()
}
