//! Error types for supervisor operations.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use lanbridge_protocol::Status;

/// Result alias for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`], used by callers to decide how to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Rejected before any side effect because the supervisor is busy.
	Admission,
	/// A launch input could not be resolved (token, executable, credential, peers).
	Resolution,
	/// The child process failed to spawn or died.
	Runtime,
	/// The operation was cancelled by a `reset`.
	Superseded,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("cannot {action}: current status is {status}")]
	InvalidState { action: &'static str, status: Status },

	#[error("elevation is required but no credential has been provided")]
	CredentialMissing,

	#[error("executable not found: {}", .0.display())]
	ExecutableNotFound(PathBuf),

	#[error("failed to stage executable at {}: {source}", path.display())]
	Staging {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to spawn {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("process exited during startup ({0})")]
	PrematureExit(ExitReport),

	#[error("operation superseded by reset")]
	Superseded,
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::InvalidState { .. } => ErrorKind::Admission,
			Error::CredentialMissing | Error::ExecutableNotFound(_) | Error::Staging { .. } => ErrorKind::Resolution,
			Error::Spawn { .. } | Error::PrematureExit(_) => ErrorKind::Runtime,
			Error::Superseded => ErrorKind::Superseded,
		}
	}
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitReport {
	pub code: Option<i32>,
	pub signal: Option<i32>,
}

impl ExitReport {
	/// Returns `true` for a normal exit with code 0.
	pub fn success(&self) -> bool {
		self.code == Some(0)
	}
}

impl From<ExitStatus> for ExitReport {
	fn from(status: ExitStatus) -> Self {
		#[cfg(unix)]
		let signal = std::os::unix::process::ExitStatusExt::signal(&status);
		#[cfg(not(unix))]
		let signal = None;

		Self { code: status.code(), signal }
	}
}

impl fmt::Display for ExitReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (self.code, self.signal) {
			(Some(code), _) => write!(f, "code {code}"),
			(None, Some(signal)) => write!(f, "signal {signal}"),
			(None, None) => f.write_str("unknown status"),
		}
	}
}
