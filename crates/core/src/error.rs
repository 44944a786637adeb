//! Error type for session-level operations.

use std::path::PathBuf;
use std::time::Duration;

pub use lanbridge_runtime::ErrorKind;

use crate::invitation::InvitationError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Supervisor(#[from] lanbridge_runtime::Error),

	#[error("invalid invitation code: {0}")]
	Invitation(#[from] InvitationError),

	#[error("peer node resolution timed out after {0:?}")]
	NodeTimeout(Duration),

	#[error("invalid node {node:?}: {reason}")]
	InvalidNode { node: String, reason: &'static str },

	#[error("failed to generate launch arguments: {0}")]
	Arguments(String),

	#[error("could not locate {name} (searched: {searched})")]
	ExecutableNotLocated { name: String, searched: String },

	#[error("failed to read config {}: {source}", path.display())]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config {}: {source}", path.display())]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Supervisor(err) => err.kind(),
			Error::Invitation(_)
			| Error::NodeTimeout(_)
			| Error::InvalidNode { .. }
			| Error::Arguments(_)
			| Error::ExecutableNotLocated { .. }
			| Error::ConfigRead { .. }
			| Error::ConfigParse { .. } => ErrorKind::Resolution,
		}
	}

	/// Returns `true` when the operation was cancelled by a `reset`.
	pub fn is_superseded(&self) -> bool {
		self.kind() == ErrorKind::Superseded
	}
}
