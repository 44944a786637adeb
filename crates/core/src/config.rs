//! JSON configuration file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanbridge_runtime::SupervisorConfig;
use lanbridge_runtime::config::{DEFAULT_ELEVATION_PROGRAM, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_LOG_ENTRIES, STAGING_DIR_NAME};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::locate;
use crate::nodes::{self, NodeDescriptor};

pub const DEFAULT_NODE_TIMEOUT_MS: u64 = 10_000;

/// User-facing settings. Every field has a default, so `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LanbridgeConfig {
	/// Explicit executable path; skips the search when set.
	pub executable: Option<PathBuf>,
	pub executable_name: String,
	/// Directory searched recursively for `executable_name`.
	pub search_dir: Option<PathBuf>,
	pub max_log_entries: usize,
	pub grace_window_ms: u64,
	pub stop_timeout_ms: u64,
	/// Wait after the forced kill before giving up on the process.
	pub kill_timeout_ms: u64,
	pub node_timeout_ms: u64,
	pub staging_dir: Option<PathBuf>,
	pub elevation_program: String,
	pub event_capacity: usize,
	/// Relay nodes used when the caller supplies none.
	pub nodes: Vec<String>,
}

impl Default for LanbridgeConfig {
	fn default() -> Self {
		Self {
			executable: None,
			executable_name: locate::default_executable_name(),
			search_dir: None,
			max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
			grace_window_ms: 1000,
			stop_timeout_ms: 5000,
			kill_timeout_ms: 2000,
			node_timeout_ms: DEFAULT_NODE_TIMEOUT_MS,
			staging_dir: None,
			elevation_program: DEFAULT_ELEVATION_PROGRAM.to_string(),
			event_capacity: DEFAULT_EVENT_CAPACITY,
			nodes: vec![nodes::DEFAULT_NODE.to_string()],
		}
	}
}

impl LanbridgeConfig {
	/// Reads and parses a JSON config file.
	pub fn load(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&raw).map_err(|source| Error::ConfigParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Loads `path` when given, otherwise returns defaults.
	pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
		path.map_or_else(|| Ok(Self::default()), Self::load)
	}

	pub fn node_timeout(&self) -> Duration {
		Duration::from_millis(self.node_timeout_ms)
	}

	pub fn relay_nodes(&self) -> Result<Vec<NodeDescriptor>> {
		nodes::parse_custom_nodes(self.nodes.as_slice())
	}

	/// Locates the executable per the configured search order.
	pub fn resolve_executable(&self) -> Result<PathBuf> {
		let search_dir = self.search_dir.clone().unwrap_or_else(locate::default_search_dir);
		let path = locate::resolve_executable(self.executable.as_deref(), &self.executable_name, Some(&search_dir))?;
		locate::ensure_executable(&path);
		Ok(path)
	}

	/// Builds the immutable runtime configuration for `executable`.
	pub fn supervisor_config(&self, executable: PathBuf) -> SupervisorConfig {
		let staging_dir = self.staging_dir.clone().unwrap_or_else(|| std::env::temp_dir().join(STAGING_DIR_NAME));
		SupervisorConfig::new(executable)
			.with_max_log_entries(self.max_log_entries)
			.with_grace_window(Duration::from_millis(self.grace_window_ms))
			.with_stop_timeout(Duration::from_millis(self.stop_timeout_ms))
			.with_kill_timeout(Duration::from_millis(self.kill_timeout_ms))
			.with_staging_dir(staging_dir)
			.with_elevation_program(self.elevation_program.clone())
			.with_event_capacity(self.event_capacity)
	}
}
