//! Immutable supervisor configuration.
//!
//! Platform facts are captured once when the configuration is built and never
//! change afterwards; the supervisor only reads them.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of log entries retained.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;
/// Delay after spawn during which an exit counts as a startup failure.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(1);
/// Ceiling on the graceful-stop wait before a forceful kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to wait for exit after a forceful kill before giving up.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(2);
/// Program used to run the executable with elevated privileges.
pub const DEFAULT_ELEVATION_PROGRAM: &str = "sudo";
/// Directory name under the system temp dir used for staged executables.
pub const STAGING_DIR_NAME: &str = "lanbridge-runtime";
/// Buffered events per subscriber before the slowest one starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
	Linux,
	MacOs,
	Windows,
	Other,
}

impl Platform {
	/// Detects the platform this binary was compiled for.
	pub fn current() -> Self {
		if cfg!(target_os = "linux") {
			Platform::Linux
		} else if cfg!(target_os = "macos") {
			Platform::MacOs
		} else if cfg!(windows) {
			Platform::Windows
		} else {
			Platform::Other
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Platform::Linux => "linux",
			Platform::MacOs => "macos",
			Platform::Windows => "windows",
			Platform::Other => "other",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Settings the supervisor is constructed with.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	/// Resolved path of the mesh executable.
	pub executable: PathBuf,
	pub platform: Platform,
	pub max_log_entries: usize,
	pub grace_window: Duration,
	pub stop_timeout: Duration,
	pub kill_timeout: Duration,
	/// Writable directory receiving executables copied off constrained mounts.
	pub staging_dir: PathBuf,
	pub elevation_program: String,
	pub event_capacity: usize,
}

impl SupervisorConfig {
	/// Creates a configuration for `executable` with defaults for the current platform.
	pub fn new(executable: impl Into<PathBuf>) -> Self {
		Self {
			executable: executable.into(),
			platform: Platform::current(),
			max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
			grace_window: DEFAULT_GRACE_WINDOW,
			stop_timeout: DEFAULT_STOP_TIMEOUT,
			kill_timeout: DEFAULT_KILL_TIMEOUT,
			staging_dir: std::env::temp_dir().join(STAGING_DIR_NAME),
			elevation_program: DEFAULT_ELEVATION_PROGRAM.to_string(),
			event_capacity: DEFAULT_EVENT_CAPACITY,
		}
	}

	pub fn with_platform(mut self, platform: Platform) -> Self {
		self.platform = platform;
		self
	}

	pub fn with_max_log_entries(mut self, max: usize) -> Self {
		self.max_log_entries = max;
		self
	}

	pub fn with_grace_window(mut self, window: Duration) -> Self {
		self.grace_window = window;
		self
	}

	pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
		self.stop_timeout = timeout;
		self
	}

	pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
		self.kill_timeout = timeout;
		self
	}

	pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.staging_dir = dir.into();
		self
	}

	pub fn with_elevation_program(mut self, program: impl Into<String>) -> Self {
		self.elevation_program = program.into();
		self
	}

	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	/// Returns whether launches on this platform need elevated privileges.
	pub fn requires_elevation(&self) -> bool {
		crate::elevation::requires_elevation(self.platform)
	}

	/// File name of the executable, used for name-based process termination.
	pub fn executable_name(&self) -> String {
		self.executable
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| self.executable.to_string_lossy().into_owned())
	}

	/// Location a staged copy of the executable is written to.
	pub fn staged_executable_path(&self) -> PathBuf {
		self.staging_dir.join(self.executable_name())
	}
}
