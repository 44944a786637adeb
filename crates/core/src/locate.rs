//! Locating the mesh executable on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Base name of the mesh executable.
pub const DEFAULT_EXECUTABLE: &str = "easytier-core";

/// Platform-specific file name of the default executable.
pub fn default_executable_name() -> String {
	format!("{DEFAULT_EXECUTABLE}{}", std::env::consts::EXE_SUFFIX)
}

/// Directory bundled binaries are unpacked into: `<temp>/lanbridge-binaries/<os>/<arch>`.
pub fn default_search_dir() -> PathBuf {
	std::env::temp_dir()
		.join("lanbridge-binaries")
		.join(std::env::consts::OS)
		.join(std::env::consts::ARCH)
}

/// Resolves the executable: `explicit` path, then a recursive search of
/// `search_dir`, then `PATH`.
pub fn resolve_executable(explicit: Option<&Path>, name: &str, search_dir: Option<&Path>) -> Result<PathBuf> {
	let mut searched = Vec::new();

	if let Some(path) = explicit {
		if path.is_file() {
			return Ok(path.to_path_buf());
		}
		searched.push(path.display().to_string());
	}

	if let Some(dir) = search_dir {
		if let Some(found) = find_executable(dir, name) {
			debug!(target = "lanbridge.locate", path = %found.display(), "found executable in search dir");
			return Ok(found);
		}
		searched.push(dir.display().to_string());
	}

	match which::which(name) {
		Ok(found) => Ok(found),
		Err(_) => {
			searched.push("PATH".to_string());
			Err(Error::ExecutableNotLocated {
				name: name.to_string(),
				searched: searched.join(", "),
			})
		}
	}
}

/// Depth-first search for a file called `name` below `dir`.
///
/// A direct child wins over anything nested; unreadable directories are skipped.
pub fn find_executable(dir: &Path, name: &str) -> Option<PathBuf> {
	let direct = dir.join(name);
	if direct.is_file() {
		return Some(direct);
	}

	let mut entries: Vec<_> = fs::read_dir(dir).ok()?.filter_map(|entry| entry.ok()).collect();
	entries.sort_by_key(|entry| entry.file_name());
	entries
		.into_iter()
		.filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_dir()))
		.find_map(|entry| find_executable(&entry.path(), name))
}

/// Adds execute permission (`0755`) when it is missing. Best-effort.
pub fn ensure_executable(path: &Path) {
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;

		let Ok(metadata) = fs::metadata(path) else {
			return;
		};
		if metadata.permissions().mode() & 0o111 == 0 {
			if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o755)) {
				debug!(target = "lanbridge.locate", path = %path.display(), error = %err, "chmod failed");
			}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = path;
	}
}
