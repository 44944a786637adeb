//! Privilege elevation: when it applies, how the credential reaches the
//! elevation program, and staging executables off read-only mounts.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::config::{Platform, SupervisorConfig};
use crate::error::{Error, Result};

/// Substrings of stderr lines that belong to the elevation prompt, not the child.
pub const PROMPT_MARKERS: [&str; 2] = ["[sudo]", "password"];

/// Returns `true` when launching the mesh executable needs elevated privileges.
pub fn requires_elevation(platform: Platform) -> bool {
	matches!(platform, Platform::Linux | Platform::MacOs)
}

/// Returns `true` when `path` looks like it lives inside a compressed
/// self-mounting bundle (AppImage style) that an elevated user cannot read.
///
/// This is a path-substring approximation: it matches `/.mount_` and
/// `/tmp/.mount` anywhere in the path and does not inspect the mount table.
pub fn is_constrained_mount(path: &Path) -> bool {
	let path = path.to_string_lossy();
	path.contains("/.mount_") || path.contains("/tmp/.mount")
}

/// Returns `true` for stderr lines emitted by the elevation prompt.
pub fn is_elevation_prompt(line: &str) -> bool {
	PROMPT_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Secret handed to the elevation program on stdin. Zeroed on drop.
#[derive(Clone)]
pub struct Credential(Zeroizing<String>);

impl Credential {
	pub fn new(secret: impl Into<String>) -> Self {
		Self(Zeroizing::new(secret.into()))
	}

	/// Bytes written to the elevation program's stdin: the secret and a newline.
	pub(crate) fn stdin_payload(&self) -> Zeroizing<Vec<u8>> {
		let mut payload = Zeroizing::new(Vec::with_capacity(self.0.len() + 1));
		payload.extend_from_slice(self.0.as_bytes());
		payload.push(b'\n');
		payload
	}
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Credential(<redacted>)")
	}
}

/// Fully resolved command line for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
	/// Program handed to the OS: the elevation program or the executable itself.
	pub program: PathBuf,
	pub args: Vec<String>,
	/// The executable actually run, after staging.
	pub executable: PathBuf,
	pub elevated: bool,
	/// Set when `executable` is a staged copy that must be removed after exit.
	pub staged: Option<PathBuf>,
}

impl LaunchPlan {
	/// Resolves the launch for `config`, staging the executable when needed.
	///
	/// Fails with [`Error::CredentialMissing`] before touching the filesystem
	/// when elevation applies and no credential is present.
	pub fn resolve(config: &SupervisorConfig, args: &[String], has_credential: bool) -> Result<Self> {
		let elevated = config.requires_elevation();
		if elevated && !has_credential {
			return Err(Error::CredentialMissing);
		}
		if !config.executable.is_file() {
			return Err(Error::ExecutableNotFound(config.executable.clone()));
		}

		let staged = if elevated && is_constrained_mount(&config.executable) {
			Some(stage_executable(&config.executable, &config.staging_dir)?)
		} else {
			None
		};
		let executable = staged.clone().unwrap_or_else(|| config.executable.clone());

		let (program, full_args) = if elevated {
			let mut full = Vec::with_capacity(args.len() + 2);
			full.push("-S".to_string());
			full.push(executable.to_string_lossy().into_owned());
			full.extend(args.iter().cloned());
			(PathBuf::from(&config.elevation_program), full)
		} else {
			(executable.clone(), args.to_vec())
		};

		Ok(Self {
			program,
			args: full_args,
			executable,
			elevated,
			staged,
		})
	}

	/// Command line rendered for the log; never includes the credential.
	pub fn display_command(&self) -> String {
		let mut out = self.program.to_string_lossy().into_owned();
		for arg in &self.args {
			out.push(' ');
			out.push_str(arg);
		}
		out
	}
}

/// Copies `source` into `dir`, marks it executable and returns the copy's path.
///
/// The bytes land in a `.partial` sibling first and are renamed into place, so
/// the final path never refers to a truncated file.
pub fn stage_executable(source: &Path, dir: &Path) -> Result<PathBuf> {
	let staging_err = |path: &Path| {
		let path = path.to_path_buf();
		move |source: io::Error| Error::Staging { path, source }
	};

	fs::create_dir_all(dir).map_err(staging_err(dir))?;
	let name = source
		.file_name()
		.ok_or_else(|| Error::Staging {
			path: source.to_path_buf(),
			source: io::Error::new(io::ErrorKind::InvalidInput, "executable path has no file name"),
		})?
		.to_os_string();
	let target = dir.join(&name);
	let mut partial_name = name;
	partial_name.push(".partial");
	let partial = dir.join(partial_name);

	let result = copy_into_place(source, &partial, &target);
	if result.is_err() {
		let _ = fs::remove_file(&partial);
	}
	result.map_err(staging_err(&target))?;
	Ok(target)
}

fn copy_into_place(source: &Path, partial: &Path, target: &Path) -> io::Result<()> {
	fs::copy(source, partial)?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(partial, fs::Permissions::from_mode(0o755))?;
	}
	fs::rename(partial, target)
}

/// Removes a staged executable and its directory when that is left empty.
pub fn remove_staged(path: &Path, dir: &Path) -> io::Result<()> {
	match fs::remove_file(path) {
		Ok(()) => {}
		Err(err) if err.kind() == io::ErrorKind::NotFound => {}
		Err(err) => return Err(err),
	}
	let empty = fs::read_dir(dir).map(|mut entries| entries.next().is_none()).unwrap_or(false);
	if empty {
		fs::remove_dir(dir)?;
	}
	Ok(())
}
