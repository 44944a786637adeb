//! OS-level process helpers: liveness probes, signals, name-based termination.

use std::io;
use std::process::Command;

/// Result of a terminate-by-name sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
	/// At least one matching process was signaled.
	Signaled,
	/// No process matched the name.
	NoMatch,
}

/// Returns `true` when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}

		let Ok(raw) = libc::pid_t::try_from(pid) else {
			return false;
		};
		// SAFETY: signal 0 performs permission and existence checks only.
		let rc = unsafe { libc::kill(raw, 0) };
		if rc == 0 {
			return true;
		}
		// EPERM means the process exists but belongs to someone else (e.g. root).
		io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		if let Ok(output) = Command::new("tasklist").args(["/FI", &filter, "/FO", "CSV", "/NH"]).output() {
			if output.status.success() {
				let stdout = String::from_utf8_lossy(&output.stdout);
				return tasklist_has_pid(stdout.as_ref(), pid);
			}
		}

		pid == std::process::id()
	}

	#[cfg(not(any(unix, windows)))]
	{
		pid == std::process::id()
	}
}

/// Sends the platform's graceful termination request to `pid`.
///
/// On Unix this is `SIGTERM`. Elsewhere there is no graceful equivalent and
/// callers fall back to killing the child handle.
pub fn signal_terminate(pid: u32) -> io::Result<()> {
	#[cfg(unix)]
	{
		let raw = libc::pid_t::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
		// SAFETY: plain signal delivery to a pid we spawned.
		if unsafe { libc::kill(raw, libc::SIGTERM) } == 0 {
			Ok(())
		} else {
			Err(io::Error::last_os_error())
		}
	}

	#[cfg(not(unix))]
	{
		let _ = pid;
		Err(io::Error::new(io::ErrorKind::Unsupported, "graceful termination is not available on this platform"))
	}
}

/// Builds the command that terminates every process called `name`.
pub fn terminate_command(name: &str, force: bool) -> Command {
	#[cfg(windows)]
	{
		let mut cmd = Command::new("taskkill");
		if force {
			cmd.arg("/F");
		}
		cmd.args(["/IM", name]);
		cmd
	}

	#[cfg(not(windows))]
	{
		let mut cmd = Command::new("pkill");
		if force {
			cmd.arg("-9");
		}
		cmd.arg(name);
		cmd
	}
}

/// Maps the exit code of a terminate-by-name command to an outcome.
///
/// `pkill` and `taskkill` both report "nothing matched" with a distinct code,
/// which is not a failure for cleanup purposes.
pub fn terminate_outcome(code: Option<i32>) -> io::Result<TerminateOutcome> {
	match code {
		Some(0) => Ok(TerminateOutcome::Signaled),
		#[cfg(windows)]
		Some(128) => Ok(TerminateOutcome::NoMatch),
		#[cfg(not(windows))]
		Some(1) => Ok(TerminateOutcome::NoMatch),
		Some(code) => Err(io::Error::other(format!("terminate-by-name exited with code {code}"))),
		None => Err(io::Error::other("terminate-by-name was killed by a signal")),
	}
}

/// Terminates every process called `name`, blocking until the sweep finishes.
pub fn terminate_by_name(name: &str, force: bool) -> io::Result<TerminateOutcome> {
	let status = terminate_command(name, force)
		.stdin(std::process::Stdio::null())
		.stdout(std::process::Stdio::null())
		.stderr(std::process::Stdio::null())
		.status()?;
	terminate_outcome(status.code())
}

/// Async variant of [`terminate_by_name`] for use inside the supervisor's tasks.
pub async fn terminate_by_name_async(name: &str, force: bool) -> io::Result<TerminateOutcome> {
	let mut cmd = tokio::process::Command::from(terminate_command(name, force));
	cmd.stdin(std::process::Stdio::null())
		.stdout(std::process::Stdio::null())
		.stderr(std::process::Stdio::null());
	let status = cmd.status().await?;
	terminate_outcome(status.code())
}

/// Returns `true` when `port` can be bound on localhost, i.e. nothing listens there yet.
pub fn port_available(port: u16) -> bool {
	std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(any(test, windows))]
fn tasklist_has_pid(output: &str, pid: u32) -> bool {
	let pid_str = pid.to_string();
	output.lines().any(|line| {
		let line = line.trim();
		if !line.starts_with('"') {
			return false;
		}

		line.trim_matches('"')
			.split("\",\"")
			.nth(1)
			.is_some_and(|field| field.trim() == pid_str.as_str())
	})
}
