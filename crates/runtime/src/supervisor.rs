//! Process supervisor: owns the mesh child process and the session state.
//!
//! All mutable state sits behind one `parking_lot::Mutex` that is never held
//! across an `.await`. Long-running steps (grace window, stop deadline) race
//! the child's exit notification against a [`CancellationToken`]; `reset`
//! cancels that token and bumps an epoch so stale tasks drop their updates.

use std::fmt;
use std::mem;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use lanbridge_protocol::{FaultKind, LogEntry, LogLevel, LogSource, ProcessFault, SessionInfo, Status, SupervisorEvent};
use parking_lot::{Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::elevation::{self, Credential, LaunchPlan};
use crate::error::{Error, ExitReport, Result};
use crate::events::EventBus;
use crate::log_buffer::LogBuffer;
use crate::process::{self, TerminateOutcome};
use crate::status::StatusMachine;

/// Proof that a launch was admitted; stale once `reset` or a newer launch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTicket {
	epoch: u64,
	action: &'static str,
}

impl OperationTicket {
	pub fn action(&self) -> &'static str {
		self.action
	}
}

enum ChildControl {
	Kill,
}

struct TrackedProcess {
	pid: Option<u32>,
	elevated: bool,
	control: mpsc::UnboundedSender<ChildControl>,
	exit: watch::Receiver<Option<ExitReport>>,
}

enum ProcessSlot {
	Idle,
	Running(TrackedProcess),
}

struct State {
	status: StatusMachine,
	session: Option<SessionInfo>,
	logs: LogBuffer,
	process: ProcessSlot,
	credential: Option<Credential>,
	staged: Option<PathBuf>,
	epoch: u64,
	cancel: CancellationToken,
	stop_requested: bool,
}

struct Shared {
	config: SupervisorConfig,
	events: EventBus,
	state: Mutex<State>,
	/// Held by `reset` for its terminate-by-name sweep; launches wait on it before spawning.
	sweep_gate: Mutex<()>,
}

/// Supervises a single mesh process and the session it serves.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ProcessSupervisor {
	shared: Arc<Shared>,
}

impl ProcessSupervisor {
	pub fn new(config: SupervisorConfig) -> Self {
		let state = State {
			status: StatusMachine::new(),
			session: None,
			logs: LogBuffer::new(config.max_log_entries),
			process: ProcessSlot::Idle,
			credential: None,
			staged: None,
			epoch: 0,
			cancel: CancellationToken::new(),
			stop_requested: false,
		};
		let shared = Arc::new(Shared {
			events: EventBus::new(config.event_capacity),
			config,
			state: Mutex::new(state),
			sweep_gate: Mutex::new(()),
		});

		{
			let mut state = shared.state.lock();
			let message = format!("Using executable: {}", shared.config.executable.display());
			shared.push_log(&mut state, LogLevel::Info, message, LogSource::System);
		}

		Self { shared }
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.shared.config
	}

	/// Subscribes to status, log, error and connection events.
	pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
		self.shared.events.subscribe()
	}

	pub fn status(&self) -> Status {
		self.shared.state.lock().status.current()
	}

	pub fn session(&self) -> Option<SessionInfo> {
		self.shared.state.lock().session.clone()
	}

	pub fn logs(&self) -> Vec<LogEntry> {
		self.shared.state.lock().logs.snapshot()
	}

	pub fn clear_logs(&self) {
		self.shared.state.lock().logs.clear();
	}

	/// Pid of the tracked child, when one is running.
	///
	/// Under elevation this is the elevation program's pid.
	pub fn pid(&self) -> Option<u32> {
		match &self.shared.state.lock().process {
			ProcessSlot::Running(tracked) => tracked.pid,
			ProcessSlot::Idle => None,
		}
	}

	pub fn requires_elevation(&self) -> bool {
		self.shared.config.requires_elevation()
	}

	pub fn set_credential(&self, credential: Credential) {
		self.shared.state.lock().credential = Some(credential);
	}

	pub fn clear_credential(&self) {
		self.shared.state.lock().credential = None;
	}

	pub fn has_credential(&self) -> bool {
		self.shared.state.lock().credential.is_some()
	}

	/// Records a `system` log entry.
	pub fn log(&self, level: LogLevel, message: impl Into<String>) {
		let mut state = self.shared.state.lock();
		self.shared.push_log(&mut state, level, message.into(), LogSource::System);
	}

	/// Records a `system` log entry on behalf of an admitted launch.
	///
	/// Dropped once `reset` has superseded the launch.
	pub fn log_for(&self, ticket: OperationTicket, level: LogLevel, message: impl Into<String>) {
		let mut state = self.shared.state.lock();
		if state.epoch == ticket.epoch {
			self.shared.push_log(&mut state, level, message.into(), LogSource::System);
		}
	}

	/// Admits a new launch: fails when busy, otherwise moves to `STARTING`.
	pub fn admit(&self, action: &'static str) -> Result<OperationTicket> {
		let mut state = self.shared.state.lock();
		state.status.admit(action)?;
		state.epoch += 1;
		state.stop_requested = false;
		state.session = None;
		self.shared.set_status(&mut state, Status::Starting);
		Ok(OperationTicket {
			epoch: state.epoch,
			action,
		})
	}

	/// Stores the session for an admitted launch.
	pub fn attach_session(&self, ticket: OperationTicket, session: SessionInfo) -> Result<()> {
		let mut state = self.shared.lock_current(ticket)?;
		state.session = Some(session);
		Ok(())
	}

	/// Marks an admitted launch as failed: `ERROR`, logged, session and staged copy dropped.
	///
	/// Does nothing when the ticket is stale or a disconnect took over.
	pub fn fail_launch(&self, ticket: OperationTicket, reason: impl fmt::Display) {
		let (process, staged) = {
			let Ok(mut state) = self.shared.lock_current(ticket) else {
				return;
			};
			let message = format!("Failed to {}: {reason}", ticket.action);
			self.shared.push_log(&mut state, LogLevel::Error, message, LogSource::System);
			state.session = None;
			self.shared.set_status(&mut state, Status::Error);
			(mem::replace(&mut state.process, ProcessSlot::Idle), state.staged.take())
		};
		if let ProcessSlot::Running(tracked) = process {
			let _ = tracked.control.send(ChildControl::Kill);
		}
		if let Some(staged) = staged {
			self.shared.remove_staged(&staged);
		}
	}

	/// Launches the executable with `args` and waits out the grace window.
	///
	/// On success the status is `RUNNING` and a `Connected` event carries the
	/// attached session. On failure the status is `ERROR` (or untouched when
	/// superseded) and the first error is returned.
	pub async fn start(&self, ticket: OperationTicket, args: Vec<String>) -> Result<()> {
		match self.launch(ticket, args).await {
			Ok(()) => Ok(()),
			Err(err) => {
				if !matches!(err, Error::Superseded) {
					self.fail_launch(ticket, &err);
				}
				Err(err)
			}
		}
	}

	async fn launch(&self, ticket: OperationTicket, args: Vec<String>) -> Result<()> {
		let config = &self.shared.config;
		let credential = {
			let mut state = self.shared.lock_current(ticket)?;
			let message = format!("Platform: {}, elevation required: {}", config.platform, config.requires_elevation());
			self.shared.push_log(&mut state, LogLevel::Info, message, LogSource::System);
			state.credential.clone()
		};

		let plan = LaunchPlan::resolve(config, &args, credential.is_some())?;
		{
			let mut state = match self.shared.lock_current(ticket) {
				Ok(state) => state,
				Err(err) => {
					discard_staged(&plan, config);
					return Err(err);
				}
			};
			if let Some(staged) = &plan.staged {
				let message = format!("Copied executable to writable location: {}", staged.display());
				self.shared.push_log(&mut state, LogLevel::Info, message, LogSource::System);
				state.staged = Some(staged.clone());
			}
			let message = format!("Spawning process: {}", plan.display_command());
			self.shared.push_log(&mut state, LogLevel::Info, message, LogSource::System);
		}

		drop(self.shared.sweep_gate.lock());
		let mut command = tokio::process::Command::new(&plan.program);
		command
			.args(&plan.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		let mut child = match command.spawn() {
			Ok(child) => child,
			Err(source) => {
				let err = Error::Spawn {
					program: plan.program.to_string_lossy().into_owned(),
					source,
				};
				self.shared.emit_fault(ticket.epoch, FaultKind::SpawnFailed, err.to_string(), ExitReport::default());
				return Err(err);
			}
		};
		let pid = child.id();
		info!(target = "lanbridge.supervisor", pid = ?pid, elevated = plan.elevated, "process spawned");
		let message = format!("Process spawned with PID: {}", pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string()));
		self.shared.log_if_current(ticket.epoch, LogLevel::Info, &message);

		if let Some(mut stdin) = child.stdin.take() {
			if let Some(credential) = credential.as_ref().filter(|_| plan.elevated) {
				let payload = credential.stdin_payload();
				if let Err(err) = stdin.write_all(&payload).await {
					debug!(target = "lanbridge.supervisor", error = %err, "failed to write credential to stdin");
				}
			}
			drop(stdin);
		}

		if let Some(stdout) = child.stdout.take() {
			spawn_reader(self.shared.clone(), ticket.epoch, stdout, LogSource::Stdout);
		}
		if let Some(stderr) = child.stderr.take() {
			spawn_reader(self.shared.clone(), ticket.epoch, stderr, LogSource::Stderr);
		}

		let (control_tx, control_rx) = mpsc::unbounded_channel();
		let (exit_tx, mut exit_rx) = watch::channel(None);
		let cancel = {
			let mut state = match self.shared.lock_current(ticket) {
				Ok(state) => state,
				Err(err) => {
					let _ = child.start_kill();
					return Err(err);
				}
			};
			state.process = ProcessSlot::Running(TrackedProcess {
				pid,
				elevated: plan.elevated,
				control: control_tx,
				exit: exit_rx.clone(),
			});
			state.cancel.clone()
		};
		spawn_watcher(self.shared.clone(), ticket.epoch, plan.elevated, child, control_rx, exit_tx);

		tokio::select! {
			_ = cancel.cancelled() => return Err(Error::Superseded),
			res = exit_rx.wait_for(Option::is_some) => {
				let report = res.ok().and_then(|report| *report).unwrap_or_default();
				if self.shared.lock_current(ticket).is_err() {
					return Err(Error::Superseded);
				}
				return Err(Error::PrematureExit(report));
			}
			_ = tokio::time::sleep(config.grace_window) => {}
		}

		let mut state = self.shared.lock_current(ticket)?;
		match state.status.current() {
			Status::Starting => {}
			Status::Error => return Err(Error::PrematureExit(exit_rx.borrow().unwrap_or_default())),
			_ => return Err(Error::Superseded),
		}
		self.shared.set_status(&mut state, Status::Running);
		let message = format!("{} started successfully", config.executable_name());
		self.shared.push_log(&mut state, LogLevel::Info, message, LogSource::System);
		let session = state.session.clone();
		self.shared.events.emit(SupervisorEvent::Connected { session });
		Ok(())
	}

	/// Stops the tracked process: graceful request, bounded wait, forceful kill.
	///
	/// Succeeds immediately when nothing is running. Cleanup failures are only
	/// logged. Returns [`Error::Superseded`] when a `reset` interrupts the wait.
	pub async fn stop(&self) -> Result<()> {
		let config = &self.shared.config;
		let (epoch, pid, elevated, control, mut exit, cancel) = {
			let mut state = self.shared.state.lock();
			let ProcessSlot::Running(tracked) = &state.process else {
				return Ok(());
			};
			let captured = (
				state.epoch,
				tracked.pid,
				tracked.elevated,
				tracked.control.clone(),
				tracked.exit.clone(),
				state.cancel.clone(),
			);
			state.stop_requested = true;
			captured
		};
		let name = config.executable_name();

		match pid.map(process::signal_terminate) {
			Some(Ok(())) => debug!(target = "lanbridge.supervisor", pid = ?pid, "sent graceful termination"),
			_ => {
				let _ = control.send(ChildControl::Kill);
			}
		}
		if elevated {
			self.sweep(&name, false).await;
		}

		if !wait_for_exit(&mut exit, config.stop_timeout, &cancel).await? {
			self.shared.log_if_current(epoch, LogLevel::Warn, "Process did not exit gracefully, killing...");
			let _ = control.send(ChildControl::Kill);
			if elevated {
				self.sweep(&name, true).await;
			}
			if !wait_for_exit(&mut exit, config.kill_timeout, &cancel).await? {
				let alive = pid.is_some_and(process::pid_is_alive);
				warn!(target = "lanbridge.supervisor", pid = ?pid, alive, "process still present after forced kill");
				self.shared.log_if_current(epoch, LogLevel::Warn, "Process did not exit after forced kill");
			}
		}

		if elevated && !cancel.is_cancelled() {
			self.sweep(&name, true).await;
		}

		let staged = {
			let mut state = self.shared.state.lock();
			if state.epoch != epoch {
				return Err(Error::Superseded);
			}
			state.staged.take()
		};
		if let Some(staged) = staged {
			self.shared.remove_staged(&staged);
		}
		Ok(())
	}

	/// Disconnects the running session: `STOPPING`, stop, `STOPPED`.
	///
	/// The status stays `STOPPING` until the stop and its cleanup are done, so
	/// no new launch is admitted in between. A no-op with a warning when already
	/// disconnected or when another disconnect is in flight. Ends quietly when a
	/// `reset` takes over while the stop is in flight.
	pub async fn disconnect(&self) -> Result<()> {
		let epoch = {
			let mut state = self.shared.state.lock();
			let current = state.status.current();
			if current.is_disconnected() {
				self.shared
					.push_log(&mut state, LogLevel::Warn, "Already disconnected".to_string(), LogSource::System);
				return Ok(());
			}
			if current == Status::Stopping {
				self.shared
					.push_log(&mut state, LogLevel::Warn, "Disconnect already in progress".to_string(), LogSource::System);
				return Ok(());
			}
			self.shared
				.push_log(&mut state, LogLevel::Info, "Disconnecting...".to_string(), LogSource::System);
			state.stop_requested = true;
			self.shared.set_status(&mut state, Status::Stopping);
			state.epoch
		};

		match self.stop().await {
			Ok(()) => {}
			Err(Error::Superseded) => return Ok(()),
			Err(err) => {
				let mut state = self.shared.state.lock();
				if state.epoch == epoch {
					let message = format!("Failed to disconnect: {err}");
					self.shared.push_log(&mut state, LogLevel::Error, message, LogSource::System);
					self.shared.set_status(&mut state, Status::Error);
				}
				return Err(err);
			}
		}

		let mut state = self.shared.state.lock();
		if state.epoch != epoch {
			return Ok(());
		}
		state.session = None;
		self.shared.set_status(&mut state, Status::Stopped);
		self.shared
			.push_log(&mut state, LogLevel::Info, "Disconnected successfully".to_string(), LogSource::System);
		self.shared.events.emit(SupervisorEvent::Disconnected);
		Ok(())
	}

	/// Unconditionally returns to `IDLE` with no session and an empty log.
	///
	/// Kills the tracked child, sweeps stray processes by name when elevation
	/// applies, removes staged artifacts and supersedes in-flight operations.
	/// The sweep runs after the state lock is released; a launch admitted
	/// meanwhile does not spawn until it has finished.
	pub fn reset(&self) {
		let config = &self.shared.config;
		let _gate = self.shared.sweep_gate.lock();
		let (slot, staged) = {
			let mut state = self.shared.state.lock();
			info!(target = "lanbridge.supervisor", status = %state.status.current(), "reset");

			state.epoch += 1;
			state.cancel.cancel();
			state.cancel = CancellationToken::new();
			state.stop_requested = false;

			let slot = mem::replace(&mut state.process, ProcessSlot::Idle);
			let staged = state.staged.take();
			self.shared.set_status(&mut state, Status::Idle);
			state.session = None;
			state.logs.clear();
			(slot, staged)
		};

		if let ProcessSlot::Running(tracked) = slot {
			let _ = tracked.control.send(ChildControl::Kill);
		}
		if config.requires_elevation() {
			match process::terminate_by_name(&config.executable_name(), true) {
				Ok(outcome) => debug!(target = "lanbridge.supervisor", ?outcome, "forced sweep"),
				Err(err) => debug!(target = "lanbridge.supervisor", error = %err, "forced sweep failed"),
			}
		}

		let staged = staged.or_else(|| {
			let default = config.staged_executable_path();
			(config.requires_elevation() && elevation::is_constrained_mount(&config.executable) && default.exists()).then_some(default)
		});
		if let Some(staged) = staged {
			self.shared.remove_staged(&staged);
		}
	}

	/// Best-effort terminate-by-name; failures are logged at `debug`.
	async fn sweep(&self, name: &str, force: bool) {
		match process::terminate_by_name_async(name, force).await {
			Ok(TerminateOutcome::Signaled) => debug!(target = "lanbridge.supervisor", name, force, "terminated stray processes"),
			Ok(TerminateOutcome::NoMatch) => {}
			Err(err) => {
				debug!(target = "lanbridge.supervisor", name, force, error = %err, "terminate-by-name failed");
				self.log(LogLevel::Debug, "Terminate-by-name failed (process may already be dead)");
			}
		}
	}
}

impl Shared {
	/// Locks the state, failing when `ticket` is stale or a stop was requested.
	fn lock_current(&self, ticket: OperationTicket) -> Result<MutexGuard<'_, State>> {
		let state = self.state.lock();
		if state.epoch != ticket.epoch || state.stop_requested {
			return Err(Error::Superseded);
		}
		Ok(state)
	}

	fn push_log(&self, state: &mut State, level: LogLevel, message: String, source: LogSource) {
		let entry = LogEntry::now(level, message, source);
		mirror(&entry);
		state.logs.push(entry.clone());
		self.events.emit(SupervisorEvent::Log { entry });
	}

	fn log_if_current(&self, epoch: u64, level: LogLevel, message: &str) {
		let mut state = self.state.lock();
		if state.epoch == epoch {
			self.push_log(&mut state, level, message.to_string(), LogSource::System);
		}
	}

	fn set_status(&self, state: &mut State, next: Status) {
		if let Some(change) = state.status.transition(next) {
			let message = format!("Status changed: {} -> {}", change.previous, change.status);
			self.push_log(state, LogLevel::Info, message, LogSource::System);
			self.events.emit(SupervisorEvent::StatusChange {
				status: change.status,
				previous: change.previous,
			});
		}
	}

	fn emit_fault(&self, epoch: u64, kind: FaultKind, message: String, report: ExitReport) {
		let mut state = self.state.lock();
		if state.epoch != epoch {
			return;
		}
		self.push_log(&mut state, LogLevel::Error, message.clone(), LogSource::System);
		self.events.emit(SupervisorEvent::Error {
			fault: ProcessFault {
				kind,
				message,
				exit_code: report.code,
				signal: report.signal,
			},
		});
	}

	fn record_line(&self, epoch: u64, source: LogSource, line: &str) {
		let mut state = self.state.lock();
		if state.epoch != epoch {
			return;
		}
		let level = match source {
			LogSource::Stderr => LogLevel::Warn,
			_ => LogLevel::Info,
		};
		self.push_log(&mut state, level, line.to_string(), source);
	}

	fn handle_exit(&self, epoch: u64, elevated: bool, report: ExitReport) {
		let fault = {
			let mut state = self.state.lock();
			if state.epoch != epoch {
				return;
			}
			state.process = ProcessSlot::Idle;
			let message = format!("Process exited with {report}");
			self.push_log(&mut state, LogLevel::Info, message, LogSource::System);

			let current = state.status.current();
			if current == Status::Stopping {
				// `disconnect` moves to STOPPED once its cleanup is done.
				return;
			}
			if state.stop_requested {
				self.set_status(&mut state, Status::Stopped);
				return;
			}
			match current {
				Status::Starting => Some(exit_fault(elevated, report)),
				Status::Running if report.success() => {
					self.set_status(&mut state, Status::Stopped);
					None
				}
				Status::Running => Some(exit_fault(elevated, report)),
				_ => None,
			}
		};

		if let Some((kind, message)) = fault {
			self.emit_fault(epoch, kind, message, report);
			let mut state = self.state.lock();
			if state.epoch == epoch {
				self.set_status(&mut state, Status::Error);
			}
		}
	}

	fn remove_staged(&self, staged: &std::path::Path) {
		if let Err(err) = elevation::remove_staged(staged, &self.config.staging_dir) {
			debug!(target = "lanbridge.supervisor", path = %staged.display(), error = %err, "failed to remove staged executable");
		}
	}
}

fn exit_fault(elevated: bool, report: ExitReport) -> (FaultKind, String) {
	if elevated && report.code == Some(1) {
		(FaultKind::AuthenticationFailed, "Elevation authentication failed (exit code 1)".to_string())
	} else {
		(FaultKind::UnexpectedExit, format!("Process exited unexpectedly with {report}"))
	}
}

fn discard_staged(plan: &LaunchPlan, config: &SupervisorConfig) {
	if let Some(staged) = &plan.staged {
		let _ = elevation::remove_staged(staged, &config.staging_dir);
	}
}

fn mirror(entry: &LogEntry) {
	let target = match entry.source {
		LogSource::System => "lanbridge.supervisor",
		LogSource::Stdout | LogSource::Stderr => "lanbridge.process",
	};
	let source = entry.source;
	match entry.level {
		LogLevel::Debug => debug!(target = target, ?source, "{}", entry.message),
		LogLevel::Info => info!(target = target, ?source, "{}", entry.message),
		LogLevel::Warn => warn!(target = target, ?source, "{}", entry.message),
		LogLevel::Error => error!(target = target, ?source, "{}", entry.message),
	}
}

async fn wait_for_exit(exit: &mut watch::Receiver<Option<ExitReport>>, timeout: Duration, cancel: &CancellationToken) -> Result<bool> {
	tokio::select! {
		_ = cancel.cancelled() => Err(Error::Superseded),
		res = tokio::time::timeout(timeout, exit.wait_for(Option::is_some)) => Ok(res.is_ok()),
	}
}

fn spawn_reader<R>(shared: Arc<Shared>, epoch: u64, reader: R, source: LogSource)
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut reader = BufReader::new(reader);
		let mut buf = Vec::new();
		loop {
			buf.clear();
			match reader.read_until(b'\n', &mut buf).await {
				Ok(0) => break,
				Ok(_) => {
					let text = String::from_utf8_lossy(&buf);
					let line = text.trim();
					if line.is_empty() || (source == LogSource::Stderr && elevation::is_elevation_prompt(line)) {
						continue;
					}
					shared.record_line(epoch, source, line);
				}
				Err(err) => {
					debug!(target = "lanbridge.process", ?source, error = %err, "output stream closed");
					break;
				}
			}
		}
	});
}

fn spawn_watcher(
	shared: Arc<Shared>,
	epoch: u64,
	elevated: bool,
	mut child: tokio::process::Child,
	mut control: mpsc::UnboundedReceiver<ChildControl>,
	exit: watch::Sender<Option<ExitReport>>,
) {
	tokio::spawn(async move {
		let status = loop {
			tokio::select! {
				status = child.wait() => break status,
				Some(ChildControl::Kill) = control.recv() => {
					if let Err(err) = child.start_kill() {
						debug!(target = "lanbridge.supervisor", error = %err, "kill request failed");
					}
				}
			}
		};

		let report = match status {
			Ok(status) => ExitReport::from(status),
			Err(err) => {
				debug!(target = "lanbridge.supervisor", error = %err, "failed to wait for child");
				ExitReport::default()
			}
		};
		shared.handle_exit(epoch, elevated, report);
		exit.send_replace(Some(report));
	});
}
