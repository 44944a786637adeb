#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanbridge_protocol::{FaultKind, LogLevel, LogSource, Role, SessionInfo, Status, SupervisorEvent};
use lanbridge_runtime::{Credential, Error, ErrorKind, Platform, ProcessSupervisor, SupervisorConfig};
use serial_test::serial;
use tempfile::TempDir;
use tokio::sync::broadcast;

const LONG_RUNNING: &str = "#!/bin/sh\necho \"mesh up $*\"\necho '[sudo] password for player:' >&2\necho 'tun device ready' >&2\nexec sleep 30\n";
const EXITS_EARLY: &str = "#!/bin/sh\necho 'bad arguments' >&2\nexit 3\n";
const IGNORES_TERM: &str = "#!/bin/sh\ntrap '' TERM\necho ready\nwhile true; do sleep 0.1; done\n";
const LOOPING: &str = "#!/bin/sh\necho ready\nwhile true; do sleep 0.1; done\n";
const EXITS_ONE_ON_TERM: &str = "#!/bin/sh\ntrap 'exit 1' TERM\necho ready\nwhile true; do sleep 0.1; done\n";
const FAKE_SUDO: &str = "#!/bin/sh\n[ \"$1\" = \"-S\" ] || exit 2\nshift\nread -r secret\n[ \"$secret\" = \"hunter2\" ] || exit 1\nexec \"$@\"\n";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
	let path = dir.join(name);
	fs::write(&path, body).expect("write script");
	fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
	path
}

fn unelevated(exe: &Path) -> SupervisorConfig {
	SupervisorConfig::new(exe)
		.with_platform(Platform::Windows)
		.with_grace_window(Duration::from_millis(300))
		.with_stop_timeout(Duration::from_secs(2))
}

fn elevated(exe: &Path, sudo: &Path, staging: &Path) -> SupervisorConfig {
	SupervisorConfig::new(exe)
		.with_platform(Platform::Linux)
		.with_elevation_program(sudo.to_string_lossy())
		.with_staging_dir(staging)
		.with_grace_window(Duration::from_millis(300))
		.with_stop_timeout(Duration::from_secs(2))
}

fn session(port: u16) -> SessionInfo {
	SessionInfo {
		invitation_code: "LB1.test".to_string(),
		network_name: "lb-test".to_string(),
		network_secret: "secret".to_string(),
		port,
		role: Role::Host,
		host_ip: "10.114.114.114".to_string(),
		player_name: None,
		room_label: Some("Survival".to_string()),
	}
}

fn drain(rx: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
	let mut events = Vec::new();
	while let Ok(event) = rx.try_recv() {
		events.push(event);
	}
	events
}

fn status_changes(events: &[SupervisorEvent]) -> Vec<(Status, Status)> {
	events
		.iter()
		.filter_map(|event| match event {
			SupervisorEvent::StatusChange { status, previous } => Some((*previous, *status)),
			_ => None,
		})
		.collect()
}

fn has_log(supervisor: &ProcessSupervisor, needle: &str) -> bool {
	supervisor.logs().iter().any(|entry| entry.message.contains(needle))
}

async fn wait_for_status(supervisor: &ProcessSupervisor, status: Status) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while supervisor.status() != status {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await
	.expect("status reached in time");
}

#[tokio::test]
#[serial]
async fn start_then_disconnect_runs_full_lifecycle() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-ok", LONG_RUNNING);
	let supervisor = ProcessSupervisor::new(unelevated(&exe));
	assert!(has_log(&supervisor, "Using executable:"));
	let mut rx = supervisor.subscribe();

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.attach_session(ticket, session(25565)).expect("session attached");
	supervisor
		.start(ticket, vec!["--ipv4".into(), "10.114.114.114".into()])
		.await
		.expect("process starts");

	assert_eq!(supervisor.status(), Status::Running);
	assert!(supervisor.pid().is_some());
	assert_eq!(supervisor.session().map(|s| s.port), Some(25565));

	tokio::time::sleep(Duration::from_millis(100)).await;
	let logs = supervisor.logs();
	assert!(logs.iter().any(|e| e.source == LogSource::Stdout && e.message == "mesh up --ipv4 10.114.114.114"));
	assert!(logs.iter().any(|e| e.source == LogSource::Stderr && e.level == LogLevel::Warn && e.message == "tun device ready"));
	assert!(!logs.iter().any(|e| e.message.contains("[sudo]")));

	supervisor.disconnect().await.expect("disconnect");
	assert_eq!(supervisor.status(), Status::Stopped);
	assert!(supervisor.session().is_none());
	assert!(supervisor.pid().is_none());
	assert!(has_log(&supervisor, "Disconnected successfully"));

	let events = drain(&mut rx);
	assert_eq!(status_changes(&events), [
		(Status::Idle, Status::Starting),
		(Status::Starting, Status::Running),
		(Status::Running, Status::Stopping),
		(Status::Stopping, Status::Stopped),
	]);
	let connected = events.iter().filter(|e| matches!(e, SupervisorEvent::Connected { .. })).count();
	let disconnected = events.iter().filter(|e| matches!(e, SupervisorEvent::Disconnected)).count();
	assert_eq!((connected, disconnected), (1, 1));
	assert!(has_log(&supervisor, "Status changed: running -> stopping"));
}

#[tokio::test]
#[serial]
async fn busy_supervisor_rejects_second_launch() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-busy", LONG_RUNNING);
	let supervisor = ProcessSupervisor::new(unelevated(&exe));

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.attach_session(ticket, session(25565)).expect("attached");
	supervisor.start(ticket, Vec::new()).await.expect("started");

	let err = supervisor.admit("join session").unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Admission);
	assert_eq!(supervisor.status(), Status::Running);
	assert_eq!(supervisor.session().map(|s| s.port), Some(25565));

	supervisor.reset();
}

#[tokio::test]
#[serial]
async fn premature_exit_is_reported_once() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-early", EXITS_EARLY);
	let supervisor = ProcessSupervisor::new(unelevated(&exe));
	let mut rx = supervisor.subscribe();

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.attach_session(ticket, session(7777)).expect("attached");
	let err = supervisor.start(ticket, Vec::new()).await.unwrap_err();

	assert!(matches!(err, Error::PrematureExit(report) if report.code == Some(3)));
	assert_eq!(supervisor.status(), Status::Error);
	assert!(supervisor.session().is_none());

	let events = drain(&mut rx);
	let faults: Vec<_> = events
		.iter()
		.filter_map(|e| match e {
			SupervisorEvent::Error { fault } => Some(fault.clone()),
			_ => None,
		})
		.collect();
	assert_eq!(faults.len(), 1);
	assert_eq!(faults[0].kind, FaultKind::UnexpectedExit);
	assert_eq!(faults[0].exit_code, Some(3));
	assert!(!events.iter().any(|e| matches!(e, SupervisorEvent::Connected { .. })));
}

#[tokio::test]
#[serial]
async fn missing_credential_fails_before_spawn() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-cred", LONG_RUNNING);
	let sudo = write_script(dir.path(), "fake-sudo", FAKE_SUDO);
	let supervisor = ProcessSupervisor::new(elevated(&exe, &sudo, &dir.path().join("stage")));
	let mut rx = supervisor.subscribe();

	let ticket = supervisor.admit("create session").expect("admitted");
	let err = supervisor.start(ticket, Vec::new()).await.unwrap_err();

	assert!(matches!(err, Error::CredentialMissing));
	assert_eq!(err.kind(), ErrorKind::Resolution);
	assert_eq!(supervisor.status(), Status::Error);
	assert_eq!(status_changes(&drain(&mut rx)), [(Status::Idle, Status::Starting), (Status::Starting, Status::Error)]);
	assert!(!has_log(&supervisor, "Spawning process"));
}

#[tokio::test]
#[serial]
async fn missing_executable_is_a_resolution_error() {
	let dir = TempDir::new().expect("temp dir");
	let supervisor = ProcessSupervisor::new(unelevated(&dir.path().join("absent")));

	let ticket = supervisor.admit("join session").expect("admitted");
	let err = supervisor.start(ticket, Vec::new()).await.unwrap_err();

	assert!(matches!(err, Error::ExecutableNotFound(_)));
	assert_eq!(supervisor.status(), Status::Error);
	assert!(has_log(&supervisor, "Failed to join session"));
}

#[tokio::test]
#[serial]
async fn elevated_launch_hands_credential_on_stdin() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-sudo", LONG_RUNNING);
	let sudo = write_script(dir.path(), "fake-sudo", FAKE_SUDO);
	let supervisor = ProcessSupervisor::new(elevated(&exe, &sudo, &dir.path().join("stage")));
	supervisor.set_credential(Credential::new("hunter2"));
	assert!(supervisor.has_credential());

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.start(ticket, vec!["--dhcp".into()]).await.expect("started");
	assert_eq!(supervisor.status(), Status::Running);
	assert!(has_log(&supervisor, "-S"));
	assert!(!supervisor.logs().iter().any(|e| e.message.contains("hunter2")));

	supervisor.disconnect().await.expect("disconnect");
	assert_eq!(supervisor.status(), Status::Stopped);
}

#[tokio::test]
#[serial]
async fn rejected_credential_is_an_authentication_fault() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-auth", LONG_RUNNING);
	let sudo = write_script(dir.path(), "fake-sudo", FAKE_SUDO);
	let supervisor = ProcessSupervisor::new(elevated(&exe, &sudo, &dir.path().join("stage")));
	supervisor.set_credential(Credential::new("wrong"));
	let mut rx = supervisor.subscribe();

	let ticket = supervisor.admit("create session").expect("admitted");
	let err = supervisor.start(ticket, Vec::new()).await.unwrap_err();
	assert!(matches!(err, Error::PrematureExit(_)));
	assert_eq!(err.kind(), ErrorKind::Runtime);

	let fault = drain(&mut rx)
		.into_iter()
		.find_map(|e| match e {
			SupervisorEvent::Error { fault } => Some(fault),
			_ => None,
		})
		.expect("fault event");
	assert_eq!(fault.kind, FaultKind::AuthenticationFailed);
	assert_eq!(fault.exit_code, Some(1));
}

#[tokio::test]
#[serial]
async fn constrained_mount_executable_is_staged_and_cleaned_up() {
	let dir = TempDir::new().expect("temp dir");
	let mount = dir.path().join(".mount_lanbridge");
	fs::create_dir_all(&mount).expect("mount dir");
	let exe = write_script(&mount, "lb-mesh-stage", LONG_RUNNING);
	let sudo = write_script(dir.path(), "fake-sudo", FAKE_SUDO);
	let staging = dir.path().join("stage");
	let supervisor = ProcessSupervisor::new(elevated(&exe, &sudo, &staging));
	supervisor.set_credential(Credential::new("hunter2"));

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.start(ticket, Vec::new()).await.expect("started");
	assert!(staging.join("lb-mesh-stage").is_file());
	assert!(has_log(&supervisor, "Copied executable to writable location"));

	supervisor.disconnect().await.expect("disconnect");
	assert!(!staging.exists());
}

#[tokio::test]
#[serial]
async fn stubborn_process_is_killed_after_timeout() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-stubborn", IGNORES_TERM);
	let config = unelevated(&exe)
		.with_stop_timeout(Duration::from_millis(300))
		.with_kill_timeout(Duration::from_millis(500));
	let supervisor = ProcessSupervisor::new(config);

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.start(ticket, Vec::new()).await.expect("started");
	supervisor.disconnect().await.expect("disconnect");

	assert_eq!(supervisor.status(), Status::Stopped);
	assert!(has_log(&supervisor, "Process did not exit gracefully, killing..."));
	assert!(!has_log(&supervisor, "Process did not exit after forced kill"));
}

#[tokio::test]
#[serial]
async fn nonzero_exit_while_stopping_ends_stopped() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-exit1", EXITS_ONE_ON_TERM);
	let supervisor = ProcessSupervisor::new(unelevated(&exe));
	let mut rx = supervisor.subscribe();

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.start(ticket, Vec::new()).await.expect("started");
	supervisor.disconnect().await.expect("disconnect");

	assert_eq!(supervisor.status(), Status::Stopped);
	assert!(!drain(&mut rx).iter().any(|e| matches!(e, SupervisorEvent::Error { .. })));
}

#[tokio::test]
#[serial]
async fn unexpected_exit_while_running_is_an_error() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-crash", LONG_RUNNING);
	let supervisor = ProcessSupervisor::new(unelevated(&exe));

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.start(ticket, Vec::new()).await.expect("started");
	let pid = supervisor.pid().expect("pid");
	std::process::Command::new("kill")
		.args(["-KILL", &pid.to_string()])
		.status()
		.expect("kill child");

	wait_for_status(&supervisor, Status::Error).await;
	assert!(has_log(&supervisor, "Process exited unexpectedly"));

	supervisor.disconnect().await.expect("disconnect from error");
	assert_eq!(supervisor.status(), Status::Stopped);
}

#[tokio::test]
#[serial]
async fn disconnect_when_idle_only_warns() {
	let dir = TempDir::new().expect("temp dir");
	let supervisor = ProcessSupervisor::new(unelevated(&dir.path().join("unused")));
	let mut rx = supervisor.subscribe();

	supervisor.disconnect().await.expect("noop disconnect");
	assert_eq!(supervisor.status(), Status::Idle);
	assert!(status_changes(&drain(&mut rx)).is_empty());
	assert!(supervisor.logs().iter().any(|e| e.level == LogLevel::Warn && e.message == "Already disconnected"));
}

#[tokio::test]
#[serial]
async fn reset_during_start_supersedes_launch() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-reset", LONG_RUNNING);
	let config = unelevated(&exe).with_grace_window(Duration::from_secs(5));
	let supervisor = ProcessSupervisor::new(config);

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.attach_session(ticket, session(25565)).expect("attached");
	let starter = {
		let supervisor = supervisor.clone();
		tokio::spawn(async move { supervisor.start(ticket, Vec::new()).await })
	};

	tokio::time::timeout(Duration::from_secs(2), async {
		while supervisor.pid().is_none() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("child spawned");
	supervisor.reset();

	let result = starter.await.expect("join start task");
	assert!(matches!(result, Err(Error::Superseded)));
	assert_eq!(supervisor.status(), Status::Idle);
	assert!(supervisor.session().is_none());
	assert!(supervisor.logs().is_empty());
	assert!(supervisor.attach_session(ticket, session(1)).is_err());
}

#[tokio::test]
#[serial]
async fn reset_from_error_returns_to_idle() {
	let dir = TempDir::new().expect("temp dir");
	let supervisor = ProcessSupervisor::new(unelevated(&dir.path().join("absent")));

	let ticket = supervisor.admit("create session").expect("admitted");
	let _ = supervisor.start(ticket, Vec::new()).await;
	assert_eq!(supervisor.status(), Status::Error);

	supervisor.reset();
	assert_eq!(supervisor.status(), Status::Idle);
	assert!(supervisor.logs().is_empty());
	supervisor.admit("create session").expect("admitted after reset");
}

#[tokio::test]
#[serial]
async fn relaunch_from_stopped_handler_sees_finished_disconnect() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-again", LOOPING);
	let sudo = write_script(dir.path(), "fake-sudo", FAKE_SUDO);
	let supervisor = ProcessSupervisor::new(elevated(&exe, &sudo, &dir.path().join("stage")));
	supervisor.set_credential(Credential::new("hunter2"));

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.attach_session(ticket, session(25565)).expect("attached");
	supervisor.start(ticket, Vec::new()).await.expect("started");

	let mut rx = supervisor.subscribe();
	let handler = {
		let supervisor = supervisor.clone();
		let mut events = supervisor.subscribe();
		tokio::spawn(async move {
			loop {
				match events.recv().await {
					Ok(SupervisorEvent::StatusChange { status: Status::Stopped, .. }) => {
						let cleaned_up = supervisor.session().is_none() && has_log(&supervisor, "Disconnected successfully");
						return (cleaned_up, supervisor.admit("create session").is_ok());
					}
					Ok(_) => {}
					Err(err) => panic!("event stream failed: {err}"),
				}
			}
		})
	};

	supervisor.disconnect().await.expect("disconnect");
	let (cleaned_up, admitted) = tokio::time::timeout(Duration::from_secs(5), handler)
		.await
		.expect("handler saw STOPPED")
		.expect("join handler");
	assert!(cleaned_up, "STOPPED observed before disconnect finished its cleanup");
	assert!(admitted);
	assert_eq!(supervisor.status(), Status::Starting);

	let events = drain(&mut rx);
	assert_eq!(status_changes(&events), [
		(Status::Running, Status::Stopping),
		(Status::Stopping, Status::Stopped),
		(Status::Stopped, Status::Starting),
	]);
	let disconnected = events.iter().filter(|e| matches!(e, SupervisorEvent::Disconnected)).count();
	assert_eq!(disconnected, 1);

	supervisor.reset();
}

#[tokio::test]
#[serial]
async fn reset_during_disconnect_ends_it_quietly() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-hold", IGNORES_TERM);
	let config = unelevated(&exe).with_stop_timeout(Duration::from_secs(10));
	let supervisor = ProcessSupervisor::new(config);

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.attach_session(ticket, session(25565)).expect("attached");
	supervisor.start(ticket, Vec::new()).await.expect("started");
	let mut rx = supervisor.subscribe();

	let disconnecting = {
		let supervisor = supervisor.clone();
		tokio::spawn(async move { supervisor.disconnect().await })
	};
	wait_for_status(&supervisor, Status::Stopping).await;
	supervisor.reset();

	let result = tokio::time::timeout(Duration::from_secs(2), disconnecting)
		.await
		.expect("disconnect ends soon after reset")
		.expect("join disconnect task");
	assert!(result.is_ok());
	assert_eq!(supervisor.status(), Status::Idle);
	assert!(supervisor.session().is_none());
	assert!(supervisor.pid().is_none());
	assert!(supervisor.logs().is_empty());

	let events = drain(&mut rx);
	assert!(!events.iter().any(|e| matches!(e, SupervisorEvent::Disconnected)));
	assert_eq!(status_changes(&events), [(Status::Running, Status::Stopping), (Status::Stopping, Status::Idle)]);
}

#[tokio::test]
#[serial]
async fn disconnect_during_grace_window_supersedes_start() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-grace", LONG_RUNNING);
	let config = unelevated(&exe).with_grace_window(Duration::from_secs(5));
	let supervisor = ProcessSupervisor::new(config);
	let mut rx = supervisor.subscribe();

	let ticket = supervisor.admit("join session").expect("admitted");
	supervisor.attach_session(ticket, session(7777)).expect("attached");
	let starter = {
		let supervisor = supervisor.clone();
		tokio::spawn(async move { supervisor.start(ticket, Vec::new()).await })
	};
	tokio::time::timeout(Duration::from_secs(2), async {
		while supervisor.pid().is_none() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("child spawned");

	supervisor.disconnect().await.expect("disconnect");
	let result = tokio::time::timeout(Duration::from_secs(2), starter)
		.await
		.expect("start ends after disconnect")
		.expect("join start task");
	assert!(matches!(result, Err(Error::Superseded)));
	assert_eq!(supervisor.status(), Status::Stopped);
	assert!(supervisor.session().is_none());

	let events = drain(&mut rx);
	assert_eq!(status_changes(&events), [
		(Status::Idle, Status::Starting),
		(Status::Starting, Status::Stopping),
		(Status::Stopping, Status::Stopped),
	]);
	assert!(!events.iter().any(|e| matches!(e, SupervisorEvent::Connected { .. } | SupervisorEvent::Error { .. })));
	assert_eq!(events.iter().filter(|e| matches!(e, SupervisorEvent::Disconnected)).count(), 1);
}

#[tokio::test]
#[serial]
async fn concurrent_disconnects_report_once() {
	let dir = TempDir::new().expect("temp dir");
	let exe = write_script(dir.path(), "lb-mesh-twice", IGNORES_TERM);
	let config = unelevated(&exe).with_stop_timeout(Duration::from_millis(300));
	let supervisor = ProcessSupervisor::new(config);

	let ticket = supervisor.admit("create session").expect("admitted");
	supervisor.start(ticket, Vec::new()).await.expect("started");
	let mut rx = supervisor.subscribe();

	let (first, second) = tokio::join!(supervisor.disconnect(), supervisor.disconnect());
	first.expect("first disconnect");
	second.expect("second disconnect");

	assert_eq!(supervisor.status(), Status::Stopped);
	assert!(has_log(&supervisor, "Disconnect already in progress"));
	let disconnected = drain(&mut rx).iter().filter(|e| matches!(e, SupervisorEvent::Disconnected)).count();
	assert_eq!(disconnected, 1);
}
