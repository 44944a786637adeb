//! Event streaming while a session runs.

use anyhow::Result;
use lanbridge::{SessionService, Status, SupervisorEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::output::{self, OutputFormat};

/// Prints events until the process stops or fails, or Ctrl-C is pressed.
/// Disconnects before returning.
pub async fn until_stopped(service: &SessionService, mut events: broadcast::Receiver<SupervisorEvent>, format: OutputFormat) -> Result<()> {
	let outcome = loop {
		tokio::select! {
			signal = tokio::signal::ctrl_c() => {
				if let Err(err) = signal {
					warn!(target = "lanbridge", error = %err, "failed to listen for ctrl-c");
				}
				break Ok(());
			}
			event = events.recv() => match event {
				Ok(event) => {
					print_event(&event, format);
					match event {
						SupervisorEvent::StatusChange { status: Status::Error, .. } => break Err(status_error(service)),
						SupervisorEvent::StatusChange { status: Status::Stopped | Status::Idle, .. } => break Ok(()),
						_ => {}
					}
				}
				Err(RecvError::Lagged(skipped)) => debug!(target = "lanbridge", skipped, "event stream lagged"),
				Err(RecvError::Closed) => break Ok(()),
			}
		}
	};

	service.disconnect().await?;
	flush(events, format);
	outcome
}

/// Prints whatever is already queued without waiting.
pub fn flush(mut events: broadcast::Receiver<SupervisorEvent>, format: OutputFormat) {
	loop {
		match events.try_recv() {
			Ok(event) => print_event(&event, format),
			Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
			Err(_) => break,
		}
	}
}

fn print_event(event: &SupervisorEvent, format: OutputFormat) {
	if let Some(line) = output::render_event(event, format) {
		eprintln!("{line}");
	}
}

fn status_error(service: &SessionService) -> anyhow::Error {
	let last = service
		.logs()
		.into_iter()
		.rev()
		.find(|entry| entry.level == lanbridge::LogLevel::Error)
		.map(|entry| entry.message);
	match last {
		Some(message) => anyhow::anyhow!("session failed: {message}"),
		None => anyhow::anyhow!("session failed"),
	}
}
