//! Rendering of sessions and supervisor events.

use clap::ValueEnum;
use colored::Colorize;
use lanbridge_protocol::{LogEntry, LogLevel, SessionInfo, SupervisorEvent};
use serde::Serialize;

/// Output format for command results and streamed events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// Pretty-printed JSON
	Json,
	/// Newline-delimited JSON (streaming)
	Ndjson,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Ndjson => write!(f, "ndjson"),
		}
	}
}

/// Serializes a command result in `format`. Text falls back to pretty JSON.
pub fn render_value<T: Serialize>(value: &T, format: OutputFormat) -> serde_json::Result<String> {
	match format {
		OutputFormat::Ndjson => serde_json::to_string(value),
		OutputFormat::Text | OutputFormat::Json => serde_json::to_string_pretty(value),
	}
}

pub fn render_session(session: &SessionInfo, format: OutputFormat) -> serde_json::Result<String> {
	if format != OutputFormat::Text {
		return render_value(session, format);
	}

	let mut out = format!("{} {}\n", "Invitation code:".bold(), session.invitation_code.green());
	out.push_str(&format!("{} {}\n", "Role:".bold(), session.role));
	out.push_str(&format!("{} {}\n", "Port:".bold(), session.port));
	out.push_str(&format!("{} {}", "Host address:".bold(), session.host_ip));
	if let Some(label) = &session.room_label {
		out.push_str(&format!("\n{} {label}", "Room:".bold()));
	}
	if let Some(player) = &session.player_name {
		out.push_str(&format!("\n{} {player}", "Player:".bold()));
	}
	Ok(out)
}

/// Renders one streamed event; `None` when text mode has nothing to show.
pub fn render_event(event: &SupervisorEvent, format: OutputFormat) -> Option<String> {
	match format {
		OutputFormat::Text => render_event_text(event),
		OutputFormat::Json | OutputFormat::Ndjson => serde_json::to_string(event).ok(),
	}
}

fn render_event_text(event: &SupervisorEvent) -> Option<String> {
	match event {
		SupervisorEvent::Log { entry } => Some(render_log(entry)),
		SupervisorEvent::StatusChange { status, previous } => Some(format!("{} {previous} -> {}", "status".cyan(), status.to_string().bold())),
		SupervisorEvent::Error { fault } => Some(format!("{} {}", "error".red().bold(), fault.message)),
		SupervisorEvent::Connected { .. } => Some("connected".green().bold().to_string()),
		SupervisorEvent::Disconnected => Some("disconnected".yellow().to_string()),
	}
}

fn render_log(entry: &LogEntry) -> String {
	let tag = format!("[{:?}]", entry.source).to_lowercase();
	let tag = match entry.level {
		LogLevel::Error => tag.red(),
		LogLevel::Warn => tag.yellow(),
		LogLevel::Info => tag.normal(),
		LogLevel::Debug => tag.dimmed(),
	};
	format!("{tag} {}", entry.message)
}
