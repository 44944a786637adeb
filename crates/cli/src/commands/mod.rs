mod check;
mod host;
mod join;
mod watch;

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use lanbridge::{LanbridgeConfig, SessionService};

use crate::cli::{Cli, Commands};
use crate::output::OutputFormat;

/// Environment variable holding the elevation password.
pub const PASSWORD_ENV: &str = "LANBRIDGE_ELEVATION_PASSWORD";

/// Options shared by every command.
pub struct CommandContext {
	pub config: LanbridgeConfig,
	pub format: OutputFormat,
	pub password_stdin: bool,
}

impl CommandContext {
	pub fn load(config_path: Option<&Path>, executable: Option<std::path::PathBuf>, format: OutputFormat, password_stdin: bool) -> Result<Self> {
		let mut config = LanbridgeConfig::load_or_default(config_path)?;
		if executable.is_some() {
			config.executable = executable;
		}
		Ok(Self {
			config,
			format,
			password_stdin,
		})
	}

	/// Builds the session service and hands it the elevation credential when needed.
	pub fn service(&self) -> Result<SessionService> {
		let service = SessionService::from_config(&self.config)?;
		if service.requires_elevation() {
			if let Some(secret) = self.credential()? {
				service.set_credential(secret);
			}
		}
		Ok(service)
	}

	fn credential(&self) -> Result<Option<String>> {
		if self.password_stdin {
			let mut line = String::new();
			std::io::stdin().lock().read_line(&mut line).context("failed to read password from stdin")?;
			let secret = line.trim_end_matches(['\r', '\n']).to_string();
			return Ok((!secret.is_empty()).then_some(secret));
		}
		Ok(std::env::var(PASSWORD_ENV).ok().filter(|secret| !secret.is_empty()))
	}
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = CommandContext::load(cli.config.as_deref(), cli.executable, cli.format, cli.password_stdin)?;

	match cli.command {
		Commands::Host { port, name, nodes } => host::execute(&ctx, port, name.as_deref(), &nodes).await,
		Commands::Join { code, player, nodes } => join::execute(&ctx, &code, &player, &nodes).await,
		Commands::Check => check::execute(&ctx),
	}
}
