use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use super::CommandContext;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
	platform: String,
	requires_elevation: bool,
	executable: Option<String>,
	executable_error: Option<String>,
	staging_dir: String,
	nodes: Vec<String>,
}

pub fn execute(ctx: &CommandContext) -> Result<()> {
	let runtime = ctx.config.supervisor_config(PathBuf::new());
	let (executable, executable_error) = match ctx.config.resolve_executable() {
		Ok(path) => (Some(path.display().to_string()), None),
		Err(err) => (None, Some(err.to_string())),
	};

	let report = CheckReport {
		platform: runtime.platform.to_string(),
		requires_elevation: runtime.requires_elevation(),
		executable,
		executable_error,
		staging_dir: runtime.staging_dir.display().to_string(),
		nodes: ctx.config.nodes.clone(),
	};
	println!("{}", output::render_value(&report, ctx.format)?);
	Ok(())
}
