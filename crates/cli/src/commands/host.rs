use anyhow::Result;
use tracing::info;

use super::CommandContext;
use super::watch;
use crate::output;

pub async fn execute(ctx: &CommandContext, port: u16, name: Option<&str>, nodes: &[String]) -> Result<()> {
	info!(target = "lanbridge", port, name = ?name, nodes = nodes.len(), "host");
	let service = ctx.service()?;
	let events = service.subscribe();

	let session = match service.create_session(port, name, nodes).await {
		Ok(session) => session,
		Err(err) => {
			watch::flush(events, ctx.format);
			return Err(err.into());
		}
	};
	println!("{}", output::render_session(&session, ctx.format)?);

	watch::until_stopped(&service, events, ctx.format).await
}
