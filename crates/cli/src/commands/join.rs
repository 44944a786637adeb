use anyhow::Result;
use tracing::info;

use super::CommandContext;
use super::watch;
use crate::output;

pub async fn execute(ctx: &CommandContext, code: &str, player: &str, nodes: &[String]) -> Result<()> {
	info!(target = "lanbridge", player, nodes = nodes.len(), "join");
	let service = ctx.service()?;
	let events = service.subscribe();

	let session = match service.join_session(code, player, nodes).await {
		Ok(session) => session,
		Err(err) => {
			watch::flush(events, ctx.format);
			return Err(err.into());
		}
	};
	println!("{}", output::render_session(&session, ctx.format)?);

	watch::until_stopped(&service, events, ctx.format).await
}
