use tracing::info;

use crate::context::CommandContext;

/// Runs the posting loop until Ctrl-C, then closes the session cleanly.
pub async fn execute(ctx: &CommandContext) -> anyhow::Result<()> {
	ctx.coordinator.warm_up();
	ctx.coordinator.start();
	println!("posting loop running; press Ctrl-C to stop");

	tokio::signal::ctrl_c().await?;
	info!(target: "kiosk.cli", "interrupt received, shutting down");
	ctx.coordinator.close().await?;
	Ok(())
}
