use std::time::Duration;

use crate::context::CommandContext;

pub async fn reset(ctx: &CommandContext) -> anyhow::Result<()> {
	ctx.coordinator.reset_session().await?;
	println!("session, credentials, and reply ledger cleared");
	Ok(())
}

pub async fn purge(ctx: &CommandContext, older_than: Option<u64>) -> anyhow::Result<()> {
	match older_than {
		Some(secs) => {
			let removed = ctx
				.coordinator
				.purge_replies_older_than(Duration::from_secs(secs))?;
			println!("removed {removed} entries");
		}
		None => {
			let had = ctx.coordinator.reply_ledger_len();
			ctx.coordinator.purge_replies()?;
			println!("removed {had} entries");
		}
	}
	ctx.coordinator.close().await?;
	Ok(())
}
