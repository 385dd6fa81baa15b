use anyhow::bail;

use crate::context::CommandContext;

pub async fn to_dialog(ctx: &CommandContext, conversation_id: &str, text: &str) -> anyhow::Result<()> {
	let sent = ctx.coordinator.reply_to_dialog(conversation_id, text).await;
	ctx.coordinator.close().await?;
	if !sent {
		bail!("message was not sent");
	}
	println!("sent");
	Ok(())
}

pub async fn first_unread(ctx: &CommandContext, text: &str) -> anyhow::Result<()> {
	let sent = ctx.coordinator.reply_first_unread(text).await;
	ctx.coordinator.close().await?;
	if !sent {
		bail!("no dialog answered");
	}
	println!("sent");
	Ok(())
}
