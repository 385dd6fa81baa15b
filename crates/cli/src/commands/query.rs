use crate::context::CommandContext;

pub async fn balance(ctx: &CommandContext) -> anyhow::Result<()> {
	let balance = ctx.coordinator.fetch_balance().await?;
	println!("{balance}");
	ctx.coordinator.close().await?;
	Ok(())
}

pub async fn totals(ctx: &CommandContext) -> anyhow::Result<()> {
	let totals = ctx.coordinator.fetch_trade_totals().await?;
	println!("paid:     {:.2} ({} rows)", totals.paid, totals.paid_count);
	println!("closed:   {:.2} ({} rows)", totals.closed, totals.closed_count);
	println!("refunded: {:.2} ({} rows)", totals.refunded, totals.refunded_count);
	println!("total:    {:.2}", totals.total());
	ctx.coordinator.close().await?;
	Ok(())
}

pub async fn orders(ctx: &CommandContext, limit: usize) -> anyhow::Result<()> {
	let orders = ctx.coordinator.fetch_active_orders(limit).await?;
	if orders.is_empty() {
		println!("no active orders");
	}
	for order in &orders {
		let amount = order
			.amount
			.map(|a| format!("{a:.2}"))
			.unwrap_or_else(|| order.amount_text.clone());
		println!("#{}  {}  {}  {}", order.id, order.buyer, amount, order.description);
	}
	ctx.coordinator.close().await?;
	Ok(())
}

pub async fn dialogs(ctx: &CommandContext, unread_only: bool) -> anyhow::Result<()> {
	let dialogs = if unread_only {
		ctx.coordinator.unread_dialogs().await?
	} else {
		ctx.coordinator.dialogs().await?
	};
	if dialogs.is_empty() {
		println!("no dialogs");
	}
	for dialog in &dialogs {
		let marker = if dialog.unread { "*" } else { " " };
		println!("{marker} {}  {}", dialog.conversation_id, dialog.name);
	}
	ctx.coordinator.close().await?;
	Ok(())
}
