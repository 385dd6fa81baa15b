mod login;
mod maintain;
mod query;
mod reply;
mod run;

use crate::cli::Commands;
use crate::context::CommandContext;

pub async fn dispatch(command: Commands, ctx: CommandContext) -> anyhow::Result<()> {
	match command {
		Commands::Run => run::execute(&ctx).await,
		Commands::Balance => query::balance(&ctx).await,
		Commands::Totals => query::totals(&ctx).await,
		Commands::Orders { limit } => query::orders(&ctx, limit).await,
		Commands::Dialogs { unread } => query::dialogs(&ctx, unread).await,
		Commands::Reply { conversation_id, text } => reply::to_dialog(&ctx, &conversation_id, &text).await,
		Commands::ReplyFirst { text } => reply::first_unread(&ctx, &text).await,
		Commands::Login { login, password, save } => {
			login::with_credentials(&ctx, login, password, save).await
		}
		Commands::CookieLogin { header } => login::with_cookie_header(&ctx, &header).await,
		Commands::Status => login::status(&ctx).await,
		Commands::Reset => maintain::reset(&ctx).await,
		Commands::Purge { older_than } => maintain::purge(&ctx, older_than).await,
	}
}
