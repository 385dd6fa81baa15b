use anyhow::bail;
use kiosk::login::Credentials;

use crate::context::CommandContext;

pub async fn with_credentials(
	ctx: &CommandContext,
	login: Option<String>,
	password: Option<String>,
	save: bool,
) -> anyhow::Result<()> {
	match (login, password) {
		(Some(login), Some(password)) => {
			let credentials = Credentials { login, password };
			ctx.coordinator.login_with_credentials(&credentials, save).await?;
		}
		(None, None) => {
			if !ctx.coordinator.login_with_saved_credentials().await? {
				bail!("no saved credentials; pass LOGIN and PASSWORD");
			}
		}
		_ => bail!("LOGIN and PASSWORD go together"),
	}
	println!("logged in");
	ctx.coordinator.close().await?;
	Ok(())
}

pub async fn with_cookie_header(ctx: &CommandContext, header: &str) -> anyhow::Result<()> {
	ctx.coordinator.login_with_cookie_header(header).await?;
	println!("session imported");
	ctx.coordinator.close().await?;
	Ok(())
}

pub async fn status(ctx: &CommandContext) -> anyhow::Result<()> {
	let logged_in = ctx.coordinator.logged_in().await?;
	println!("{}", if logged_in { "signed in" } else { "signed out" });
	ctx.coordinator.close().await?;
	Ok(())
}
