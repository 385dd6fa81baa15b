use clap::Parser;
use kiosk_cli::{cli::Cli, commands, context::CommandContext, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let ctx = match CommandContext::new(cli.config, cli.headful).await {
		Ok(ctx) => ctx,
		Err(err) => {
			error!(target: "kiosk.cli", error = %err, "startup failed");
			std::process::exit(1);
		}
	};

	if let Err(err) = commands::dispatch(cli.command, ctx).await {
		error!(target: "kiosk.cli", error = %err, "command failed");
		std::process::exit(1);
	}
}
