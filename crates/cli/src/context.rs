//! Shared command setup: config, browser, coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use kiosk::driver::ChromiumDriver;
use kiosk::{Config, Coordinator};
use tracing::info;

pub struct CommandContext {
	pub coordinator: Arc<Coordinator>,
}

impl CommandContext {
	/// Loads config, launches the browser, and prepares the coordinator.
	///
	/// The browser runs headless only when a saved session blob exists; a
	/// fresh setup (or `--headful`) gets a visible window so a human can
	/// log in and pass captchas.
	pub async fn new(config_path: Option<PathBuf>, headful: bool) -> anyhow::Result<Self> {
		let mut config = match &config_path {
			Some(path) => Config::load(path),
			None => Config::load(&PathBuf::from("kiosk.json")),
		};
		config.apply_env();

		let headless = config.headless && config.session_exists() && !headful;
		info!(target: "kiosk.cli", headless, "launching browser");
		let driver = ChromiumDriver::launch(headless)
			.await
			.context("browser launch failed")?;

		let coordinator = Arc::new(Coordinator::new(Arc::new(driver), config));
		coordinator.prepare().await.context("surface preparation failed")?;
		Ok(Self { coordinator })
	}
}
