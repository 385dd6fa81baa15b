//! Sending a chat message into a conversation.
//!
//! The send path reports success as a plain `bool`. Any failure along the
//! way, from navigation to the submit click, logs and resolves to `false`;
//! callers never see an error from here.

use tracing::{debug, warn};

use crate::config::Config;
use crate::driver::{Driver, Element};
use crate::surface::{locate_first, Surface};

/// Sends `text` into the currently open conversation, or into the
/// conversation named by `conversation_id` after navigating to it.
pub async fn send(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
	conversation_id: Option<&str>,
	text: &str,
) -> bool {
	match try_send(driver, config, surface, conversation_id, text).await {
		Ok(sent) => sent,
		Err(err) => {
			warn!(target: "kiosk.reply", ?err, "send failed");
			false
		}
	}
}

async fn try_send(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
	conversation_id: Option<&str>,
	text: &str,
) -> Result<bool, crate::error::DriverError> {
	if let Some(id) = conversation_id {
		surface.ensure_at(driver, &config.conversation_url(id)).await?;
		tokio::time::sleep(config.settle_short()).await;
	}

	let Some(input) = find_input(driver, config, surface).await? else {
		warn!(target: "kiosk.reply", "no chat input found");
		return Ok(false);
	};

	if driver.clear(surface.id, input).await.is_err() {
		debug!(target: "kiosk.reply", "clear failed, typing over existing content");
	}

	// Token-by-token typing keeps the page's input handlers engaged; a bulk
	// fill is the fallback when keystroke simulation breaks.
	let mut typed = true;
	for (i, token) in text.split(' ').enumerate() {
		let chunk = if i == 0 { token.to_string() } else { format!(" {}", token) };
		if driver.type_text(surface.id, input, &chunk).await.is_err() {
			typed = false;
			break;
		}
	}
	if !typed {
		driver.fill(surface.id, input, text).await?;
	}

	let submitted = match locate_first(driver, surface.id, &config.selectors.chat_send).await {
		Some(button) => driver.click(surface.id, button).await.is_ok(),
		None => false,
	};
	if !submitted {
		driver.press(surface.id, input, "Enter").await?;
	}

	tokio::time::sleep(config.settle_short()).await;
	debug!(target: "kiosk.reply", conversation = conversation_id.unwrap_or("current"), "message sent");
	Ok(true)
}

/// Finds a visible chat input, clicking an open-chat affordance and retrying
/// once when the composer is collapsed.
async fn find_input(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
) -> Result<Option<Element>, crate::error::DriverError> {
	if let Some(input) = visible_input(driver, config, surface).await {
		return Ok(Some(input));
	}

	if let Some(opener) = locate_first(driver, surface.id, &config.selectors.open_chat).await {
		if driver.click(surface.id, opener).await.is_ok() {
			tokio::time::sleep(config.settle_short()).await;
			if let Some(input) = visible_input(driver, config, surface).await {
				return Ok(Some(input));
			}
			// One longer settle for slow composer animations.
			tokio::time::sleep(config.settle()).await;
			return Ok(visible_input(driver, config, surface).await);
		}
	}
	Ok(None)
}

async fn visible_input(driver: &dyn Driver, config: &Config, surface: &Surface) -> Option<Element> {
	for selector in &config.selectors.chat_input {
		match driver.locate(surface.id, selector).await {
			Ok(Some(element)) => {
				if driver.is_visible(surface.id, element).await.unwrap_or(false) {
					return Some(element);
				}
			}
			Ok(None) => {}
			Err(err) => {
				warn!(target: "kiosk.reply", selector, ?err, "input candidate failed");
			}
		}
	}
	None
}
