//! Purpose-bound browser tabs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::driver::{Driver, Element, SurfaceId};
use crate::error::DriverError;

/// What a tab is for. Each purpose has a home URL it is parked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
	Services,
	Chat,
	Orders,
	Finance,
}

impl Purpose {
	pub const ALL: [Purpose; 4] = [Purpose::Services, Purpose::Chat, Purpose::Orders, Purpose::Finance];

	pub fn home_url(self, config: &Config) -> String {
		match self {
			Purpose::Services => config.section_url.clone(),
			Purpose::Chat => config.chat_url(),
			Purpose::Orders => config.orders_url(),
			Purpose::Finance => config.finance_url(),
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Purpose::Services => "services",
			Purpose::Chat => "chat",
			Purpose::Orders => "orders",
			Purpose::Finance => "finance",
		}
	}
}

/// One open tab plus the URL it was last pointed at.
#[derive(Debug, Clone)]
pub struct Surface {
	pub purpose: Purpose,
	pub id: SurfaceId,
	current_location: Option<String>,
}

impl Surface {
	pub fn new(purpose: Purpose, id: SurfaceId) -> Self {
		Self { purpose, id, current_location: None }
	}

	/// Navigates unless the tab already sits at `url`. Returns whether a
	/// navigation actually happened.
	pub async fn ensure_at(&mut self, driver: &dyn Driver, url: &str) -> Result<bool, DriverError> {
		if self.current_location.as_deref() == Some(url) && driver.is_live(self.id).await {
			return Ok(false);
		}
		self.navigate(driver, url).await?;
		Ok(true)
	}

	pub async fn navigate(&mut self, driver: &dyn Driver, url: &str) -> Result<(), DriverError> {
		driver.navigate(self.id, url).await?;
		self.current_location = Some(url.to_string());
		debug!(target: "kiosk.surface", purpose = self.purpose.name(), url, "navigated");
		Ok(())
	}

	pub fn location(&self) -> Option<&str> {
		self.current_location.as_deref()
	}
}

/// Tries each selector candidate in order and returns the first hit.
///
/// A candidate that errors is logged and skipped, so one bad selector in a
/// config never sinks the whole lookup. Only "no candidate matched" surfaces
/// as `None`.
pub async fn locate_first(
	driver: &dyn Driver,
	surface: SurfaceId,
	candidates: &[String],
) -> Option<Element> {
	for selector in candidates {
		match driver.locate(surface, selector).await {
			Ok(Some(element)) => return Some(element),
			Ok(None) => {}
			Err(err) => {
				warn!(target: "kiosk.surface", selector, ?err, "selector candidate failed");
			}
		}
	}
	None
}

/// Like [`locate_first`] but returns every match of the first candidate that
/// has any.
pub async fn locate_all_first(
	driver: &dyn Driver,
	surface: SurfaceId,
	candidates: &[String],
) -> Vec<Element> {
	for selector in candidates {
		match driver.locate_all(surface, selector).await {
			Ok(found) if !found.is_empty() => return found,
			Ok(_) => {}
			Err(err) => {
				warn!(target: "kiosk.surface", selector, ?err, "selector candidate failed");
			}
		}
	}
	Vec::new()
}

/// Scoped variant of [`locate_first`], searching under one element.
pub async fn locate_within_first(
	driver: &dyn Driver,
	surface: SurfaceId,
	scope: Element,
	candidates: &[String],
) -> Option<Element> {
	for selector in candidates {
		match driver.locate_within(surface, scope, selector).await {
			Ok(Some(element)) => return Some(element),
			Ok(None) => {}
			Err(err) => {
				warn!(target: "kiosk.surface", selector, ?err, "scoped selector candidate failed");
			}
		}
	}
	None
}

/// The set of purpose-bound tabs the coordinator works through.
#[derive(Debug, Default)]
pub struct SurfaceSet {
	surfaces: HashMap<Purpose, Surface>,
}

impl SurfaceSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the tab for `purpose`, opening it at its home URL first if it
	/// does not exist or died.
	pub async fn ensure(
		&mut self,
		driver: &Arc<dyn Driver>,
		config: &Config,
		purpose: Purpose,
	) -> Result<&mut Surface, DriverError> {
		let reopen = match self.surfaces.get(&purpose) {
			Some(surface) => !driver.is_live(surface.id).await,
			None => true,
		};
		if reopen {
			let url = purpose.home_url(config);
			let id = driver.open_surface(&url).await?;
			let mut surface = Surface::new(purpose, id);
			surface.current_location = Some(url);
			self.surfaces.insert(purpose, surface);
			debug!(target: "kiosk.surface", purpose = purpose.name(), "opened surface");
		}
		self.surfaces.get_mut(&purpose).ok_or(DriverError::SurfaceClosed)
	}

	/// Closes every tab, ignoring individual close failures.
	pub async fn close_all(&mut self, driver: &Arc<dyn Driver>) {
		for (purpose, surface) in self.surfaces.drain() {
			if let Err(err) = driver.close_surface(surface.id).await {
				warn!(target: "kiosk.surface", purpose = purpose.name(), ?err, "close failed");
			}
		}
	}

	pub fn get(&self, purpose: Purpose) -> Option<&Surface> {
		self.surfaces.get(&purpose)
	}
}
