//! Browser driver boundary.
//!
//! The coordinator never touches a browser crate directly. Everything it
//! needs is expressed through [`Driver`], which [`ChromiumDriver`] backs in
//! production and [`FakeDriver`] backs in tests with scripted pages.

mod chromium;
mod fake;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chromium::ChromiumDriver;
pub use fake::{FakeAction, FakeController, FakeDriver, ScriptedNode, ScriptedPage};

use crate::error::DriverError;

/// Handle to one open browser tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

/// Handle to a located DOM node, valid until the next navigation of its
/// surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Element(pub u64);

/// One cookie of a persisted session blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCookie {
	pub name: String,
	pub value: String,
	pub domain: String,
	#[serde(default = "root_path")]
	pub path: String,
	#[serde(default)]
	pub secure: bool,
	#[serde(default)]
	pub http_only: bool,
}

fn root_path() -> String {
	"/".to_string()
}

/// Abstract browser operations the coordinator drives.
///
/// Lookup methods return `Ok(None)` / an empty vec when nothing matches, and
/// reserve `Err` for transport failures, so ordered-fallback callers can tell
/// "not on this page" apart from "the page is gone".
#[async_trait]
pub trait Driver: Send + Sync {
	/// Opens a new tab at the given URL.
	async fn open_surface(&self, url: &str) -> Result<SurfaceId, DriverError>;
	async fn close_surface(&self, surface: SurfaceId) -> Result<(), DriverError>;
	/// Whether the tab still responds.
	async fn is_live(&self, surface: SurfaceId) -> bool;

	async fn navigate(&self, surface: SurfaceId, url: &str) -> Result<(), DriverError>;
	async fn current_url(&self, surface: SurfaceId) -> Result<String, DriverError>;

	async fn locate(&self, surface: SurfaceId, selector: &str) -> Result<Option<Element>, DriverError>;
	async fn locate_all(&self, surface: SurfaceId, selector: &str) -> Result<Vec<Element>, DriverError>;
	async fn locate_within(
		&self,
		surface: SurfaceId,
		element: Element,
		selector: &str,
	) -> Result<Option<Element>, DriverError>;

	async fn read_text(&self, surface: SurfaceId, element: Element) -> Result<String, DriverError>;
	async fn attribute(
		&self,
		surface: SurfaceId,
		element: Element,
		name: &str,
	) -> Result<Option<String>, DriverError>;
	async fn is_visible(&self, surface: SurfaceId, element: Element) -> Result<bool, DriverError>;

	async fn click(&self, surface: SurfaceId, element: Element) -> Result<(), DriverError>;
	async fn clear(&self, surface: SurfaceId, element: Element) -> Result<(), DriverError>;
	async fn type_text(&self, surface: SurfaceId, element: Element, text: &str) -> Result<(), DriverError>;
	/// Sets the value in one shot, bypassing keystroke simulation.
	async fn fill(&self, surface: SurfaceId, element: Element, text: &str) -> Result<(), DriverError>;
	async fn press(&self, surface: SurfaceId, element: Element, key: &str) -> Result<(), DriverError>;

	/// Full visible text of the page body.
	async fn page_text(&self, surface: SurfaceId) -> Result<String, DriverError>;
	/// Raw HTML content of the page.
	async fn content(&self, surface: SurfaceId) -> Result<String, DriverError>;
	async fn screenshot(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError>;

	/// Persists the browser session blob (cookie jar) to the given path.
	async fn save_session_state(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError>;
	/// Loads a previously saved session blob back into the browser. A
	/// missing file is a no-op.
	async fn restore_session_state(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError>;
	async fn inject_cookies(&self, surface: SurfaceId, cookies: &[StoredCookie]) -> Result<(), DriverError>;

	/// Tears down the whole browser.
	async fn shutdown(&self) -> Result<(), DriverError>;
}
