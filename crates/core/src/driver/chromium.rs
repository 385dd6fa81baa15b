//! Chromium-backed driver.
//!
//! Owns one headless (or headful) Chromium instance and maps the [`Driver`]
//! trait onto CDP calls. Element handles are kept in a registry and dropped
//! whenever their surface navigates, since the underlying remote objects do
//! not survive a page load.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Driver, Element, StoredCookie, SurfaceId};
use crate::error::DriverError;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

fn call_err(err: impl ToString) -> DriverError {
	DriverError::Call(err.to_string())
}

pub struct ChromiumDriver {
	browser: tokio::sync::Mutex<Browser>,
	pages: Mutex<HashMap<SurfaceId, Page>>,
	elements: Mutex<HashMap<u64, (SurfaceId, Arc<chromiumoxide::Element>)>>,
	next_surface: AtomicU64,
	next_element: AtomicU64,
	_handler_task: JoinHandle<()>,
}

impl ChromiumDriver {
	/// Launches a Chromium instance. `headless` is decided by the caller
	/// from session availability.
	pub async fn launch(headless: bool) -> Result<Self, DriverError> {
		let mut builder = BrowserConfig::builder()
			.arg("--disable-blink-features=AutomationControlled")
			.arg("--disable-dev-shm-usage")
			.arg("--no-first-run")
			.arg("--no-default-browser-check")
			.window_size(1280, 900);
		if headless {
			// Unattended mode can afford to skip heavy resources; a headful
			// window keeps them so captchas render properly.
			builder = builder
				.arg("--blink-settings=imagesEnabled=false")
				.arg("--mute-audio");
		} else {
			builder = builder.with_head();
		}
		let config = builder.build().map_err(DriverError::Launch)?;
		let (browser, mut handler) = Browser::launch(config)
			.await
			.map_err(|err| DriverError::Launch(err.to_string()))?;

		// The handler stream must be drained for the browser to make
		// progress; it ends when the browser goes away.
		let handler_task = tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if let Err(err) = event {
					debug!(target: "kiosk.driver", ?err, "handler event error");
				}
			}
		});

		debug!(target: "kiosk.driver", headless, "browser launched");
		Ok(Self {
			browser: tokio::sync::Mutex::new(browser),
			pages: Mutex::new(HashMap::new()),
			elements: Mutex::new(HashMap::new()),
			next_surface: AtomicU64::new(0),
			next_element: AtomicU64::new(0),
			_handler_task: handler_task,
		})
	}

	fn page(&self, surface: SurfaceId) -> Result<Page, DriverError> {
		self.pages.lock().get(&surface).cloned().ok_or(DriverError::SurfaceClosed)
	}

	fn element(&self, element: Element) -> Result<Arc<chromiumoxide::Element>, DriverError> {
		self.elements
			.lock()
			.get(&element.0)
			.map(|(_, el)| el.clone())
			.ok_or_else(|| DriverError::Call("unknown element handle".to_string()))
	}

	fn register(&self, surface: SurfaceId, element: chromiumoxide::Element) -> Element {
		let id = self.next_element.fetch_add(1, Ordering::Relaxed) + 1;
		self.elements.lock().insert(id, (surface, Arc::new(element)));
		Element(id)
	}

	fn drop_elements_of(&self, surface: SurfaceId) {
		self.elements.lock().retain(|_, (owner, _)| *owner != surface);
	}
}

#[async_trait]
impl Driver for ChromiumDriver {
	async fn open_surface(&self, url: &str) -> Result<SurfaceId, DriverError> {
		let browser = self.browser.lock().await;
		let page = tokio::time::timeout(NAVIGATION_TIMEOUT, browser.new_page(url))
			.await
			.map_err(|_| DriverError::Navigation { url: url.to_string(), reason: "timeout".to_string() })?
			.map_err(|err| DriverError::Navigation { url: url.to_string(), reason: err.to_string() })?;
		drop(browser);

		let id = SurfaceId(self.next_surface.fetch_add(1, Ordering::Relaxed) + 1);
		self.pages.lock().insert(id, page);
		debug!(target: "kiosk.driver", surface = id.0, url, "surface opened");
		Ok(id)
	}

	async fn close_surface(&self, surface: SurfaceId) -> Result<(), DriverError> {
		let page = self.pages.lock().remove(&surface).ok_or(DriverError::SurfaceClosed)?;
		self.drop_elements_of(surface);
		page.close().await.map_err(call_err)?;
		Ok(())
	}

	async fn is_live(&self, surface: SurfaceId) -> bool {
		let Ok(page) = self.page(surface) else {
			return false;
		};
		page.url().await.is_ok()
	}

	async fn navigate(&self, surface: SurfaceId, url: &str) -> Result<(), DriverError> {
		let page = self.page(surface)?;
		self.drop_elements_of(surface);
		tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(url))
			.await
			.map_err(|_| DriverError::Navigation { url: url.to_string(), reason: "timeout".to_string() })?
			.map_err(|err| DriverError::Navigation { url: url.to_string(), reason: err.to_string() })?;
		if let Err(err) = page.wait_for_navigation().await {
			debug!(target: "kiosk.driver", ?err, "navigation wait ended early");
		}
		Ok(())
	}

	async fn current_url(&self, surface: SurfaceId) -> Result<String, DriverError> {
		let page = self.page(surface)?;
		Ok(page.url().await.map_err(call_err)?.unwrap_or_default())
	}

	async fn locate(&self, surface: SurfaceId, selector: &str) -> Result<Option<Element>, DriverError> {
		let page = self.page(surface)?;
		match tokio::time::timeout(LOOKUP_TIMEOUT, page.find_element(selector)).await {
			Ok(Ok(element)) => Ok(Some(self.register(surface, element))),
			// No match and lookup timeout both resolve to "not here".
			Ok(Err(_)) | Err(_) => Ok(None),
		}
	}

	async fn locate_all(&self, surface: SurfaceId, selector: &str) -> Result<Vec<Element>, DriverError> {
		let page = self.page(surface)?;
		match tokio::time::timeout(LOOKUP_TIMEOUT, page.find_elements(selector)).await {
			Ok(Ok(elements)) => {
				Ok(elements.into_iter().map(|el| self.register(surface, el)).collect())
			}
			Ok(Err(_)) | Err(_) => Ok(Vec::new()),
		}
	}

	async fn locate_within(
		&self,
		surface: SurfaceId,
		element: Element,
		selector: &str,
	) -> Result<Option<Element>, DriverError> {
		let scope = self.element(element)?;
		match tokio::time::timeout(LOOKUP_TIMEOUT, scope.find_element(selector)).await {
			Ok(Ok(found)) => Ok(Some(self.register(surface, found))),
			Ok(Err(_)) | Err(_) => Ok(None),
		}
	}

	async fn read_text(&self, _surface: SurfaceId, element: Element) -> Result<String, DriverError> {
		let element = self.element(element)?;
		Ok(element.inner_text().await.map_err(call_err)?.unwrap_or_default())
	}

	async fn attribute(
		&self,
		_surface: SurfaceId,
		element: Element,
		name: &str,
	) -> Result<Option<String>, DriverError> {
		let element = self.element(element)?;
		element.attribute(name).await.map_err(call_err)
	}

	async fn is_visible(&self, _surface: SurfaceId, element: Element) -> Result<bool, DriverError> {
		let element = self.element(element)?;
		let result = element
			.call_js_fn(
				"function() { \
					const rect = this.getBoundingClientRect(); \
					if (!rect.width && !rect.height) return false; \
					return getComputedStyle(this).visibility !== 'hidden'; \
				}",
				false,
			)
			.await
			.map_err(call_err)?;
		Ok(result.result.value.and_then(|v| v.as_bool()).unwrap_or(false))
	}

	async fn click(&self, _surface: SurfaceId, element: Element) -> Result<(), DriverError> {
		let element = self.element(element)?;
		element.click().await.map_err(call_err)?;
		Ok(())
	}

	async fn clear(&self, _surface: SurfaceId, element: Element) -> Result<(), DriverError> {
		let element = self.element(element)?;
		element
			.call_js_fn(
				"function() { \
					if ('value' in this) { this.value = ''; } else { this.textContent = ''; } \
					this.dispatchEvent(new Event('input', { bubbles: true })); \
				}",
				false,
			)
			.await
			.map_err(call_err)?;
		Ok(())
	}

	async fn type_text(&self, _surface: SurfaceId, element: Element, text: &str) -> Result<(), DriverError> {
		let element = self.element(element)?;
		element.focus().await.map_err(call_err)?;
		element.type_str(text).await.map_err(call_err)?;
		Ok(())
	}

	async fn fill(&self, _surface: SurfaceId, element: Element, text: &str) -> Result<(), DriverError> {
		let element = self.element(element)?;
		let literal = serde_json::to_string(text).map_err(call_err)?;
		let js = format!(
			"function() {{ \
				const v = {literal}; \
				if ('value' in this) {{ this.value = v; }} else {{ this.textContent = v; }} \
				this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
				this.dispatchEvent(new Event('change', {{ bubbles: true }})); \
			}}"
		);
		element.call_js_fn(&js, false).await.map_err(call_err)?;
		Ok(())
	}

	async fn press(&self, _surface: SurfaceId, element: Element, key: &str) -> Result<(), DriverError> {
		let element = self.element(element)?;
		element.focus().await.map_err(call_err)?;
		element.press_key(key).await.map_err(call_err)?;
		Ok(())
	}

	async fn page_text(&self, surface: SurfaceId) -> Result<String, DriverError> {
		let page = self.page(surface)?;
		let result = page
			.evaluate("document.body ? document.body.innerText : ''")
			.await
			.map_err(call_err)?;
		Ok(result.value().and_then(|v| v.as_str()).unwrap_or_default().to_string())
	}

	async fn content(&self, surface: SurfaceId) -> Result<String, DriverError> {
		let page = self.page(surface)?;
		page.content().await.map_err(call_err)
	}

	async fn screenshot(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError> {
		let page = self.page(surface)?;
		page.save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
			.await
			.map_err(call_err)?;
		Ok(())
	}

	async fn save_session_state(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError> {
		let page = self.page(surface)?;
		let cookies = page.get_cookies().await.map_err(call_err)?;
		let stored: Vec<StoredCookie> = cookies
			.into_iter()
			.map(|cookie| StoredCookie {
				name: cookie.name,
				value: cookie.value,
				domain: cookie.domain,
				path: cookie.path,
				secure: cookie.secure,
				http_only: cookie.http_only,
			})
			.collect();
		let body = serde_json::to_string_pretty(&stored).map_err(call_err)?;
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent).map_err(call_err)?;
			}
		}
		std::fs::write(path, body).map_err(call_err)?;
		debug!(target: "kiosk.driver", count = stored.len(), path = %path.display(), "session saved");
		Ok(())
	}

	async fn restore_session_state(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError> {
		let content = match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(err) => return Err(call_err(err)),
		};
		let stored: Vec<StoredCookie> = serde_json::from_str(&content).map_err(call_err)?;
		self.inject_cookies(surface, &stored).await
	}

	async fn inject_cookies(&self, surface: SurfaceId, cookies: &[StoredCookie]) -> Result<(), DriverError> {
		let page = self.page(surface)?;
		let mut params = Vec::with_capacity(cookies.len());
		for cookie in cookies {
			let param = CookieParam::builder()
				.name(cookie.name.clone())
				.value(cookie.value.clone())
				.domain(cookie.domain.clone())
				.path(cookie.path.clone())
				.secure(cookie.secure)
				.http_only(cookie.http_only)
				.build()
				.map_err(DriverError::Call)?;
			params.push(param);
		}
		page.set_cookies(params).await.map_err(call_err)?;
		debug!(target: "kiosk.driver", count = cookies.len(), "cookies injected");
		Ok(())
	}

	async fn shutdown(&self) -> Result<(), DriverError> {
		self.pages.lock().clear();
		self.elements.lock().clear();
		let mut browser = self.browser.lock().await;
		if let Err(err) = browser.close().await {
			warn!(target: "kiosk.driver", ?err, "browser close reported an error");
		}
		if let Err(err) = browser.wait().await {
			debug!(target: "kiosk.driver", ?err, "browser wait ended with error");
		}
		Ok(())
	}
}
