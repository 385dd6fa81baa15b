//! Login flows: saved credentials, manual captcha completion, cookie import.

use std::path::Path;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::driver::{Driver, StoredCookie};
use crate::error::{Error, Result};
use crate::surface::{locate_first, Surface};

/// Stored account credentials.
///
/// Older credential files used an `email` key for the login field; the alias
/// keeps them readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
	#[serde(alias = "email")]
	pub login: String,
	pub password: String,
}

pub fn load_credentials(path: &Path) -> Result<Option<Credentials>> {
	let content = match std::fs::read_to_string(path) {
		Ok(content) => content,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(source) => return Err(Error::Storage { path: path.to_path_buf(), source }),
	};
	Ok(Some(serde_json::from_str(&content)?))
}

pub fn save_credentials(path: &Path, credentials: &Credentials) -> Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent)
				.map_err(|source| Error::Storage { path: parent.to_path_buf(), source })?;
		}
	}
	let body = serde_json::to_string_pretty(credentials)?;
	std::fs::write(path, body).map_err(|source| Error::Storage { path: path.to_path_buf(), source })
}

/// Whether the page content shows any logged-in marker.
pub async fn looks_logged_in(driver: &dyn Driver, config: &Config, surface: &Surface) -> bool {
	match driver.content(surface.id).await {
		Ok(content) => config.login_markers.iter().any(|marker| content.contains(marker)),
		Err(err) => {
			warn!(target: "kiosk.login", ?err, "content read failed during marker check");
			false
		}
	}
}

/// Fills the login form and waits for a logged-in marker.
///
/// The browser stays open for the whole wait window so a human can complete
/// a captcha; the marker poll runs every `login_poll_secs` until
/// `login_wait_secs` is exhausted.
pub async fn with_credentials(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
	credentials: &Credentials,
) -> Result<()> {
	surface.navigate(driver, &config.login_url()).await?;
	tokio::time::sleep(config.settle_short()).await;

	if let Some(input) = locate_first(driver, surface.id, &config.selectors.login_input).await {
		driver.fill(surface.id, input, &credentials.login).await?;
	}
	if let Some(input) = locate_first(driver, surface.id, &config.selectors.password_input).await {
		driver.fill(surface.id, input, &credentials.password).await?;
		driver.press(surface.id, input, "Enter").await?;
	}
	info!(target: "kiosk.login", "credentials submitted, waiting for confirmation");

	wait_for_marker(driver, config, surface).await
}

/// Polls for a logged-in marker until the wait window runs out.
pub async fn wait_for_marker(driver: &dyn Driver, config: &Config, surface: &Surface) -> Result<()> {
	let attempts = (config.login_wait_secs / config.login_poll_secs.max(1)).max(1);
	for attempt in 0..attempts {
		if looks_logged_in(driver, config, surface).await {
			info!(target: "kiosk.login", attempt, "login confirmed");
			return Ok(());
		}
		tokio::time::sleep(std::time::Duration::from_secs(config.login_poll_secs)).await;
	}
	Err(Error::LoginTimeout { secs: config.login_wait_secs })
}

/// Parses a raw `Cookie:` header into injectable cookies for the base
/// domain. Values are percent-decoded.
pub fn parse_cookie_header(header: &str, domain: &str) -> Vec<StoredCookie> {
	header
		.split(';')
		.filter_map(|pair| {
			let (name, value) = pair.split_once('=')?;
			let name = name.trim();
			if name.is_empty() {
				return None;
			}
			let value = percent_decode_str(value.trim()).decode_utf8_lossy().into_owned();
			Some(StoredCookie {
				name: name.to_string(),
				value,
				domain: domain.to_string(),
				path: "/".to_string(),
				secure: true,
				http_only: false,
			})
		})
		.collect()
}

/// Imports a session from a browser-copied cookie header.
///
/// Refused outright when the header carries none of the session-critical
/// cookie names, since injecting the rest could never produce a signed-in
/// session.
pub async fn with_cookie_header(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
	header: &str,
) -> Result<()> {
	let domain = cookie_domain(&config.base_url);
	let cookies = parse_cookie_header(header, &domain);
	let has_session = cookies
		.iter()
		.any(|cookie| config.session_cookie_names.iter().any(|name| name == &cookie.name));
	if !has_session {
		return Err(Error::CookieHeader);
	}

	driver.inject_cookies(surface.id, &cookies).await?;
	surface.navigate(driver, &config.base_url).await?;
	tokio::time::sleep(config.settle_short()).await;

	if looks_logged_in(driver, config, surface).await {
		debug!(target: "kiosk.login", count = cookies.len(), "cookie session accepted");
		Ok(())
	} else {
		Err(Error::LoginTimeout { secs: 0 })
	}
}

fn cookie_domain(base_url: &str) -> String {
	base_url
		.trim_start_matches("https://")
		.trim_start_matches("http://")
		.trim_end_matches('/')
		.split('/')
		.next()
		.unwrap_or_default()
		.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cookie_header_parses_and_decodes() {
		let cookies = parse_cookie_header("PHPSESSID=abc123; golden_key=k%2Fv%3D; theme=dark", "funpay.com");
		assert_eq!(cookies.len(), 3);
		assert_eq!(cookies[0].name, "PHPSESSID");
		assert_eq!(cookies[0].value, "abc123");
		assert_eq!(cookies[1].value, "k/v=");
		assert!(cookies.iter().all(|c| c.domain == "funpay.com"));
	}

	#[test]
	fn malformed_pairs_are_skipped() {
		let cookies = parse_cookie_header("novalue; =orphan; ok=1", "funpay.com");
		assert_eq!(cookies.len(), 1);
		assert_eq!(cookies[0].name, "ok");
	}

	#[test]
	fn legacy_email_key_still_loads() {
		let creds: Credentials =
			serde_json::from_str(r#"{"email": "seller@example.com", "password": "pw"}"#).unwrap();
		assert_eq!(creds.login, "seller@example.com");
	}

	#[test]
	fn domain_strips_scheme_and_path() {
		assert_eq!(cookie_domain("https://funpay.com/"), "funpay.com");
		assert_eq!(cookie_domain("http://example.test/some/path"), "example.test");
	}
}
