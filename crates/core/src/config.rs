//! Coordinator configuration.
//!
//! An explicit struct passed at construction; there is no ambient global.
//! Selector candidate lists are plain data here so the ordered-fallback
//! lookups stay independently testable against fixture markup. Every field
//! has a serde default, so a partial config file (or none at all) works.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_base_url() -> String {
	"https://funpay.com/".to_string()
}

fn default_section_url() -> String {
	"https://funpay.com/lots/223/".to_string()
}

fn default_session_state_path() -> PathBuf {
	PathBuf::from("storage/session.json")
}

fn default_credentials_path() -> PathBuf {
	PathBuf::from("storage/credentials.json")
}

fn default_processed_dialogs_path() -> PathBuf {
	PathBuf::from("storage/processed_dialogs.json")
}

fn default_diagnostics_dir() -> PathBuf {
	PathBuf::from("storage/diagnostics")
}

fn default_post_text() -> String {
	"Привет! Выполняю услуги по Minecraft. Напишите, что нужно сделать.".to_string()
}

fn default_auto_reply_text() -> String {
	"Здравствуйте! Опишите задачу, версию и бюджет.".to_string()
}

fn default_true() -> bool {
	true
}

fn default_post_interval_secs() -> u64 {
	300
}

fn default_services_interval_secs() -> u64 {
	5
}

fn default_watch_slice_secs() -> u64 {
	2
}

fn default_freshness_window_secs() -> u64 {
	10
}

fn default_reply_cooldown_secs() -> u64 {
	120
}

fn default_dialog_cap() -> usize {
	20
}

fn default_login_wait_secs() -> u64 {
	300
}

fn default_login_poll_secs() -> u64 {
	5
}

fn default_settle_short_ms() -> u64 {
	300
}

fn default_settle_ms() -> u64 {
	2000
}

fn default_post_cadence() -> PostCadence {
	PostCadence::Continuous
}

fn default_session_cookie_names() -> Vec<String> {
	vec!["PHPSESSID".to_string(), "golden_key".to_string()]
}

fn default_login_markers() -> Vec<String> {
	[
		"account/logout",
		"Выйти",
		"menu-item-logout",
		"href=\"/account/settings\"",
		"badge-balance",
	]
	.map(str::to_string)
	.to_vec()
}

/// Which wait the posting loop applies between posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostCadence {
	/// Post every `services_interval_secs`.
	Continuous,
	/// Post every `post_interval_secs` (60-second floor on mutation).
	Scheduled,
}

/// Full coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	#[serde(default = "default_base_url")]
	pub base_url: String,
	/// Services section the posting loop operates on.
	#[serde(default = "default_section_url")]
	pub section_url: String,

	#[serde(default = "default_session_state_path")]
	pub session_state_path: PathBuf,
	#[serde(default = "default_credentials_path")]
	pub credentials_path: PathBuf,
	#[serde(default = "default_processed_dialogs_path")]
	pub processed_dialogs_path: PathBuf,
	/// Where zero-match extraction captures land.
	#[serde(default = "default_diagnostics_dir")]
	pub diagnostics_dir: PathBuf,

	#[serde(default = "default_true")]
	pub headless: bool,

	#[serde(default = "default_post_text")]
	pub post_text: String,
	/// Which interval the posting loop waits between posts.
	#[serde(default = "default_post_cadence")]
	pub post_cadence: PostCadence,
	/// Scheduled-post interval; a 60-second floor applies on mutation.
	#[serde(default = "default_post_interval_secs")]
	pub post_interval_secs: u64,
	/// Continuous services-posting interval; no floor.
	#[serde(default = "default_services_interval_secs")]
	pub services_interval_secs: u64,
	/// Size of the wait slices the watch check runs between.
	#[serde(default = "default_watch_slice_secs")]
	pub watch_slice_secs: u64,

	#[serde(default = "default_true")]
	pub auto_reply_enabled: bool,
	#[serde(default = "default_auto_reply_text")]
	pub auto_reply_text: String,

	#[serde(default = "default_freshness_window_secs")]
	pub freshness_window_secs: u64,
	#[serde(default = "default_reply_cooldown_secs")]
	pub reply_cooldown_secs: u64,
	#[serde(default = "default_dialog_cap")]
	pub dialog_cap: usize,

	#[serde(default = "default_login_wait_secs")]
	pub login_wait_secs: u64,
	#[serde(default = "default_login_poll_secs")]
	pub login_poll_secs: u64,

	#[serde(default = "default_settle_short_ms")]
	pub settle_short_ms: u64,
	#[serde(default = "default_settle_ms")]
	pub settle_ms: u64,

	/// Cookie names that prove an importable session.
	#[serde(default = "default_session_cookie_names")]
	pub session_cookie_names: Vec<String>,
	/// Page-content substrings that prove a logged-in state.
	#[serde(default = "default_login_markers")]
	pub login_markers: Vec<String>,

	#[serde(default)]
	pub selectors: SelectorSet,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			base_url: default_base_url(),
			section_url: default_section_url(),
			session_state_path: default_session_state_path(),
			credentials_path: default_credentials_path(),
			processed_dialogs_path: default_processed_dialogs_path(),
			diagnostics_dir: default_diagnostics_dir(),
			headless: true,
			post_text: default_post_text(),
			post_cadence: PostCadence::Continuous,
			post_interval_secs: default_post_interval_secs(),
			services_interval_secs: default_services_interval_secs(),
			watch_slice_secs: default_watch_slice_secs(),
			auto_reply_enabled: true,
			auto_reply_text: default_auto_reply_text(),
			freshness_window_secs: default_freshness_window_secs(),
			reply_cooldown_secs: default_reply_cooldown_secs(),
			dialog_cap: default_dialog_cap(),
			login_wait_secs: default_login_wait_secs(),
			login_poll_secs: default_login_poll_secs(),
			settle_short_ms: default_settle_short_ms(),
			settle_ms: default_settle_ms(),
			session_cookie_names: default_session_cookie_names(),
			login_markers: default_login_markers(),
			selectors: SelectorSet::default(),
		}
	}
}

impl Config {
	/// Loads a config file, falling back to defaults when the file is
	/// absent or unreadable.
	pub fn load(path: &Path) -> Self {
		std::fs::read_to_string(path)
			.ok()
			.and_then(|content| serde_json::from_str(&content).ok())
			.unwrap_or_default()
	}

	/// Applies `KIOSK_*` environment overrides on top of the current values.
	pub fn apply_env(&mut self) {
		if let Ok(v) = env::var("KIOSK_BASE_URL") {
			self.base_url = v;
		}
		if let Ok(v) = env::var("KIOSK_SECTION_URL") {
			self.section_url = v;
		}
		if let Ok(v) = env::var("KIOSK_SESSION_STATE_PATH") {
			self.session_state_path = PathBuf::from(v);
		}
		if let Ok(v) = env::var("KIOSK_POST_TEXT") {
			self.post_text = v;
		}
		if let Ok(v) = env::var("KIOSK_AUTO_REPLY_TEXT") {
			self.auto_reply_text = v;
		}
		if let Some(v) = env_u64("KIOSK_SERVICES_INTERVAL_SECS") {
			self.services_interval_secs = v;
		}
		if let Some(v) = env_u64("KIOSK_POST_INTERVAL_MINUTES") {
			self.post_interval_secs = (v * 60).max(60);
		}
		if let Ok(v) = env::var("KIOSK_POST_CADENCE") {
			match v.trim().to_ascii_lowercase().as_str() {
				"scheduled" => self.post_cadence = PostCadence::Scheduled,
				"continuous" => self.post_cadence = PostCadence::Continuous,
				other => warn!(target: "kiosk.config", value = other, "unknown post cadence ignored"),
			}
		}
		if let Some(v) = env_bool("KIOSK_HEADLESS") {
			self.headless = v;
		}
		if let Some(v) = env_bool("KIOSK_AUTO_REPLY_ENABLED") {
			self.auto_reply_enabled = v;
		}
	}

	/// Whether a persisted browser session blob exists.
	///
	/// The blob itself is opaque to the coordinator; existence alone decides
	/// the startup mode (headless reuse vs headful manual login).
	pub fn session_exists(&self) -> bool {
		self.session_state_path.exists()
	}

	pub fn chat_url(&self) -> String {
		format!("{}chat/", self.base_url)
	}

	pub fn conversation_url(&self, conversation_id: &str) -> String {
		format!("{}chat/?node={}", self.base_url, conversation_id)
	}

	pub fn orders_url(&self) -> String {
		format!("{}orders/trade?state=paid", self.base_url)
	}

	pub fn finance_url(&self) -> String {
		format!("{}account/finance", self.base_url)
	}

	pub fn login_url(&self) -> String {
		format!("{}account/login", self.base_url)
	}

	/// URLs probed, in order, when extracting the balance.
	pub fn balance_urls(&self) -> Vec<String> {
		vec![
			self.base_url.clone(),
			self.finance_url(),
			format!("{}finance", self.base_url),
			format!("{}account", self.base_url),
		]
	}

	pub fn freshness_window(&self) -> Duration {
		Duration::from_secs(self.freshness_window_secs)
	}

	pub fn reply_cooldown(&self) -> Duration {
		Duration::from_secs(self.reply_cooldown_secs)
	}

	pub fn services_interval(&self) -> Duration {
		Duration::from_secs(self.services_interval_secs)
	}

	pub fn post_interval(&self) -> Duration {
		Duration::from_secs(self.post_interval_secs)
	}

	/// The wait between posts under the configured cadence.
	pub fn posting_interval(&self) -> Duration {
		match self.post_cadence {
			PostCadence::Continuous => self.services_interval(),
			PostCadence::Scheduled => self.post_interval(),
		}
	}

	pub fn watch_slice(&self) -> Duration {
		Duration::from_secs(self.watch_slice_secs)
	}

	pub fn settle_short(&self) -> Duration {
		Duration::from_millis(self.settle_short_ms)
	}

	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}
}

fn env_u64(name: &str) -> Option<u64> {
	env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
	let v = env::var(name).ok()?;
	Some(matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Ordered selector candidates for every lookup the coordinator performs.
///
/// First match wins; a candidate that errors or matches nothing is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorSet {
	pub balance: Vec<String>,
	pub order_cards: Vec<String>,
	pub order_status: Vec<String>,
	pub order_id: Vec<String>,
	pub order_buyer: Vec<String>,
	pub order_amount: Vec<String>,
	pub order_desc: Vec<String>,
	pub order_date: Vec<String>,
	pub table_rows: Vec<String>,
	pub dialog_list: Vec<String>,
	pub dialog_name: Vec<String>,
	pub unread_dialog: Vec<String>,
	pub chat_input: Vec<String>,
	pub chat_send: Vec<String>,
	pub open_chat: Vec<String>,
	pub login_input: Vec<String>,
	pub password_input: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
	list.iter().map(|s| s.to_string()).collect()
}

impl Default for SelectorSet {
	fn default() -> Self {
		Self {
			balance: owned(&["[data-balance]", ".badge-balance", ".header-balance", ".balance"]),
			order_cards: owned(&[".tc-item"]),
			order_status: owned(&[".tc-status"]),
			order_id: owned(&[".tc-order", ".tc-order a"]),
			order_buyer: owned(&[".tc-buyer", ".tc-buyer .media-user-name", ".media-user-name"]),
			order_amount: owned(&[".tc-sum", ".tc-amount", ".tc-price", ".tc-total"]),
			order_desc: owned(&[".tc-desc", ".tc-title", ".tc-game"]),
			order_date: owned(&[".tc-date", "time", ".tc-time"]),
			table_rows: owned(&["tbody tr", "tr"]),
			dialog_list: owned(&["a.contact-item", ".contact-item", ".contact-list a", "a[data-id]"]),
			dialog_name: owned(&[".media-user-name"]),
			unread_dialog: owned(&[
				".contact-list a.contact-item.unread",
				".contact-item.unread",
				"a.contact-item.unread",
				".unread",
				"[class*='unread']",
			]),
			chat_input: owned(&[
				"textarea[name='content']",
				".chat-form textarea",
				"textarea",
				"div[contenteditable=true]",
			]),
			chat_send: owned(&[
				".chat-form-btn button[type='submit']",
				".chat-form button[type='submit']",
				"button[type='submit']",
			]),
			open_chat: owned(&["[data-action='open-chat']", "button.open-chat", ".chat-open button"]),
			login_input: owned(&["input[name='login']"]),
			password_input: owned(&["input[name='password']"]),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_cover_partial_files() {
		let cfg: Config = serde_json::from_str(r#"{"baseUrl": "https://example.test/"}"#).unwrap();
		assert_eq!(cfg.base_url, "https://example.test/");
		assert_eq!(cfg.reply_cooldown_secs, 120);
		assert_eq!(cfg.freshness_window_secs, 10);
		assert!(!cfg.selectors.chat_input.is_empty());
	}

	#[test]
	fn cadence_picks_the_posting_interval() {
		let cfg: Config = serde_json::from_str(r#"{"postCadence": "scheduled"}"#).unwrap();
		assert_eq!(cfg.post_cadence, PostCadence::Scheduled);
		assert_eq!(cfg.posting_interval(), Duration::from_secs(300));

		let cfg = Config::default();
		assert_eq!(cfg.post_cadence, PostCadence::Continuous);
		assert_eq!(cfg.posting_interval(), Duration::from_secs(5));
	}

	#[test]
	fn derived_urls_compose_from_base() {
		let cfg = Config::default();
		assert_eq!(cfg.chat_url(), "https://funpay.com/chat/");
		assert_eq!(cfg.conversation_url("42"), "https://funpay.com/chat/?node=42");
		assert_eq!(cfg.orders_url(), "https://funpay.com/orders/trade?state=paid");
		assert_eq!(cfg.balance_urls().len(), 4);
	}
}
