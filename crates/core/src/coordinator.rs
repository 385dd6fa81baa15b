//! The session coordinator.
//!
//! One [`Coordinator`] owns the browser session and everything layered on
//! it: purpose-bound surfaces, the freshness caches, the reply dedup store,
//! and the posting/watch loop. Operator queries and the background loop go
//! through the same instance; surfaces are serialized behind one async lock
//! so the loop and a query never fight over a tab mid-navigation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::TtlCell;
use crate::config::Config;
use crate::dedup::{epoch_now, DedupStore};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::extract::{self, ActiveOrder, DialogRecord, TradeTotals};
use crate::login::{self, Credentials};
use crate::reply;
use crate::surface::{locate_first, Purpose, SurfaceSet};

/// Orders are extracted up to this many and sliced per query.
const ORDER_FETCH_CAP: usize = 50;

pub struct Coordinator {
	driver: Arc<dyn Driver>,
	config: RwLock<Config>,
	surfaces: tokio::sync::Mutex<SurfaceSet>,
	balance: TtlCell<String>,
	totals: TtlCell<TradeTotals>,
	orders: TtlCell<Vec<ActiveOrder>>,
	dedup: Mutex<DedupStore>,
	running: AtomicBool,
	loop_task: Mutex<Option<JoinHandle<()>>>,
	screenshot_cb: Mutex<Option<ScreenshotCallback>>,
}

/// Invoked with the capture path and the conversation id whenever the watch
/// loop screenshots a dialog it is about to answer.
pub type ScreenshotCallback = Arc<dyn Fn(&std::path::Path, Option<&str>) + Send + Sync>;

impl Coordinator {
	pub fn new(driver: Arc<dyn Driver>, config: Config) -> Self {
		let dedup = DedupStore::load(&config.processed_dialogs_path);
		Self {
			driver,
			config: RwLock::new(config),
			surfaces: tokio::sync::Mutex::new(SurfaceSet::new()),
			balance: TtlCell::new(),
			totals: TtlCell::new(),
			orders: TtlCell::new(),
			dedup: Mutex::new(dedup),
			running: AtomicBool::new(false),
			loop_task: Mutex::new(None),
			screenshot_cb: Mutex::new(None),
		}
	}

	/// Registers a callback fired with each dialog capture the watch loop
	/// takes before answering. Replaces any earlier callback.
	pub fn set_screenshot_callback(&self, callback: ScreenshotCallback) {
		*self.screenshot_cb.lock() = Some(callback);
	}

	pub fn config(&self) -> Config {
		self.config.read().clone()
	}

	pub fn running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Opens every purpose surface up front so the first query and the loop
	/// start from warm tabs, restoring a saved session blob first when one
	/// exists.
	pub async fn prepare(&self) -> Result<()> {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let mut restored = false;
		for purpose in Purpose::ALL {
			let surface = surfaces.ensure(&self.driver, &config, purpose).await?;
			if !restored && config.session_exists() {
				self.driver
					.restore_session_state(surface.id, &config.session_state_path)
					.await?;
				restored = true;
			}
		}
		info!(target: "kiosk.coordinator", restored, "surfaces prepared");
		Ok(())
	}

	/// Primes the read caches in the background. Failures only log; a cold
	/// cache is filled by the first real query instead.
	pub fn warm_up(self: &Arc<Self>) {
		let this = self.clone();
		tokio::spawn(async move {
			if let Err(err) = this.fetch_trade_totals().await {
				debug!(target: "kiosk.coordinator", ?err, "totals warm-up failed");
			}
			if let Err(err) = this.fetch_balance().await {
				debug!(target: "kiosk.coordinator", ?err, "balance warm-up failed");
			}
		});
	}

	/// Starts the posting/watch loop. Idempotent: a second call while the
	/// loop runs does nothing.
	pub fn start(self: &Arc<Self>) {
		if self.running.swap(true, Ordering::SeqCst) {
			debug!(target: "kiosk.coordinator", "loop already running");
			return;
		}
		// Pick up entries another process may have written while stopped.
		{
			let path = self.config.read().processed_dialogs_path.clone();
			*self.dedup.lock() = DedupStore::load(&path);
		}
		let this = self.clone();
		let task = tokio::spawn(async move {
			this.run_loop().await;
		});
		*self.loop_task.lock() = Some(task);
		info!(target: "kiosk.coordinator", "posting loop started");
	}

	/// Stops the loop and waits for the current cycle to finish.
	pub async fn stop(&self) {
		self.running.store(false, Ordering::SeqCst);
		let task = self.loop_task.lock().take();
		if let Some(task) = task {
			if let Err(err) = task.await {
				warn!(target: "kiosk.coordinator", ?err, "loop task ended abnormally");
			}
		}
		info!(target: "kiosk.coordinator", "posting loop stopped");
	}

	/// Stops the loop, persists the session, closes every surface, and
	/// shuts the browser down.
	pub async fn close(&self) -> Result<()> {
		self.stop().await;
		{
			let mut surfaces = self.surfaces.lock().await;
			if let Some(surface) = Purpose::ALL.iter().find_map(|p| surfaces.get(*p)) {
				self.persist_session(surface.id).await;
			}
			surfaces.close_all(&self.driver).await;
		}
		self.driver.shutdown().await?;
		info!(target: "kiosk.coordinator", "session closed");
		Ok(())
	}

	/// Full reset: closes the session and deletes every persisted artifact
	/// (session blob, credentials, reply ledger), clearing caches too.
	pub async fn reset_session(&self) -> Result<()> {
		self.close().await?;

		let (session_path, credentials_path) = {
			let config = self.config.read();
			(config.session_state_path.clone(), config.credentials_path.clone())
		};
		remove_if_exists(&session_path)?;
		remove_if_exists(&credentials_path)?;
		self.dedup.lock().purge_all()?;

		self.balance.clear();
		self.totals.clear();
		self.orders.clear();
		info!(target: "kiosk.coordinator", "session reset");
		Ok(())
	}

	// --- cached reads ---

	pub async fn fetch_balance(&self) -> Result<String> {
		let config = self.config();
		let window = config.freshness_window();
		self.balance
			.get_or_compute(window, || async {
				let mut surfaces = self.surfaces.lock().await;
				let surface = surfaces.ensure(&self.driver, &config, Purpose::Finance).await?;
				extract::balance(self.driver.as_ref(), &config, surface)
					.await
					.map_err(Error::from)
			})
			.await
	}

	pub async fn fetch_trade_totals(&self) -> Result<TradeTotals> {
		let config = self.config();
		let window = config.freshness_window();
		self.totals
			.get_or_compute(window, || async {
				let mut surfaces = self.surfaces.lock().await;
				let surface = surfaces.ensure(&self.driver, &config, Purpose::Orders).await?;
				extract::trade_totals(self.driver.as_ref(), &config, surface)
					.await
					.map_err(Error::from)
			})
			.await
	}

	pub async fn fetch_active_orders(&self, limit: usize) -> Result<Vec<ActiveOrder>> {
		let config = self.config();
		let window = config.freshness_window();
		let mut orders = self
			.orders
			.get_or_compute(window, || async {
				let mut surfaces = self.surfaces.lock().await;
				let surface = surfaces.ensure(&self.driver, &config, Purpose::Orders).await?;
				extract::active_orders(self.driver.as_ref(), &config, surface, ORDER_FETCH_CAP)
					.await
					.map_err(Error::from)
			})
			.await?;
		orders.truncate(limit);
		Ok(orders)
	}

	// --- dialogs and replies ---

	/// Lists dialogs straight off the page. Never cached: unread state is
	/// the one signal that must not be stale.
	pub async fn dialogs(&self) -> Result<Vec<DialogRecord>> {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = surfaces.ensure(&self.driver, &config, Purpose::Chat).await?;
		extract::dialogs(self.driver.as_ref(), &config, surface)
			.await
			.map_err(Error::from)
	}

	pub async fn unread_dialogs(&self) -> Result<Vec<DialogRecord>> {
		Ok(self.dialogs().await?.into_iter().filter(|d| d.unread).collect())
	}

	/// Sends `text` into one conversation. Success records the reply in the
	/// dedup ledger and persists the session.
	pub async fn reply_to_dialog(&self, conversation_id: &str, text: &str) -> bool {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = match surfaces.ensure(&self.driver, &config, Purpose::Chat).await {
			Ok(surface) => surface,
			Err(err) => {
				warn!(target: "kiosk.coordinator", ?err, "chat surface unavailable");
				return false;
			}
		};
		let sent = reply::send(self.driver.as_ref(), &config, surface, Some(conversation_id), text).await;
		if sent {
			self.record_reply(conversation_id);
			self.persist_session(surface.id).await;
		}
		sent
	}

	/// Replies to the first unread dialog, or the first dialog at all when
	/// none is unread. Returns whether a message went out.
	pub async fn reply_first_unread(&self, text: &str) -> bool {
		let dialogs = match self.dialogs().await {
			Ok(dialogs) => dialogs,
			Err(err) => {
				warn!(target: "kiosk.coordinator", ?err, "dialog listing failed");
				return false;
			}
		};
		let target = dialogs.iter().find(|d| d.unread).or_else(|| dialogs.first());
		match target {
			Some(dialog) => self.reply_to_dialog(&dialog.conversation_id, text).await,
			None => {
				debug!(target: "kiosk.coordinator", "no dialogs to reply to");
				false
			}
		}
	}

	fn record_reply(&self, conversation_id: &str) {
		// A persistence failure must not undo the send that already
		// happened; it only risks one duplicate after a restart.
		if let Err(err) = self.dedup.lock().record(conversation_id, epoch_now()) {
			warn!(target: "kiosk.coordinator", ?err, "reply ledger write failed");
		}
	}

	async fn persist_session(&self, surface: crate::driver::SurfaceId) {
		let path = self.config.read().session_state_path.clone();
		if let Err(err) = self.driver.save_session_state(surface, &path).await {
			warn!(target: "kiosk.coordinator", ?err, "session persist failed");
		}
	}

	// --- login ---

	/// Logs in with credentials, keeping the browser open long enough for a
	/// human to pass a captcha. Persists the session and optionally the
	/// credentials on success.
	pub async fn login_with_credentials(&self, credentials: &Credentials, save: bool) -> Result<()> {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = surfaces.ensure(&self.driver, &config, Purpose::Services).await?;
		login::with_credentials(self.driver.as_ref(), &config, surface, credentials).await?;
		self.persist_session(surface.id).await;
		if save {
			login::save_credentials(&config.credentials_path, credentials)?;
		}
		Ok(())
	}

	/// Logs in from saved credentials, if any exist.
	pub async fn login_with_saved_credentials(&self) -> Result<bool> {
		let path = self.config.read().credentials_path.clone();
		match login::load_credentials(&path)? {
			Some(credentials) => {
				self.login_with_credentials(&credentials, false).await?;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Imports a session from a raw `Cookie:` header.
	pub async fn login_with_cookie_header(&self, header: &str) -> Result<()> {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = surfaces.ensure(&self.driver, &config, Purpose::Services).await?;
		login::with_cookie_header(self.driver.as_ref(), &config, surface, header).await?;
		self.persist_session(surface.id).await;
		Ok(())
	}

	/// Whether the current session shows a logged-in marker.
	pub async fn logged_in(&self) -> Result<bool> {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = surfaces.ensure(&self.driver, &config, Purpose::Services).await?;
		surface.ensure_at(self.driver.as_ref(), &config.base_url).await?;
		Ok(login::looks_logged_in(self.driver.as_ref(), &config, surface).await)
	}

	// --- runtime mutators ---

	pub fn set_auto_reply_enabled(&self, enabled: bool) {
		self.config.write().auto_reply_enabled = enabled;
		info!(target: "kiosk.coordinator", enabled, "auto-reply toggled");
	}

	pub fn set_auto_reply_text(&self, text: String) {
		self.config.write().auto_reply_text = text;
	}

	pub fn set_post_text(&self, text: String) {
		self.config.write().post_text = text;
	}

	/// Sets the scheduled-post interval in minutes, floored at one minute.
	pub fn set_post_interval(&self, minutes: u64) {
		let secs = (minutes * 60).max(60);
		self.config.write().post_interval_secs = secs;
		info!(target: "kiosk.coordinator", secs, "post interval set");
	}

	/// Sets the continuous posting interval. No floor: short intervals are
	/// an operator's explicit choice here.
	pub fn set_services_interval(&self, secs: u64) {
		self.config.write().services_interval_secs = secs;
		info!(target: "kiosk.coordinator", secs, "services interval set");
	}

	// --- reply ledger maintenance ---

	pub fn purge_replies(&self) -> Result<()> {
		self.dedup.lock().purge_all()
	}

	pub fn purge_replies_older_than(&self, age: Duration) -> Result<usize> {
		self.dedup.lock().purge_older_than(epoch_now(), age)
	}

	pub fn reply_ledger_len(&self) -> usize {
		self.dedup.lock().len()
	}

	// --- the loop ---

	async fn run_loop(self: Arc<Self>) {
		while self.running() {
			self.post_once().await;

			// The wait between posts (services interval, or the scheduled
			// post interval under that cadence) is cut into short slices;
			// each slice boundary is a chance to answer an unread dialog
			// and to notice a stop request.
			let config = self.config();
			let interval = config.posting_interval();
			let slice = config.watch_slice().max(Duration::from_millis(100));
			let mut waited = Duration::ZERO;
			while waited < interval && self.running() {
				let step = slice.min(interval - waited);
				tokio::time::sleep(step).await;
				waited += step;
				if self.config.read().auto_reply_enabled {
					self.watch_once().await;
				}
			}
		}
	}

	/// One posting pass: publish the configured text on the services page.
	async fn post_once(&self) {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = match surfaces.ensure(&self.driver, &config, Purpose::Services).await {
			Ok(surface) => surface,
			Err(err) => {
				warn!(target: "kiosk.coordinator", ?err, "services surface unavailable");
				return;
			}
		};
		if let Err(err) = surface.ensure_at(self.driver.as_ref(), &config.section_url).await {
			warn!(target: "kiosk.coordinator", ?err, "services navigation failed");
			return;
		}
		if reply::send(self.driver.as_ref(), &config, surface, None, &config.post_text).await {
			debug!(target: "kiosk.coordinator", "post published");
		}
	}

	/// One watch pass: answer the first unread dialog, once per cooldown.
	async fn watch_once(&self) {
		let config = self.config();
		let mut surfaces = self.surfaces.lock().await;
		let surface = match surfaces.ensure(&self.driver, &config, Purpose::Chat).await {
			Ok(surface) => surface,
			Err(err) => {
				warn!(target: "kiosk.coordinator", ?err, "chat surface unavailable");
				return;
			}
		};
		if let Err(err) = surface.navigate(self.driver.as_ref(), &config.chat_url()).await {
			warn!(target: "kiosk.coordinator", ?err, "chat refresh failed");
			return;
		}

		let Some(entry) = locate_first(self.driver.as_ref(), surface.id, &config.selectors.unread_dialog).await
		else {
			return;
		};
		let conversation_id = match extract::conversation_id(self.driver.as_ref(), surface.id, entry).await {
			Ok(id) => id,
			Err(err) => {
				warn!(target: "kiosk.coordinator", ?err, "conversation id extraction failed");
				return;
			}
		};

		let eligible = {
			let cooldown = config.reply_cooldown();
			self.dedup.lock().eligible(&conversation_id, epoch_now(), cooldown)
		};
		if !eligible {
			debug!(target: "kiosk.coordinator", conversation = %conversation_id, "within cooldown, skipped");
			return;
		}

		if let Err(err) = self.driver.click(surface.id, entry).await {
			warn!(target: "kiosk.coordinator", ?err, "dialog open failed");
			return;
		}
		tokio::time::sleep(config.settle_short()).await;

		let callback = self.screenshot_cb.lock().clone();
		if let Some(callback) = callback {
			if let Some(path) =
				extract::capture_diagnostic(self.driver.as_ref(), &config, surface.id, "dialog").await
			{
				callback(&path, Some(&conversation_id));
			}
		}

		if reply::send(self.driver.as_ref(), &config, surface, None, &config.auto_reply_text).await {
			info!(target: "kiosk.coordinator", conversation = %conversation_id, "auto-replied");
			self.record_reply(&conversation_id);
			self.persist_session(surface.id).await;
		}
	}
}

fn remove_if_exists(path: &std::path::Path) -> Result<()> {
	match std::fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(source) => Err(Error::Storage { path: path.to_path_buf(), source }),
	}
}
