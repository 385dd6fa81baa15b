//! Page-scrape extraction: balance, trade totals, active orders, dialogs.
//!
//! Each extractor walks ordered selector candidates over a surface and
//! degrades to an empty result when the markup has nothing to offer. Pure
//! text helpers are split out so the parsing rules are testable without a
//! browser.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::driver::{Driver, Element, SurfaceId};
use crate::error::ExtractError;
use crate::surface::{locate_all_first, locate_within_first, Surface};

/// One order in a non-terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOrder {
	pub id: String,
	pub buyer: String,
	/// Parsed amount; `None` when the source text held no parseable value,
	/// in which case `amount_text` still carries the raw fragment.
	pub amount: Option<f64>,
	pub amount_text: String,
	pub description: String,
	pub date: String,
	pub status: String,
}

/// Per-status sums and row counts over the trade history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeTotals {
	pub paid: f64,
	pub paid_count: u32,
	pub closed: f64,
	pub closed_count: u32,
	pub refunded: f64,
	pub refunded_count: u32,
}

impl TradeTotals {
	pub fn total(&self) -> f64 {
		round2(self.paid + self.closed + self.refunded)
	}
}

/// One conversation entry from the chat list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogRecord {
	pub conversation_id: String,
	pub name: String,
	pub unread: bool,
}

/// Rounds to two decimal places, matching displayed currency precision.
pub fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

/// Collapses runs of whitespace (including non-breaking spaces) to single
/// spaces.
pub fn clean_ws(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn amount_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	// Grouped digits, optional decimal part, then a ruble marker.
	RE.get_or_init(|| {
		Regex::new(r"([\d\s\u{a0}]+(?:[.,]\d{1,2})?)\s*[₽RrРр]").unwrap()
	})
}

/// Pulls the first currency amount out of a text fragment.
///
/// Accepts grouped thousands (`1 234,56 ₽`) and both comma and dot decimal
/// separators.
pub fn parse_amount(text: &str) -> Option<f64> {
	let caps = amount_regex().captures(text)?;
	let raw: String = caps
		.get(1)?
		.as_str()
		.chars()
		.filter(|c| !c.is_whitespace())
		.map(|c| if c == ',' { '.' } else { c })
		.collect();
	raw.parse().ok()
}

/// Pulls the first `#ID` order token out of a text fragment.
pub fn parse_order_token(text: &str) -> Option<String> {
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| Regex::new(r"#\s*([A-Za-z0-9-]+)").unwrap());
	re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Which totals bucket a status line feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBucket {
	Paid,
	Closed,
	Refunded,
}

/// Buckets a row by status keyword. First keyword wins, in the fixed order
/// paid, closed, refunded, so a line carrying both "Оплачен" and "Закрыт"
/// counts as paid.
pub fn bucket_line(text: &str) -> Option<StatusBucket> {
	if text.contains("Оплачен") {
		Some(StatusBucket::Paid)
	} else if text.contains("Закрыт") {
		Some(StatusBucket::Closed)
	} else if text.contains("Возврат") {
		Some(StatusBucket::Refunded)
	} else {
		None
	}
}

/// An order is active when its status says paid and no terminal keyword
/// overrides it.
pub fn is_active_status(status: &str) -> bool {
	let lower = status.to_lowercase();
	lower.contains("оплачен") && !lower.contains("закрыт") && !lower.contains("возврат")
}

/// Header rows of the trade table carry column captions instead of data.
fn is_header_row(text: &str) -> bool {
	text.contains("Дата") && text.contains("Сумма")
}

/// Extracts the account balance text, probing each balance URL in order and
/// each balance selector on every page.
///
/// The first non-empty selector text wins as-is; the site renders whatever
/// currency formatting it wants and the caller gets that string. Falls back
/// to a currency-pattern scan of the whole page text when no selector hits.
pub async fn balance(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
) -> Result<String, ExtractError> {
	for url in config.balance_urls() {
		surface.ensure_at(driver, &url).await?;
		for selector in &config.selectors.balance {
			let element = match driver.locate(surface.id, selector).await {
				Ok(found) => found,
				Err(err) => {
					warn!(target: "kiosk.extract", selector, ?err, "balance selector failed");
					continue;
				}
			};
			if let Some(element) = element {
				let text = clean_ws(&driver.read_text(surface.id, element).await?);
				if !text.is_empty() {
					debug!(target: "kiosk.extract", url, selector, text, "balance read");
					return Ok(text);
				}
			}
		}
		let body = driver.page_text(surface.id).await?;
		if let Some(hit) = amount_regex().find(&body) {
			let text = clean_ws(hit.as_str());
			debug!(target: "kiosk.extract", url, text, "balance read from page text");
			return Ok(text);
		}
	}
	Err(ExtractError::NotFound)
}

/// Sums the trade-history table into per-status totals.
///
/// Walks table rows first; when no row selector matches, falls back to
/// scanning the page text line by line. Rows without a recognized status or
/// amount are skipped.
pub async fn trade_totals(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
) -> Result<TradeTotals, ExtractError> {
	surface.ensure_at(driver, &config.orders_url()).await?;

	let mut totals = TradeTotals::default();
	let mut rows_seen = 0usize;

	let rows = locate_all_first(driver, surface.id, &config.selectors.table_rows).await;
	for row in rows {
		let text = match driver.read_text(surface.id, row).await {
			Ok(text) => clean_ws(&text),
			Err(err) => {
				warn!(target: "kiosk.extract", ?err, "row read failed");
				continue;
			}
		};
		if is_header_row(&text) {
			continue;
		}
		if accumulate(&mut totals, &text) {
			rows_seen += 1;
		}
	}

	if rows_seen == 0 {
		let body = driver.page_text(surface.id).await?;
		for line in body.lines() {
			if accumulate(&mut totals, &clean_ws(line)) {
				rows_seen += 1;
			}
		}
	}

	totals.paid = round2(totals.paid);
	totals.closed = round2(totals.closed);
	totals.refunded = round2(totals.refunded);
	debug!(
		target: "kiosk.extract",
		rows = rows_seen,
		paid = totals.paid,
		closed = totals.closed,
		refunded = totals.refunded,
		"trade totals summed"
	);
	Ok(totals)
}

fn accumulate(totals: &mut TradeTotals, line: &str) -> bool {
	let Some(bucket) = bucket_line(line) else {
		return false;
	};
	let Some(amount) = parse_amount(line) else {
		return false;
	};
	match bucket {
		StatusBucket::Paid => {
			totals.paid += amount;
			totals.paid_count += 1;
		}
		StatusBucket::Closed => {
			totals.closed += amount;
			totals.closed_count += 1;
		}
		StatusBucket::Refunded => {
			totals.refunded += amount;
			totals.refunded_count += 1;
		}
	}
	true
}

/// Extracts active (paid, non-terminal) orders up to `limit`.
///
/// Tries the card layout first, then the generic table layout. Zero matches
/// is an empty list, with a diagnostic capture of the page for later
/// inspection.
pub async fn active_orders(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
	limit: usize,
) -> Result<Vec<ActiveOrder>, ExtractError> {
	surface.ensure_at(driver, &config.orders_url()).await?;

	let cards = locate_all_first(driver, surface.id, &config.selectors.order_cards).await;
	let mut orders = Vec::new();

	if !cards.is_empty() {
		for card in cards {
			if orders.len() >= limit {
				break;
			}
			match order_from_card(driver, config, surface.id, card).await {
				Ok(Some(order)) => orders.push(order),
				Ok(None) => {}
				Err(err) => {
					warn!(target: "kiosk.extract", ?err, "order card read failed");
				}
			}
		}
	} else {
		let rows = locate_all_first(driver, surface.id, &config.selectors.table_rows).await;
		for row in rows {
			if orders.len() >= limit {
				break;
			}
			match order_from_row(driver, surface.id, row).await {
				Ok(Some(order)) => orders.push(order),
				Ok(None) => {}
				Err(err) => {
					warn!(target: "kiosk.extract", ?err, "order row read failed");
				}
			}
		}
		if orders.is_empty() {
			capture_diagnostic(driver, config, surface.id, "orders-empty").await;
		}
	}

	debug!(target: "kiosk.extract", count = orders.len(), "active orders extracted");
	Ok(orders)
}

async fn order_from_card(
	driver: &dyn Driver,
	config: &Config,
	surface: SurfaceId,
	card: Element,
) -> Result<Option<ActiveOrder>, ExtractError> {
	let selectors = &config.selectors;

	let status = scoped_text(driver, surface, card, &selectors.order_status).await?;
	let status = clean_ws(&status.unwrap_or_default());
	if !is_active_status(&status) {
		return Ok(None);
	}

	let full = clean_ws(&driver.read_text(surface, card).await?);
	let id = match scoped_text(driver, surface, card, &selectors.order_id).await? {
		Some(text) => parse_order_token(&text).unwrap_or_else(|| clean_ws(&text)),
		None => parse_order_token(&full).unwrap_or_default(),
	};
	let buyer = scoped_text(driver, surface, card, &selectors.order_buyer)
		.await?
		.map(|t| clean_ws(&t))
		.unwrap_or_default();
	let amount_text = scoped_text(driver, surface, card, &selectors.order_amount)
		.await?
		.map(|t| clean_ws(&t))
		.unwrap_or_else(|| full.clone());
	let amount = parse_amount(&amount_text);
	let description = scoped_text(driver, surface, card, &selectors.order_desc)
		.await?
		.map(|t| clean_ws(&t))
		.unwrap_or_default();
	let date = scoped_text(driver, surface, card, &selectors.order_date)
		.await?
		.map(|t| clean_ws(&t))
		.unwrap_or_default();

	Ok(Some(ActiveOrder { id, buyer, amount, amount_text, description, date, status }))
}

async fn order_from_row(
	driver: &dyn Driver,
	surface: SurfaceId,
	row: Element,
) -> Result<Option<ActiveOrder>, ExtractError> {
	let text = clean_ws(&driver.read_text(surface, row).await?);
	if is_header_row(&text) || !is_active_status(&text) {
		return Ok(None);
	}
	let id = parse_order_token(&text).unwrap_or_default();
	let amount = parse_amount(&text);
	Ok(Some(ActiveOrder {
		id,
		buyer: String::new(),
		amount,
		amount_text: text.clone(),
		description: text.clone(),
		date: String::new(),
		status: "Оплачен".to_string(),
	}))
}

async fn scoped_text(
	driver: &dyn Driver,
	surface: SurfaceId,
	scope: Element,
	candidates: &[String],
) -> Result<Option<String>, ExtractError> {
	match locate_within_first(driver, surface, scope, candidates).await {
		Some(element) => Ok(Some(driver.read_text(surface, element).await?)),
		None => Ok(None),
	}
}

/// Lists dialogs from the chat page, capped at `config.dialog_cap`.
///
/// The page is reloaded on every listing so unread state is never served
/// from a stale DOM. The conversation id comes from the entry's `data-id`
/// attribute, then a `node=` query parameter in its href, then `"unknown"`.
/// Unread state is a class-name check. An entry that fails to read is
/// skipped, not fatal to the listing.
pub async fn dialogs(
	driver: &dyn Driver,
	config: &Config,
	surface: &mut Surface,
) -> Result<Vec<DialogRecord>, ExtractError> {
	surface.navigate(driver, &config.chat_url()).await?;

	let entries = locate_all_first(driver, surface.id, &config.selectors.dialog_list).await;
	if entries.is_empty() {
		capture_diagnostic(driver, config, surface.id, "dialogs-empty").await;
		return Ok(Vec::new());
	}

	let mut records = Vec::new();
	for (index, entry) in entries.into_iter().enumerate() {
		if records.len() >= config.dialog_cap {
			break;
		}
		match dialog_from_entry(driver, config, surface.id, index, entry).await {
			Ok(record) => records.push(record),
			Err(err) => {
				warn!(target: "kiosk.extract", ?err, "dialog entry read failed");
			}
		}
	}

	debug!(target: "kiosk.extract", count = records.len(), "dialogs listed");
	Ok(records)
}

async fn dialog_from_entry(
	driver: &dyn Driver,
	config: &Config,
	surface: SurfaceId,
	index: usize,
	entry: Element,
) -> Result<DialogRecord, ExtractError> {
	let conversation_id = conversation_id(driver, surface, entry).await?;
	let name = match locate_within_first(driver, surface, entry, &config.selectors.dialog_name).await {
		Some(el) => clean_ws(&driver.read_text(surface, el).await?),
		None => String::new(),
	};
	let name = if name.is_empty() { format!("Dialog {}", index + 1) } else { name };
	let unread = driver
		.attribute(surface, entry, "class")
		.await?
		.is_some_and(|classes| classes.contains("unread"));
	Ok(DialogRecord { conversation_id, name, unread })
}

/// Resolves a dialog entry to a conversation id.
pub async fn conversation_id(
	driver: &dyn Driver,
	surface: SurfaceId,
	entry: Element,
) -> Result<String, ExtractError> {
	if let Some(id) = driver.attribute(surface, entry, "data-id").await? {
		if !id.is_empty() {
			return Ok(id);
		}
	}
	if let Some(href) = driver.attribute(surface, entry, "href").await? {
		if let Some(id) = node_param(&href) {
			return Ok(id);
		}
	}
	Ok("unknown".to_string())
}

fn node_param(href: &str) -> Option<String> {
	let (_, tail) = href.split_once("node=")?;
	let id: String = tail.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '-').collect();
	if id.is_empty() { None } else { Some(id) }
}

/// Saves a screenshot of the surface for post-mortem inspection. Failures
/// are logged and swallowed.
pub async fn capture_diagnostic(
	driver: &dyn Driver,
	config: &Config,
	surface: SurfaceId,
	tag: &str,
) -> Option<PathBuf> {
	if let Err(err) = std::fs::create_dir_all(&config.diagnostics_dir) {
		warn!(target: "kiosk.extract", ?err, "diagnostics dir unavailable");
		return None;
	}
	let path = config.diagnostics_dir.join(format!("{}-{}.png", tag, crate::dedup::epoch_now()));
	match driver.screenshot(surface, &path).await {
		Ok(()) => {
			debug!(target: "kiosk.extract", path = %path.display(), "diagnostic capture saved");
			Some(path)
		}
		Err(err) => {
			warn!(target: "kiosk.extract", ?err, "diagnostic capture failed");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_plain_and_grouped_amounts() {
		assert_eq!(parse_amount("100 ₽"), Some(100.0));
		assert_eq!(parse_amount("1 234,56 ₽"), Some(1234.56));
		assert_eq!(parse_amount("Баланс: 50.20 р"), Some(50.2));
		assert_eq!(parse_amount("no money here"), None);
	}

	#[test]
	fn parses_order_tokens() {
		assert_eq!(parse_order_token("Заказ # ABC-123"), Some("ABC-123".to_string()));
		assert_eq!(parse_order_token("#42x"), Some("42x".to_string()));
		assert_eq!(parse_order_token("no token"), None);
	}

	#[test]
	fn bucket_order_prefers_paid() {
		assert_eq!(bucket_line("Оплачен 100 ₽"), Some(StatusBucket::Paid));
		assert_eq!(bucket_line("Закрыт 50 ₽"), Some(StatusBucket::Closed));
		assert_eq!(bucket_line("Возврат 20 ₽"), Some(StatusBucket::Refunded));
		// A line carrying both keywords lands in the first bucket checked.
		assert_eq!(bucket_line("Оплачен, Закрыт"), Some(StatusBucket::Paid));
		assert_eq!(bucket_line("В ожидании"), None);
	}

	#[test]
	fn active_status_excludes_terminal_keywords() {
		assert!(is_active_status("Оплачен"));
		assert!(is_active_status("оплачен"));
		assert!(!is_active_status("Оплачен, Закрыт"));
		assert!(!is_active_status("Возврат"));
		assert!(!is_active_status(""));
	}

	#[test]
	fn whitespace_collapses() {
		assert_eq!(clean_ws("  a \t b\n\nc  "), "a b c");
	}

	#[test]
	fn node_param_extracts_id() {
		assert_eq!(node_param("https://x/chat/?node=42"), Some("42".to_string()));
		assert_eq!(node_param("/chat/?node=ab-3&x=1"), Some("ab-3".to_string()));
		assert_eq!(node_param("/chat/"), None);
	}

	#[test]
	fn totals_round_to_cents() {
		let totals = TradeTotals { paid: 100.0, closed: 50.0, refunded: 20.0, ..Default::default() };
		assert_eq!(totals.total(), 170.0);
		assert_eq!(round2(0.1 + 0.2), 0.3);
	}
}
