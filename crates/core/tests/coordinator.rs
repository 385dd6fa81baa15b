//! Coordinator behavior against scripted pages.

use std::sync::Arc;
use std::time::Duration;

use kiosk::driver::{FakeAction, FakeController, FakeDriver, ScriptedNode, ScriptedPage};
use kiosk::{Config, Coordinator, PostCadence};

fn test_config(dir: &tempfile::TempDir) -> Config {
	let mut config = Config::default();
	config.base_url = "https://site.test/".to_string();
	config.section_url = "https://site.test/lots/1/".to_string();
	config.session_state_path = dir.path().join("session.json");
	config.credentials_path = dir.path().join("credentials.json");
	config.processed_dialogs_path = dir.path().join("processed_dialogs.json");
	config.diagnostics_dir = dir.path().join("diagnostics");
	config
}

fn setup(dir: &tempfile::TempDir) -> (Arc<Coordinator>, FakeController) {
	let (driver, controller) = FakeDriver::new();
	let coordinator = Arc::new(Coordinator::new(Arc::new(driver), test_config(dir)));
	(coordinator, controller)
}

fn chat_page_with_input() -> ScriptedPage {
	ScriptedPage::new()
		.with_node(ScriptedNode::new(&["textarea[name='content']"], ""))
		.with_node(ScriptedNode::new(&["button[type='submit']"], "Send"))
}

#[tokio::test(start_paused = true)]
async fn balance_is_cached_within_the_freshness_window() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page(
		"https://site.test/",
		ScriptedPage::new().with_node(ScriptedNode::new(&["[data-balance]"], "1 234,56 ₽")),
	);

	let first = coordinator.fetch_balance().await.unwrap();
	assert_eq!(first, "1 234,56 ₽");

	// The page changes, but within the window the cache still answers.
	controller.set_page(
		"https://site.test/",
		ScriptedPage::new().with_node(ScriptedNode::new(&["[data-balance]"], "999 ₽")),
	);
	let second = coordinator.fetch_balance().await.unwrap();
	assert_eq!(second, "1 234,56 ₽");

	// Past the window the read goes back to the page.
	tokio::time::advance(Duration::from_secs(11)).await;
	let third = coordinator.fetch_balance().await.unwrap();
	assert_eq!(third, "999 ₽");
}

#[tokio::test(start_paused = true)]
async fn balance_takes_any_non_empty_selector_text() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	// The site decides the formatting; no currency marker is required.
	controller.set_page(
		"https://site.test/",
		ScriptedPage::new().with_node(ScriptedNode::new(&["[data-balance]"], "Balance: 1000 USD")),
	);

	let balance = coordinator.fetch_balance().await.unwrap();
	assert_eq!(balance, "Balance: 1000 USD");
}

#[tokio::test(start_paused = true)]
async fn trade_totals_bucket_by_status_keyword() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page(
		"https://site.test/orders/trade?state=paid",
		ScriptedPage::new()
			.with_node(ScriptedNode::new(&["tbody tr"], "Дата Сумма Статус"))
			.with_node(ScriptedNode::new(&["tbody tr"], "01.05 Buyer1 Оплачен 100 ₽"))
			.with_node(ScriptedNode::new(&["tbody tr"], "02.05 Buyer2 Закрыт 50 ₽"))
			.with_node(ScriptedNode::new(&["tbody tr"], "03.05 Buyer3 Возврат 20 ₽")),
	);

	let totals = coordinator.fetch_trade_totals().await.unwrap();
	assert_eq!(totals.paid, 100.0);
	assert_eq!(totals.closed, 50.0);
	assert_eq!(totals.refunded, 20.0);
	assert_eq!(totals.total(), 170.0);
	assert_eq!((totals.paid_count, totals.closed_count, totals.refunded_count), (1, 1, 1));
}

#[tokio::test(start_paused = true)]
async fn terminal_orders_are_not_active() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	let card = |status: &str, id: &str| {
		ScriptedNode::new(&[".tc-item"], "")
			.with_child(ScriptedNode::new(&[".tc-status"], status))
			.with_child(ScriptedNode::new(&[".tc-order"], id))
			.with_child(ScriptedNode::new(&[".tc-sum"], "100 ₽"))
	};
	controller.set_page(
		"https://site.test/orders/trade?state=paid",
		ScriptedPage::new()
			.with_node(card("Оплачен", "#AAA-1"))
			.with_node(card("Оплачен, Закрыт", "#BBB-2"))
			.with_node(card("Возврат", "#CCC-3")),
	);

	let orders = coordinator.fetch_active_orders(20).await.unwrap();
	assert_eq!(orders.len(), 1);
	assert_eq!(orders[0].id, "AAA-1");
	assert_eq!(orders[0].amount, Some(100.0));
}

#[tokio::test(start_paused = true)]
async fn no_orders_resolves_to_an_empty_list() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page("https://site.test/orders/trade?state=paid", ScriptedPage::new());

	let orders = coordinator.fetch_active_orders(20).await.unwrap();
	assert!(orders.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reply_first_unread_records_the_conversation() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	let entry = ScriptedNode::new(&["a.contact-item"], "")
		.with_attr("data-id", "42")
		.with_attr("class", "contact-item unread")
		.with_child(ScriptedNode::new(&[".media-user-name"], "Buyer"));
	controller.set_page("https://site.test/chat/", chat_page_with_input().with_node(entry));
	controller.set_page("https://site.test/chat/?node=42", chat_page_with_input());

	let sent = coordinator.reply_first_unread("thanks, on it").await;
	assert!(sent);
	assert_eq!(coordinator.reply_ledger_len(), 1);

	let typed: String = controller.sent_texts("textarea[name='content']").join("");
	assert_eq!(typed, "thanks, on it");

	// Success also persists the session blob.
	assert!(controller
		.actions()
		.iter()
		.any(|a| matches!(a, FakeAction::SavedState(path) if path.ends_with("session.json"))));
}

#[tokio::test(start_paused = true)]
async fn reply_into_a_dead_page_reports_false() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, _controller) = setup(&dir);
	// The conversation page is not scripted at all: no input anywhere.
	let sent = coordinator.reply_to_dialog("9", "hello").await;
	assert!(!sent);
	assert_eq!(coordinator.reply_ledger_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn dialog_listing_reports_unread_flags() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page(
		"https://site.test/chat/",
		ScriptedPage::new()
			.with_node(
				ScriptedNode::new(&["a.contact-item"], "")
					.with_attr("data-id", "1")
					.with_attr("class", "contact-item unread")
					.with_child(ScriptedNode::new(&[".media-user-name"], "First")),
			)
			.with_node(
				ScriptedNode::new(&["a.contact-item"], "")
					.with_attr("href", "/chat/?node=7")
					.with_attr("class", "contact-item"),
			),
	);

	let dialogs = coordinator.dialogs().await.unwrap();
	assert_eq!(dialogs.len(), 2);
	assert_eq!(dialogs[0].conversation_id, "1");
	assert_eq!(dialogs[0].name, "First");
	assert!(dialogs[0].unread);
	// Fallbacks: href node id, positional name.
	assert_eq!(dialogs[1].conversation_id, "7");
	assert_eq!(dialogs[1].name, "Dialog 2");
	assert!(!dialogs[1].unread);

	let unread = coordinator.unread_dialogs().await.unwrap();
	assert_eq!(unread.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_bad_dialog_entry_does_not_sink_the_listing() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page(
		"https://site.test/chat/",
		ScriptedPage::new()
			.with_node(ScriptedNode::new(&["a.contact-item"], "").with_attr("data-id", "1").failing())
			.with_node(
				ScriptedNode::new(&["a.contact-item"], "")
					.with_attr("data-id", "2")
					.with_attr("class", "contact-item unread"),
			),
	);

	let dialogs = coordinator.dialogs().await.unwrap();
	assert_eq!(dialogs.len(), 1);
	assert_eq!(dialogs[0].conversation_id, "2");
	assert!(dialogs[0].unread);
}

#[tokio::test(start_paused = true)]
async fn dialog_listing_reloads_the_chat_page() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page(
		"https://site.test/chat/",
		ScriptedPage::new()
			.with_node(ScriptedNode::new(&["a.contact-item"], "").with_attr("data-id", "1")),
	);

	coordinator.dialogs().await.unwrap();
	coordinator.dialogs().await.unwrap();

	let reloads = controller
		.actions()
		.iter()
		.filter(|a| matches!(a, FakeAction::Navigated(url) if url == "https://site.test/chat/"))
		.count();
	assert_eq!(reloads, 2);
}

#[tokio::test(start_paused = true)]
async fn loop_posts_and_auto_replies_once_per_cooldown() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page("https://site.test/lots/1/", chat_page_with_input());
	let entry = ScriptedNode::new(&["a.contact-item", ".contact-item.unread"], "")
		.with_attr("data-id", "77")
		.with_attr("class", "contact-item unread");
	controller.set_page("https://site.test/chat/", chat_page_with_input().with_node(entry));

	let captures = Arc::new(std::sync::atomic::AtomicUsize::new(0));
	let seen = captures.clone();
	coordinator.set_screenshot_callback(Arc::new(move |_path, conversation| {
		assert_eq!(conversation, Some("77"));
		seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
	}));

	coordinator.start();
	// Second start is a no-op while the loop runs.
	coordinator.start();
	assert!(coordinator.running());

	// Let a few post intervals and watch slices elapse.
	tokio::time::sleep(Duration::from_secs(12)).await;
	coordinator.stop().await;
	assert!(!coordinator.running());

	let config = coordinator.config();
	let sent = controller.sent_texts("textarea[name='content']").join("");
	assert!(sent.contains(&config.post_text), "posting loop published the post text");
	// The unread dialog was answered exactly once: the wall-clock cooldown
	// blocks every later watch pass in this test's lifetime.
	let replies = sent.matches(&config.auto_reply_text).count();
	assert_eq!(replies, 1);
	assert_eq!(coordinator.reply_ledger_len(), 1);
	// The dialog was captured for the operator before the reply went out.
	assert_eq!(captures.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduled_cadence_waits_the_post_interval_between_posts() {
	let dir = tempfile::tempdir().unwrap();
	let mut config = test_config(&dir);
	config.post_cadence = PostCadence::Scheduled;
	config.auto_reply_enabled = false;
	let (driver, controller) = FakeDriver::new();
	let coordinator = Arc::new(Coordinator::new(Arc::new(driver), config));
	controller.set_page("https://site.test/lots/1/", chat_page_with_input());

	coordinator.set_post_interval(1);
	coordinator.start();
	tokio::time::sleep(Duration::from_secs(130)).await;
	coordinator.stop().await;

	let posts = controller
		.actions()
		.iter()
		.filter(|a| matches!(a, FakeAction::Clicked(sel) if sel == "button[type='submit']"))
		.count();
	// One post at start, then one per 60-second interval within 130 s.
	assert_eq!(posts, 3);
}

#[tokio::test(start_paused = true)]
async fn cookie_login_requires_a_session_cookie() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, _controller) = setup(&dir);

	let err = coordinator.login_with_cookie_header("theme=dark; lang=ru").await.unwrap_err();
	assert!(matches!(err, kiosk::Error::CookieHeader));
}

#[tokio::test(start_paused = true)]
async fn cookie_login_imports_and_persists_the_session() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page(
		"https://site.test/",
		ScriptedPage::new().with_content("<div class=\"badge-balance\">100</div>"),
	);

	coordinator.login_with_cookie_header("PHPSESSID=abc; theme=dark").await.unwrap();

	let actions = controller.actions();
	assert!(actions.iter().any(|a| matches!(a, FakeAction::InjectedCookies(2))));
	assert!(actions
		.iter()
		.any(|a| matches!(a, FakeAction::SavedState(path) if path.ends_with("session.json"))));
}

#[tokio::test(start_paused = true)]
async fn credential_login_times_out_without_a_marker() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page("https://site.test/account/login", ScriptedPage::new());

	let credentials = kiosk::login::Credentials {
		login: "seller@example.com".to_string(),
		password: "pw".to_string(),
	};
	let err = coordinator.login_with_credentials(&credentials, false).await.unwrap_err();
	assert!(matches!(err, kiosk::Error::LoginTimeout { secs: 300 }));
	assert!(!dir.path().join("credentials.json").exists());
}

#[tokio::test(start_paused = true)]
async fn reset_clears_session_artifacts() {
	let dir = tempfile::tempdir().unwrap();
	let (coordinator, controller) = setup(&dir);
	controller.set_page("https://site.test/chat/?node=5", chat_page_with_input());
	controller.set_page("https://site.test/chat/", chat_page_with_input());

	std::fs::write(dir.path().join("session.json"), "[]").unwrap();
	std::fs::write(dir.path().join("credentials.json"), "{}").unwrap();
	assert!(coordinator.reply_to_dialog("5", "hi").await);
	assert!(dir.path().join("processed_dialogs.json").exists());

	coordinator.reset_session().await.unwrap();
	assert!(!dir.path().join("session.json").exists());
	assert!(!dir.path().join("credentials.json").exists());
	assert!(!dir.path().join("processed_dialogs.json").exists());
	assert_eq!(coordinator.reply_ledger_len(), 0);
}
