//! Scripted in-memory driver for tests.
//!
//! [`FakeDriver`] answers the [`Driver`] trait from a set of scripted pages,
//! and [`FakeController`] is the test's handle for scripting those pages and
//! inspecting what the code under test did. Pages are keyed by URL; a
//! surface "shows" whatever page its current URL points at, and an unknown
//! URL is simply an empty page.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Driver, Element, StoredCookie, SurfaceId};
use crate::error::DriverError;

/// One scripted DOM node.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNode {
	/// Selectors this node answers to. Matching is exact string equality, so
	/// a script lists every candidate spelling it wants to satisfy.
	pub matches: Vec<String>,
	pub text: String,
	pub attributes: HashMap<String, String>,
	pub visible: bool,
	/// When set, every read or interaction against this node errors, as if
	/// its remote object died between lookup and use.
	pub failing: bool,
	pub children: Vec<ScriptedNode>,
}

impl ScriptedNode {
	pub fn new(selectors: &[&str], text: &str) -> Self {
		Self {
			matches: selectors.iter().map(|s| s.to_string()).collect(),
			text: text.to_string(),
			attributes: HashMap::new(),
			visible: true,
			failing: false,
			children: Vec::new(),
		}
	}

	pub fn with_attr(mut self, name: &str, value: &str) -> Self {
		self.attributes.insert(name.to_string(), value.to_string());
		self
	}

	pub fn with_child(mut self, child: ScriptedNode) -> Self {
		self.children.push(child);
		self
	}

	pub fn hidden(mut self) -> Self {
		self.visible = false;
		self
	}

	pub fn failing(mut self) -> Self {
		self.failing = true;
		self
	}

	fn answers(&self, selector: &str) -> bool {
		self.matches.iter().any(|m| m == selector)
	}

	fn label(&self) -> String {
		self.matches.first().cloned().unwrap_or_else(|| "<unlabeled>".to_string())
	}
}

/// One scripted page.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
	pub nodes: Vec<ScriptedNode>,
	/// What `page_text` returns.
	pub text: String,
	/// What `content` returns.
	pub content: String,
}

impl ScriptedPage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_node(mut self, node: ScriptedNode) -> Self {
		self.nodes.push(node);
		self
	}

	pub fn with_text(mut self, text: &str) -> Self {
		self.text = text.to_string();
		self
	}

	pub fn with_content(mut self, content: &str) -> Self {
		self.content = content.to_string();
		self
	}
}

/// Everything the code under test asked the driver to do.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeAction {
	Opened(String),
	Closed(SurfaceId),
	Navigated(String),
	Clicked(String),
	Cleared(String),
	Typed { target: String, text: String },
	Filled { target: String, text: String },
	Pressed { target: String, key: String },
	Screenshot(PathBuf),
	SavedState(PathBuf),
	RestoredState(PathBuf),
	InjectedCookies(usize),
	Shutdown,
}

#[derive(Debug, Clone)]
struct SurfaceState {
	url: String,
	live: bool,
}

/// Where a handed-out element lives: the URL it was found on and the index
/// path from the page's node list down to it.
#[derive(Debug, Clone)]
struct NodeRef {
	surface: SurfaceId,
	url: String,
	path: Vec<usize>,
}

#[derive(Debug, Default)]
struct FakeState {
	pages: HashMap<String, ScriptedPage>,
	surfaces: HashMap<SurfaceId, SurfaceState>,
	elements: HashMap<u64, NodeRef>,
	failing_urls: Vec<String>,
	actions: Vec<FakeAction>,
	next_surface: u64,
	next_element: u64,
}

impl FakeState {
	fn surface(&self, id: SurfaceId) -> Result<&SurfaceState, DriverError> {
		match self.surfaces.get(&id) {
			Some(state) if state.live => Ok(state),
			_ => Err(DriverError::SurfaceClosed),
		}
	}

	fn resolve(&self, element: Element) -> Result<(&NodeRef, &ScriptedNode), DriverError> {
		let node_ref = self
			.elements
			.get(&element.0)
			.ok_or_else(|| DriverError::Call("unknown element handle".to_string()))?;
		let surface = self.surface(node_ref.surface)?;
		if surface.url != node_ref.url {
			return Err(DriverError::Call("element stale after navigation".to_string()));
		}
		let page = self
			.pages
			.get(&node_ref.url)
			.ok_or_else(|| DriverError::Call("page no longer scripted".to_string()))?;
		let mut nodes = &page.nodes;
		let mut node = None;
		for &index in &node_ref.path {
			let current = nodes
				.get(index)
				.ok_or_else(|| DriverError::Call("element path out of range".to_string()))?;
			nodes = &current.children;
			node = Some(current);
		}
		let node = node.ok_or_else(|| DriverError::Call("empty element path".to_string()))?;
		if node.failing {
			return Err(DriverError::Call("scripted node failure".to_string()));
		}
		Ok((node_ref, node))
	}

	fn register(&mut self, surface: SurfaceId, url: &str, path: Vec<usize>) -> Element {
		self.next_element += 1;
		let id = self.next_element;
		self.elements.insert(id, NodeRef { surface, url: url.to_string(), path });
		Element(id)
	}

	fn find_all(&self, url: &str, selector: &str, root: &[usize]) -> Vec<Vec<usize>> {
		let Some(page) = self.pages.get(url) else {
			return Vec::new();
		};
		let mut nodes = &page.nodes;
		for &index in root {
			match nodes.get(index) {
				Some(node) => nodes = &node.children,
				None => return Vec::new(),
			}
		}
		let mut found = Vec::new();
		collect_matches(nodes, selector, root, &mut found);
		found
	}
}

fn collect_matches(nodes: &[ScriptedNode], selector: &str, prefix: &[usize], out: &mut Vec<Vec<usize>>) {
	for (index, node) in nodes.iter().enumerate() {
		let mut path = prefix.to_vec();
		path.push(index);
		if node.answers(selector) {
			out.push(path.clone());
		}
		collect_matches(&node.children, selector, &path, out);
	}
}

/// Test double backing the [`Driver`] trait with scripted pages.
#[derive(Debug, Clone)]
pub struct FakeDriver {
	state: Arc<Mutex<FakeState>>,
}

/// The test's scripting and inspection handle.
#[derive(Debug, Clone)]
pub struct FakeController {
	state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
	pub fn new() -> (Self, FakeController) {
		let state = Arc::new(Mutex::new(FakeState::default()));
		(Self { state: state.clone() }, FakeController { state })
	}
}

impl FakeController {
	/// Scripts (or replaces) the page served at `url`.
	pub fn set_page(&self, url: &str, page: ScriptedPage) {
		self.state.lock().pages.insert(url.to_string(), page);
	}

	/// Mutates an already scripted page in place.
	pub fn update_page(&self, url: &str, update: impl FnOnce(&mut ScriptedPage)) {
		let mut state = self.state.lock();
		update(state.pages.entry(url.to_string()).or_default());
	}

	/// Makes every navigation to `url` fail.
	pub fn fail_navigation(&self, url: &str) {
		self.state.lock().failing_urls.push(url.to_string());
	}

	/// Marks a surface dead, as if its tab crashed.
	pub fn kill_surface(&self, surface: SurfaceId) {
		if let Some(state) = self.state.lock().surfaces.get_mut(&surface) {
			state.live = false;
		}
	}

	pub fn actions(&self) -> Vec<FakeAction> {
		self.state.lock().actions.clone()
	}

	pub fn clear_actions(&self) {
		self.state.lock().actions.clear();
	}

	/// Texts typed or filled into nodes matching `selector`, in order.
	pub fn sent_texts(&self, selector: &str) -> Vec<String> {
		self.state
			.lock()
			.actions
			.iter()
			.filter_map(|action| match action {
				FakeAction::Typed { target, text } if target == selector => Some(text.clone()),
				FakeAction::Filled { target, text } if target == selector => Some(text.clone()),
				_ => None,
			})
			.collect()
	}

	pub fn open_surface_count(&self) -> usize {
		self.state
			.lock()
			.actions
			.iter()
			.filter(|action| matches!(action, FakeAction::Opened(_)))
			.count()
	}
}

#[async_trait]
impl Driver for FakeDriver {
	async fn open_surface(&self, url: &str) -> Result<SurfaceId, DriverError> {
		let mut state = self.state.lock();
		if state.failing_urls.iter().any(|u| u == url) {
			return Err(DriverError::Navigation { url: url.to_string(), reason: "scripted failure".to_string() });
		}
		state.next_surface += 1;
		let id = SurfaceId(state.next_surface);
		state.surfaces.insert(id, SurfaceState { url: url.to_string(), live: true });
		state.actions.push(FakeAction::Opened(url.to_string()));
		Ok(id)
	}

	async fn close_surface(&self, surface: SurfaceId) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surfaces.remove(&surface).ok_or(DriverError::SurfaceClosed)?;
		state.actions.push(FakeAction::Closed(surface));
		Ok(())
	}

	async fn is_live(&self, surface: SurfaceId) -> bool {
		self.state.lock().surface(surface).is_ok()
	}

	async fn navigate(&self, surface: SurfaceId, url: &str) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surface(surface)?;
		if state.failing_urls.iter().any(|u| u == url) {
			return Err(DriverError::Navigation { url: url.to_string(), reason: "scripted failure".to_string() });
		}
		if let Some(surface_state) = state.surfaces.get_mut(&surface) {
			surface_state.url = url.to_string();
		}
		state.actions.push(FakeAction::Navigated(url.to_string()));
		Ok(())
	}

	async fn current_url(&self, surface: SurfaceId) -> Result<String, DriverError> {
		Ok(self.state.lock().surface(surface)?.url.clone())
	}

	async fn locate(&self, surface: SurfaceId, selector: &str) -> Result<Option<Element>, DriverError> {
		let mut state = self.state.lock();
		let url = state.surface(surface)?.url.clone();
		let found = state.find_all(&url, selector, &[]);
		Ok(found.into_iter().next().map(|path| state.register(surface, &url, path)))
	}

	async fn locate_all(&self, surface: SurfaceId, selector: &str) -> Result<Vec<Element>, DriverError> {
		let mut state = self.state.lock();
		let url = state.surface(surface)?.url.clone();
		let found = state.find_all(&url, selector, &[]);
		Ok(found.into_iter().map(|path| state.register(surface, &url, path)).collect())
	}

	async fn locate_within(
		&self,
		surface: SurfaceId,
		element: Element,
		selector: &str,
	) -> Result<Option<Element>, DriverError> {
		let mut state = self.state.lock();
		let (node_ref, _) = state.resolve(element)?;
		let url = node_ref.url.clone();
		let root = node_ref.path.clone();
		let found = state.find_all(&url, selector, &root);
		Ok(found
			.into_iter()
			.find(|path| path.len() > root.len())
			.map(|path| state.register(surface, &url, path)))
	}

	async fn read_text(&self, _surface: SurfaceId, element: Element) -> Result<String, DriverError> {
		let state = self.state.lock();
		let (_, node) = state.resolve(element)?;
		Ok(node.text.clone())
	}

	async fn attribute(
		&self,
		_surface: SurfaceId,
		element: Element,
		name: &str,
	) -> Result<Option<String>, DriverError> {
		let state = self.state.lock();
		let (_, node) = state.resolve(element)?;
		Ok(node.attributes.get(name).cloned())
	}

	async fn is_visible(&self, _surface: SurfaceId, element: Element) -> Result<bool, DriverError> {
		let state = self.state.lock();
		let (_, node) = state.resolve(element)?;
		Ok(node.visible)
	}

	async fn click(&self, _surface: SurfaceId, element: Element) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		let label = state.resolve(element)?.1.label();
		state.actions.push(FakeAction::Clicked(label));
		Ok(())
	}

	async fn clear(&self, _surface: SurfaceId, element: Element) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		let label = state.resolve(element)?.1.label();
		state.actions.push(FakeAction::Cleared(label));
		Ok(())
	}

	async fn type_text(&self, _surface: SurfaceId, element: Element, text: &str) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		let label = state.resolve(element)?.1.label();
		state.actions.push(FakeAction::Typed { target: label, text: text.to_string() });
		Ok(())
	}

	async fn fill(&self, _surface: SurfaceId, element: Element, text: &str) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		let label = state.resolve(element)?.1.label();
		state.actions.push(FakeAction::Filled { target: label, text: text.to_string() });
		Ok(())
	}

	async fn press(&self, _surface: SurfaceId, element: Element, key: &str) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		let label = state.resolve(element)?.1.label();
		state.actions.push(FakeAction::Pressed { target: label, key: key.to_string() });
		Ok(())
	}

	async fn page_text(&self, surface: SurfaceId) -> Result<String, DriverError> {
		let state = self.state.lock();
		let url = state.surface(surface)?.url.clone();
		Ok(state.pages.get(&url).map(|page| page.text.clone()).unwrap_or_default())
	}

	async fn content(&self, surface: SurfaceId) -> Result<String, DriverError> {
		let state = self.state.lock();
		let url = state.surface(surface)?.url.clone();
		Ok(state.pages.get(&url).map(|page| page.content.clone()).unwrap_or_default())
	}

	async fn screenshot(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surface(surface)?;
		state.actions.push(FakeAction::Screenshot(path.to_path_buf()));
		Ok(())
	}

	async fn save_session_state(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surface(surface)?;
		state.actions.push(FakeAction::SavedState(path.to_path_buf()));
		Ok(())
	}

	async fn restore_session_state(&self, surface: SurfaceId, path: &Path) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surface(surface)?;
		state.actions.push(FakeAction::RestoredState(path.to_path_buf()));
		Ok(())
	}

	async fn inject_cookies(&self, surface: SurfaceId, cookies: &[StoredCookie]) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surface(surface)?;
		state.actions.push(FakeAction::InjectedCookies(cookies.len()));
		Ok(())
	}

	async fn shutdown(&self) -> Result<(), DriverError> {
		let mut state = self.state.lock();
		state.surfaces.clear();
		state.actions.push(FakeAction::Shutdown);
		Ok(())
	}
}
