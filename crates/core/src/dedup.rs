//! Durable reply dedup store.
//!
//! Conversation ids map to the epoch second of the last auto-reply. The map
//! lives in a JSON file and is rewritten whole on every record, so a crash
//! between replies never loses more than the in-flight entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct DedupStore {
	path: PathBuf,
	entries: HashMap<String, u64>,
}

impl DedupStore {
	/// Loads the store, treating a missing or corrupt file as empty.
	pub fn load(path: &Path) -> Self {
		let entries = std::fs::read_to_string(path)
			.ok()
			.and_then(|content| serde_json::from_str(&content).ok())
			.unwrap_or_default();
		Self { path: path.to_path_buf(), entries }
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Whether a conversation may be auto-replied to at `now`.
	///
	/// Unknown conversations are eligible; known ones only once the cooldown
	/// has fully elapsed since the recorded reply.
	pub fn eligible(&self, conversation_id: &str, now: u64, cooldown: Duration) -> bool {
		match self.entries.get(conversation_id) {
			Some(&stamp) => now.saturating_sub(stamp) >= cooldown.as_secs(),
			None => true,
		}
	}

	/// Records a reply at `now` and persists the whole map.
	pub fn record(&mut self, conversation_id: &str, now: u64) -> Result<()> {
		self.entries.insert(conversation_id.to_string(), now);
		self.save()
	}

	/// Drops every entry and removes the backing file.
	pub fn purge_all(&mut self) -> Result<()> {
		self.entries.clear();
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(Error::Storage { path: self.path.clone(), source }),
		}
	}

	/// Drops entries older than `age` relative to `now`. Returns how many
	/// were removed.
	pub fn purge_older_than(&mut self, now: u64, age: Duration) -> Result<usize> {
		let before = self.entries.len();
		self.entries.retain(|_, stamp| now.saturating_sub(*stamp) < age.as_secs());
		let removed = before - self.entries.len();
		if removed > 0 {
			self.save()?;
			debug!(target: "kiosk.dedup", removed, "purged stale reply entries");
		}
		Ok(removed)
	}

	fn save(&self) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)
					.map_err(|source| Error::Storage { path: parent.to_path_buf(), source })?;
			}
		}
		let body = serde_json::to_string_pretty(&self.entries)?;
		std::fs::write(&self.path, body)
			.map_err(|source| Error::Storage { path: self.path.clone(), source })
	}
}

/// Seconds since the epoch, saturating at zero on a pre-epoch clock.
pub fn epoch_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or_else(|err| {
			warn!(target: "kiosk.dedup", ?err, "system clock before epoch");
			0
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store_in(dir: &tempfile::TempDir) -> DedupStore {
		DedupStore::load(&dir.path().join("processed_dialogs.json"))
	}

	#[test]
	fn cooldown_gates_eligibility() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = store_in(&dir);
		let cooldown = Duration::from_secs(120);

		assert!(store.eligible("42", 1_000, cooldown));
		store.record("42", 1_000).unwrap();
		assert!(!store.eligible("42", 1_060, cooldown));
		assert!(!store.eligible("42", 1_119, cooldown));
		assert!(store.eligible("42", 1_120, cooldown));
		assert!(store.eligible("42", 1_121, cooldown));
	}

	#[test]
	fn entries_survive_reload() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("processed_dialogs.json");

		let mut store = DedupStore::load(&path);
		store.record("a", 500).unwrap();
		store.record("b", 600).unwrap();

		let reloaded = DedupStore::load(&path);
		assert_eq!(reloaded.len(), 2);
		assert!(!reloaded.eligible("a", 550, Duration::from_secs(120)));
	}

	#[test]
	fn corrupt_file_loads_empty() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("processed_dialogs.json");
		std::fs::write(&path, "{not json").unwrap();

		let store = DedupStore::load(&path);
		assert!(store.is_empty());
	}

	#[test]
	fn purge_all_removes_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("processed_dialogs.json");

		let mut store = DedupStore::load(&path);
		store.record("x", 1).unwrap();
		assert!(path.exists());

		store.purge_all().unwrap();
		assert!(store.is_empty());
		assert!(!path.exists());
		// A second purge with no file is not an error.
		store.purge_all().unwrap();
	}

	#[test]
	fn purge_older_than_keeps_recent() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = store_in(&dir);
		store.record("old", 100).unwrap();
		store.record("new", 900).unwrap();

		let removed = store.purge_older_than(1_000, Duration::from_secs(500)).unwrap();
		assert_eq!(removed, 1);
		assert_eq!(store.len(), 1);
		assert!(!store.eligible("new", 950, Duration::from_secs(120)));
	}
}
