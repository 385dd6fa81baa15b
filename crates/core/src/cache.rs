//! Freshness-window caching for expensive reads.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// A single cached value with an age stamp.
///
/// The cell itself carries no window; the caller supplies one per read, so a
/// config change takes effect on the next access without invalidation.
#[derive(Debug)]
pub struct TtlCell<T> {
	slot: Mutex<Option<(T, Instant)>>,
}

impl<T> Default for TtlCell<T> {
	fn default() -> Self {
		Self { slot: Mutex::new(None) }
	}
}

impl<T: Clone> TtlCell<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the cached value if it is younger than `window`.
	pub fn fresh(&self, window: Duration) -> Option<T> {
		let slot = self.slot.lock();
		match slot.as_ref() {
			Some((value, stamp)) if stamp.elapsed() < window => Some(value.clone()),
			_ => None,
		}
	}

	pub fn store(&self, value: T) {
		*self.slot.lock() = Some((value, Instant::now()));
	}

	pub fn clear(&self) {
		*self.slot.lock() = None;
	}

	/// Returns a fresh cached value or recomputes one.
	///
	/// Only a successful computation is stored; an error leaves the cell
	/// unchanged so the next call retries.
	pub async fn get_or_compute<E, F, Fut>(&self, window: Duration, compute: F) -> Result<T, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Some(value) = self.fresh(window) {
			return Ok(value);
		}
		let value = compute().await?;
		self.store(value.clone());
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn second_read_within_window_skips_compute() {
		let cell = TtlCell::new();
		let window = Duration::from_secs(10);
		let mut calls = 0u32;

		let first: Result<u64, ()> = cell
			.get_or_compute(window, || {
				calls += 1;
				async { Ok(7) }
			})
			.await;
		assert_eq!(first, Ok(7));

		tokio::time::advance(Duration::from_secs(9)).await;
		let second: Result<u64, ()> = cell
			.get_or_compute(window, || {
				calls += 1;
				async { Ok(8) }
			})
			.await;
		assert_eq!(second, Ok(7));
		assert_eq!(calls, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn stale_value_is_recomputed() {
		let cell = TtlCell::new();
		let window = Duration::from_secs(10);
		cell.store(1u64);

		tokio::time::advance(Duration::from_secs(11)).await;
		assert_eq!(cell.fresh(window), None);

		let next: Result<u64, ()> = cell.get_or_compute(window, || async { Ok(2) }).await;
		assert_eq!(next, Ok(2));
		assert_eq!(cell.fresh(window), Some(2));
	}

	#[tokio::test(start_paused = true)]
	async fn failed_compute_leaves_cell_empty() {
		let cell: TtlCell<u64> = TtlCell::new();
		let window = Duration::from_secs(10);

		let out: Result<u64, &str> = cell.get_or_compute(window, || async { Err("down") }).await;
		assert_eq!(out, Err("down"));
		assert_eq!(cell.fresh(window), None);
	}
}
