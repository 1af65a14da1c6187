//! Wall clock abstraction, so version generation and history pruning can be driven by a fake
//! clock in tests.

use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

pub trait TimeSource: Send + Sync {
	/// Milliseconds since the Unix epoch.
	fn current_time_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
	fn current_time_ms(&self) -> u64 {
		u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
	}
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
	fn current_time_ms(&self) -> u64 {
		(**self).current_time_ms()
	}
}

/// Manually driven clock. Clones share the same instant.
///
/// ```rust
/// use hv_dht::{FakeTimeSource, TimeSource};
///
/// let time = FakeTimeSource::new(1_000);
/// let shared = time.clone();
///
/// time.advance(500);
/// assert_eq!(shared.current_time_ms(), 1_500);
/// ```
#[derive(Debug, Clone)]
pub struct FakeTimeSource {
	now_ms: Arc<AtomicU64>,
}

impl Default for FakeTimeSource {
	fn default() -> Self {
		Self::new(1_000)
	}
}

impl FakeTimeSource {
	#[must_use]
	pub fn new(now_ms: u64) -> Self {
		Self {
			now_ms: Arc::new(AtomicU64::new(now_ms)),
		}
	}

	pub fn advance(&self, delta_ms: u64) {
		self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
	}

	/// Can go backwards, to simulate clock skew between peers.
	pub fn set(&self, now_ms: u64) {
		self.now_ms.store(now_ms, Ordering::SeqCst);
	}
}

impl TimeSource for FakeTimeSource {
	fn current_time_ms(&self) -> u64 {
		self.now_ms.load(Ordering::SeqCst)
	}
}
