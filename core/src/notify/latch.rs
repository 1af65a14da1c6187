use std::time::Duration;

use tokio::sync::watch;

/// Counts down to zero once, waiters are released when it gets there.
///
/// ```rust
/// use std::time::Duration;
///
/// use hv_core::notify::CountDownLatch;
///
/// # #[tokio::main]
/// # async fn main() {
/// let latch = CountDownLatch::new(2);
///
/// latch.count_down();
/// assert!(!latch.await_timeout(Duration::from_millis(10)).await);
///
/// latch.count_down();
/// assert!(latch.await_timeout(Duration::from_millis(10)).await);
/// # }
/// ```
#[derive(Debug)]
pub struct CountDownLatch {
	count: watch::Sender<usize>,
}

impl CountDownLatch {
	#[must_use]
	pub fn new(count: usize) -> Self {
		Self {
			count: watch::Sender::new(count),
		}
	}

	/// Never goes below zero.
	pub fn count_down(&self) {
		self.count.send_if_modified(|count| {
			if *count == 0 {
				return false;
			}
			*count -= 1;
			true
		});
	}

	#[must_use]
	pub fn count(&self) -> usize {
		*self.count.borrow()
	}

	/// Waits for the count to reach zero for at most `timeout`, returns whether it did.
	pub async fn await_timeout(&self, timeout: Duration) -> bool {
		let mut rx = self.count.subscribe();

		tokio::time::timeout(timeout, rx.wait_for(|count| *count == 0))
			.await
			.is_ok_and(|res| res.is_ok())
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	#[tokio::test]
	async fn zero_latch_is_open() {
		let latch = CountDownLatch::new(0);
		latch.count_down();

		assert_eq!(latch.count(), 0);
		assert!(latch.await_timeout(Duration::ZERO).await);
	}

	#[tokio::test]
	async fn released_from_other_tasks() {
		let latch = Arc::new(CountDownLatch::new(3));

		for delay in [5, 10, 15] {
			let latch = Arc::clone(&latch);
			tokio::spawn(async move {
				tokio::time::sleep(Duration::from_millis(delay)).await;
				latch.count_down();
			});
		}

		assert!(latch.await_timeout(Duration::from_secs(5)).await);
		assert_eq!(latch.count(), 0);
	}

	#[tokio::test]
	async fn wait_is_bounded() {
		let latch = CountDownLatch::new(1);

		assert!(!latch.await_timeout(Duration::from_millis(20)).await);
		assert_eq!(latch.count(), 1);
	}
}
