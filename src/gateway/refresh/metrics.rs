// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how access-token requests were satisfied.
///
/// Once every in-flight request has settled, `requests` equals
/// `reuses + rotations + failures`. `exchanges` counts remote grant round
/// trips; each one ends as a rotation or a failure.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	requests: AtomicU64,
	reuses: AtomicU64,
	exchanges: AtomicU64,
	rotations: AtomicU64,
	failures: AtomicU64,
}
impl RefreshMetrics {
	/// Total access-token requests, cache hits included.
	pub fn requests(&self) -> u64 {
		self.requests.load(Ordering::Relaxed)
	}

	/// Requests served by a cached token still inside its validity, without
	/// touching the remote.
	pub fn reuses(&self) -> u64 {
		self.reuses.load(Ordering::Relaxed)
	}

	/// Grant exchanges dispatched to the remote token endpoint.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Exchanges that rotated the refresh secret and yielded a fresh token.
	pub fn rotations(&self) -> u64 {
		self.rotations.load(Ordering::Relaxed)
	}

	/// Requests that failed, grant rejections included.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reuse(&self) {
		self.reuses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rotation(&self) {
		self.rotations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
