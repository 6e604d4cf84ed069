use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lifetime counters for one scheduler
#[derive(Default)]
pub(crate) struct QueueStats {
	enqueued: AtomicU64,
	completed: AtomicU64,
	failed: AtomicU64,
	cancelled: AtomicU64,
	busy: AtomicBool,
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
	pub enqueued: u64,
	pub completed: u64,
	pub failed: u64,
	pub cancelled: u64,
	pub pending: usize,
	pub worker_busy: bool,
}

impl QueueStats {
	pub fn increment_enqueued(&self) {
		self.enqueued.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_completed(&self) {
		self.completed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_failed(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn increment_cancelled(&self) {
		self.cancelled.fetch_add(1, Ordering::Relaxed);
	}

	pub fn set_busy(&self, value: bool) {
		self.busy.store(value, Ordering::Relaxed);
	}

	pub fn snapshot(&self, pending: usize) -> StatsSnapshot {
		StatsSnapshot {
			enqueued: self.enqueued.load(Ordering::Relaxed),
			completed: self.completed.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			cancelled: self.cancelled.load(Ordering::Relaxed),
			pending,
			worker_busy: self.busy.load(Ordering::Relaxed),
		}
	}
}
