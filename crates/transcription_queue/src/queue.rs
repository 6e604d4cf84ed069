use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::task::TaskId;

/// Result of a blocking pop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
	Task(TaskId),
	/// The wait timed out with nothing pending
	Idle,
	/// [`PendingQueue::interrupt`] was called
	Interrupted,
}

#[derive(Default)]
struct Inner {
	ids: VecDeque<TaskId>,
	interrupted: bool,
}

/// FIFO of task ids waiting for the worker
#[derive(Default)]
pub struct PendingQueue {
	inner: Mutex<Inner>,
	available: Condvar,
}

impl PendingQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_back(&self, id: TaskId) {
		self.lock().ids.push_back(id);
		self.available.notify_one();
	}

	#[must_use]
	pub fn pop_front(&self) -> Option<TaskId> {
		self.lock().ids.pop_front()
	}

	/// Wait up to `timeout` for an id. Returns immediately once interrupted,
	/// even if ids are pending, so a stopping worker never picks up new work.
	pub fn wait_pop(&self, timeout: Duration) -> Pop {
		let mut inner = self.lock();
		loop {
			if inner.interrupted {
				return Pop::Interrupted;
			}
			if let Some(id) = inner.ids.pop_front() {
				return Pop::Task(id);
			}
			let (guard, wait) = self.available.wait_timeout(inner, timeout).unwrap_or_else(PoisonError::into_inner);
			inner = guard;
			if wait.timed_out() && !inner.interrupted && inner.ids.is_empty() {
				return Pop::Idle;
			}
		}
	}

	/// Remove `id` if still pending. Relative order of the rest is untouched.
	pub fn remove(&self, id: &TaskId) -> bool {
		let mut inner = self.lock();
		match inner.ids.iter().position(|pending| pending == id) {
			Some(index) => inner.ids.remove(index).is_some(),
			None => false,
		}
	}

	/// 0-based position of `id` among pending ids
	#[must_use]
	pub fn position(&self, id: &TaskId) -> Option<usize> {
		self.lock().ids.iter().position(|pending| pending == id)
	}

	#[must_use]
	pub fn snapshot(&self) -> Vec<TaskId> {
		self.lock().ids.iter().copied().collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.lock().ids.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.lock().ids.is_empty()
	}

	/// Wake every waiter and make further waits return [`Pop::Interrupted`]
	pub fn interrupt(&self) {
		self.lock().interrupted = true;
		self.available.notify_all();
	}

	pub fn resume(&self) {
		self.lock().interrupted = false;
	}

	#[must_use]
	pub fn is_interrupted(&self) -> bool {
		self.lock().interrupted
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
