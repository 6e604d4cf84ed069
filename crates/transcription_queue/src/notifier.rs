use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::thread;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::Result;
use crate::task::TaskRecord;

/// Handle returned by [`ProgressNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
	id: SubscriptionId,
	tx: mpsc::Sender<TaskRecord>,
}

/// Fan-out of task snapshots to callback and channel subscribers.
///
/// Every callback subscriber owns a bounded queue drained by its own delivery
/// thread, so a slow or panicking handler only ever affects itself. When a
/// subscriber's queue is full the event is dropped for that subscriber and a
/// warning is logged; publishing itself never blocks.
pub struct ProgressNotifier {
	subscribers: RwLock<Vec<Subscriber>>,
	events: broadcast::Sender<TaskRecord>,
	buffer: usize,
	next_id: AtomicU64,
}

impl ProgressNotifier {
	#[must_use]
	pub fn new(buffer: usize, event_capacity: usize) -> Self {
		let (events, _) = broadcast::channel(event_capacity.max(1));
		Self {
			subscribers: RwLock::new(Vec::new()),
			events,
			buffer: buffer.max(1),
			next_id: AtomicU64::new(1),
		}
	}

	/// Register `handler`. It is invoked, in publish order, with a snapshot of
	/// every record the scheduler publishes.
	pub fn subscribe<F>(&self, handler: F) -> Result<SubscriptionId>
	where
		F: Fn(&TaskRecord) + Send + 'static,
	{
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let (tx, mut rx) = mpsc::channel::<TaskRecord>(self.buffer);

		thread::Builder::new().name(format!("task-events-{}", id.0)).spawn(move || {
			while let Some(record) = rx.blocking_recv() {
				if panic::catch_unwind(AssertUnwindSafe(|| handler(&record))).is_err() {
					warn!(subscription = id.0, task_id = %record.id, status = %record.status, "Progress subscriber panicked; event skipped");
				}
			}
			debug!(subscription = id.0, "Progress subscriber detached");
		})?;

		self.subscribers.write().unwrap_or_else(PoisonError::into_inner).push(Subscriber { id, tx });
		debug!(subscription = id.0, "Progress subscriber attached");
		Ok(id)
	}

	/// Detach a subscriber. Events already queued for it are still delivered.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
		let before = subscribers.len();
		subscribers.retain(|subscriber| subscriber.id != id);
		before != subscribers.len()
	}

	/// Receiver for async consumers. Slow receivers observe
	/// [`broadcast::error::RecvError::Lagged`] instead of stalling publishers.
	#[must_use]
	pub fn events(&self) -> broadcast::Receiver<TaskRecord> {
		self.events.subscribe()
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn publish(&self, record: &TaskRecord) {
		let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
		for subscriber in subscribers.iter() {
			match subscriber.tx.try_send(record.snapshot()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => {
					warn!(subscription = subscriber.id.0, task_id = %record.id, status = %record.status, "Progress subscriber is full; event dropped");
				}
				Err(mpsc::error::TrySendError::Closed(_)) => {
					debug!(subscription = subscriber.id.0, "Progress subscriber closed");
				}
			}
		}
		drop(subscribers);

		// No receivers is not an error
		let _ = self.events.send(record.snapshot());
	}
}
