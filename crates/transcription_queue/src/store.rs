use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{QueueError, Result};
use crate::task::{TaskId, TaskRecord};

/// Process-lifetime map of every task ever submitted.
///
/// Readers always receive snapshots; the only way to change a stored record
/// is [`TaskStore::mutate`], which runs under the write lock.
#[derive(Default)]
pub struct TaskStore {
	tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, record: TaskRecord) -> Result<()> {
		self.insert_with(record, |_| ())
	}

	/// Insert `record` and run `on_insert` on it before the write lock is
	/// released, so no other caller can observe the record in between.
	pub fn insert_with<R>(&self, record: TaskRecord, on_insert: impl FnOnce(&mut TaskRecord) -> R) -> Result<R> {
		let mut tasks = self.write();
		if tasks.contains_key(&record.id) {
			return Err(QueueError::DuplicateId(record.id));
		}
		let stored = tasks.entry(record.id).or_insert(record);
		Ok(on_insert(stored))
	}

	#[must_use]
	pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
		self.read().get(id).map(TaskRecord::snapshot)
	}

	/// Snapshot of all records. No ordering is promised.
	#[must_use]
	pub fn get_all(&self) -> Vec<TaskRecord> {
		self.read().values().map(TaskRecord::snapshot).collect()
	}

	/// Apply `update` to the stored record atomically. `None` if the id is unknown.
	pub fn mutate<R>(&self, id: &TaskId, update: impl FnOnce(&mut TaskRecord) -> R) -> Option<R> {
		self.write().get_mut(id).map(update)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.read().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.read().is_empty()
	}

	// Writers never leave a record half-updated across a panic point, so a
	// poisoned lock still guards consistent data.
	fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, TaskRecord>> {
		self.tasks.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, TaskRecord>> {
		self.tasks.write().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::task::{TaskOptions, TaskStatus};
	use chrono::Utc;
	use std::sync::Arc;
	use std::thread;

	fn record(name: &str) -> TaskRecord {
		TaskRecord::new(Arc::from(vec![0_u8; 4]), name.to_string(), TaskOptions::default())
	}

	#[test]
	fn insert_and_get_returns_snapshot() {
		let store = TaskStore::new();
		let record = record("a.wav");
		let id = record.id;
		store.insert(record).unwrap();

		let snapshot = store.get(&id).unwrap();
		assert_eq!(snapshot.id, id);
		assert_eq!(snapshot.file_name, "a.wav");
		assert!(store.get(&TaskId::new()).is_none());
	}

	#[test]
	fn insert_with_runs_hook_on_stored_record_only_once_inserted() {
		let store = TaskStore::new();
		let record = record("hook.wav");
		let duplicate = record.clone();
		let id = record.id;

		let seen = store.insert_with(record, |stored| stored.file_name.clone()).unwrap();
		assert_eq!(seen, "hook.wav");

		let mut ran = false;
		assert!(store.insert_with(duplicate, |_| ran = true).is_err());
		assert!(!ran);
		assert_eq!(store.len(), 1);
		assert_eq!(store.get(&id).unwrap().status, TaskStatus::Queued);
	}

	#[test]
	fn duplicate_insert_is_rejected() {
		let store = TaskStore::new();
		let record = record("a.wav");
		let duplicate = record.clone();
		store.insert(record).unwrap();

		assert!(matches!(store.insert(duplicate), Err(QueueError::DuplicateId(_))));
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn mutate_changes_stored_record_only() {
		let store = TaskStore::new();
		let record = record("a.wav");
		let id = record.id;
		store.insert(record).unwrap();

		let before = store.get(&id).unwrap();
		let left = store.mutate(&id, |record| record.cancel(Utc::now())).flatten();
		assert_eq!(left, Some(TaskStatus::Queued));

		assert_eq!(before.status, TaskStatus::Queued);
		assert_eq!(store.get(&id).unwrap().status, TaskStatus::Cancelled);
		assert!(store.mutate(&TaskId::new(), |_| ()).is_none());
	}

	#[test]
	fn concurrent_inserts_are_all_visible() {
		let store = Arc::new(TaskStore::new());
		let handles: Vec<_> = (0..8)
			.map(|n| {
				let store = Arc::clone(&store);
				thread::spawn(move || {
					for i in 0..25 {
						store.insert(record(&format!("{n}-{i}.wav"))).unwrap();
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		assert_eq!(store.get_all().len(), 200);
	}
}
