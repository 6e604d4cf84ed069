use chrono::Utc;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result, TranscribeError};
use crate::notifier::{ProgressNotifier, SubscriptionId};
use crate::pipeline::{AudioDecoder, ProgressReporter, SpeechTranscriber};
use crate::queue::{PendingQueue, Pop};
use crate::stats::{QueueStats, StatsSnapshot};
use crate::store::TaskStore;
use crate::task::{TaskId, TaskOptions, TaskRecord, TaskStatus};
use crate::transcript::TranscriptionResult;

/// Handle to the process-wide transcription scheduler.
///
/// Construct one at startup and clone the handle into every consumer; all
/// clones drive the same store, queue and worker. Every method is safe to call
/// concurrently from any thread.
#[derive(Clone)]
pub struct Scheduler {
	inner: Arc<Inner>,
}

struct Inner {
	config: QueueConfig,
	store: TaskStore,
	queue: PendingQueue,
	notifier: ProgressNotifier,
	decoder: Box<dyn AudioDecoder>,
	transcriber: Box<dyn SpeechTranscriber>,
	in_flight: Mutex<Option<InFlight>>,
	worker: Mutex<Option<JoinHandle<()>>>,
	stats: QueueStats,
}

/// The task the worker is currently running
struct InFlight {
	id: TaskId,
	cancel: CancellationToken,
}

enum Outcome {
	Completed(TranscriptionResult),
	Failed(String),
	Cancelled,
}

impl Scheduler {
	pub fn new<D, T>(config: QueueConfig, decoder: D, transcriber: T) -> Result<Self>
	where
		D: AudioDecoder + 'static,
		T: SpeechTranscriber + 'static,
	{
		config.validate()?;
		let notifier = ProgressNotifier::new(config.subscriber_buffer, config.event_capacity);

		Ok(Self {
			inner: Arc::new(Inner {
				config,
				store: TaskStore::new(),
				queue: PendingQueue::new(),
				notifier,
				decoder: Box::new(decoder),
				transcriber: Box::new(transcriber),
				in_flight: Mutex::new(None),
				worker: Mutex::new(None),
				stats: QueueStats::default(),
			}),
		})
	}

	/// Spawn the worker if it is not already running
	pub fn start(&self) -> Result<()> {
		let mut worker = lock(&self.inner.worker);
		if let Some(handle) = worker.take() {
			let on_worker = handle.thread().id() == thread::current().id();
			if on_worker || (!handle.is_finished() && !self.inner.queue.is_interrupted()) {
				// The live loop picks the queue back up before its next wait
				self.inner.queue.resume();
				*worker = Some(handle);
				debug!("Scheduler already running");
				return Ok(());
			}
			// A loop asked to stop from its own thread is still finishing its task
			if handle.join().is_err() {
				error!("Previous transcription worker terminated abnormally");
			}
		}

		self.inner.queue.resume();
		let inner = Arc::clone(&self.inner);
		let handle = thread::Builder::new().name(self.inner.config.worker_thread_name.clone()).spawn(move || {
			if panic::catch_unwind(AssertUnwindSafe(|| inner.run_worker())).is_err() {
				error!("Transcription worker loop panicked; aborting so queued work is not silently stranded");
				std::process::abort();
			}
		})?;
		*worker = Some(handle);

		info!(pending = self.inner.queue.len(), "Transcription scheduler started");
		Ok(())
	}

	/// Stop the worker once its current task reaches a terminal state.
	///
	/// The in-flight task is not cancelled; `stop` blocks until it finishes.
	/// Queued tasks remain queued for the next [`Scheduler::start`].
	pub fn stop(&self) {
		let mut worker = lock(&self.inner.worker);
		let Some(handle) = worker.take() else {
			return;
		};

		self.inner.queue.interrupt();
		if handle.thread().id() == thread::current().id() {
			warn!("Scheduler stopped from its own worker thread; the loop exits after the current task");
			*worker = Some(handle);
			return;
		}
		if handle.join().is_err() {
			error!("Transcription worker thread terminated abnormally");
		}

		info!(pending = self.inner.queue.len(), "Transcription scheduler stopped");
	}

	#[must_use]
	pub fn is_running(&self) -> bool {
		lock(&self.inner.worker).as_ref().is_some_and(|handle| !handle.is_finished())
	}

	pub fn enqueue_task(&self, audio: Vec<u8>, file_name: &str) -> Result<TaskId> {
		self.enqueue_task_with(audio, file_name, TaskOptions::default())
	}

	/// Validate and queue a new task. Returns as soon as the task is queued.
	pub fn enqueue_task_with(&self, audio: Vec<u8>, file_name: &str, options: TaskOptions) -> Result<TaskId> {
		if audio.is_empty() {
			return Err(QueueError::InvalidArgument("audio payload must not be empty".to_string()));
		}
		if file_name.trim().is_empty() {
			return Err(QueueError::InvalidArgument("file name must not be empty".to_string()));
		}

		let record = TaskRecord::new(Arc::from(audio), file_name.to_string(), options);
		let id = record.id;
		let audio_bytes = record.audio_bytes;
		// Queue and announce under the store lock so a cancel can never see the
		// record before its id is pending
		self.inner.store.insert_with(record, |record| {
			self.inner.queue.push_back(id);
			self.inner.notifier.publish(record);
		})?;
		self.inner.stats.increment_enqueued();

		info!(task_id = %id, file_name, audio_bytes, queue_length = self.inner.queue.len(), "Task queued");
		Ok(id)
	}

	#[must_use]
	pub fn get_task(&self, id: &TaskId) -> Option<TaskRecord> {
		let mut record = self.inner.store.get(id)?;
		if record.status == TaskStatus::Queued {
			record.queue_position = self.inner.queue.position(id);
		}
		Some(record)
	}

	/// Every task submitted during this process, oldest first
	#[must_use]
	pub fn get_all_tasks(&self) -> Vec<TaskRecord> {
		let positions: HashMap<TaskId, usize> = self.inner.queue.snapshot().into_iter().enumerate().map(|(position, id)| (id, position)).collect();

		let mut records = self.inner.store.get_all();
		for record in &mut records {
			if record.status == TaskStatus::Queued {
				record.queue_position = positions.get(&record.id).copied();
			}
		}
		records.sort_by_key(|record| record.created_at);
		records
	}

	/// Cancel a queued or processing task. `false` for unknown or terminal tasks.
	///
	/// A processing task becomes `Cancelled` immediately and its engine call is
	/// signalled; whatever the engine returns afterwards is discarded.
	pub fn cancel_task(&self, id: &TaskId) -> bool {
		let now = Utc::now();
		let left = self
			.inner
			.store
			.mutate(id, |record| {
				let left = record.cancel(now)?;
				if left == TaskStatus::Queued {
					self.inner.queue.remove(id);
				}
				self.inner.notifier.publish(record);
				Some(left)
			})
			.flatten();

		let Some(left) = left else {
			return false;
		};

		if left == TaskStatus::Processing {
			if let Some(in_flight) = lock(&self.inner.in_flight).as_ref().filter(|in_flight| in_flight.id == *id) {
				in_flight.cancel.cancel();
			}
		}
		self.inner.stats.increment_cancelled();
		info!(task_id = %id, previous = %left, "Task cancelled");
		true
	}

	/// Number of tasks waiting; the task being processed is not counted
	#[must_use]
	pub fn get_queue_length(&self) -> usize {
		self.inner.queue.len()
	}

	/// Register a callback for every published task snapshot.
	///
	/// Handlers run on a dedicated delivery thread per subscription.
	pub fn subscribe<F>(&self, handler: F) -> Result<SubscriptionId>
	where
		F: Fn(&TaskRecord) + Send + 'static,
	{
		self.inner.notifier.subscribe(handler)
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.inner.notifier.unsubscribe(id)
	}

	/// Async stream of task snapshots
	#[must_use]
	pub fn events(&self) -> broadcast::Receiver<TaskRecord> {
		self.inner.notifier.events()
	}

	#[must_use]
	pub fn stats(&self) -> StatsSnapshot {
		self.inner.stats.snapshot(self.inner.queue.len())
	}
}

impl Inner {
	fn run_worker(self: &Arc<Self>) {
		info!(worker = %self.config.worker_thread_name, "Worker loop started");

		loop {
			match self.queue.wait_pop(self.config.heartbeat_interval) {
				Pop::Task(id) => self.process(id),
				Pop::Idle => {
					let stats = self.stats.snapshot(self.queue.len());
					debug!(pending = stats.pending, completed = stats.completed, failed = stats.failed, cancelled = stats.cancelled, "Worker idle");
				}
				Pop::Interrupted => break,
			}
		}

		info!("Worker loop exited");
	}

	fn process(self: &Arc<Self>, id: TaskId) {
		let cancel = CancellationToken::new();
		*lock(&self.in_flight) = Some(InFlight { id, cancel: cancel.clone() });
		self.stats.set_busy(true);

		let picked = self
			.store
			.mutate(&id, |record| {
				let audio = record.begin_processing(Utc::now())?;
				self.notifier.publish(record);
				Some((audio, record.options.clone(), record.file_name.clone()))
			})
			.flatten();

		let Some((audio, options, file_name)) = picked else {
			debug!(task_id = %id, "Skipping task that is no longer queued");
			*lock(&self.in_flight) = None;
			self.stats.set_busy(false);
			return;
		};

		info!(task_id = %id, file_name = %file_name, audio_bytes = audio.len(), pending = self.queue.len(), "Processing task");

		let outcome = self.run_pipeline(id, &audio, &options, &cancel);
		drop(audio);
		self.finish(id, outcome);

		*lock(&self.in_flight) = None;
		self.stats.set_busy(false);
	}

	fn run_pipeline(self: &Arc<Self>, id: TaskId, audio: &[u8], options: &TaskOptions, cancel: &CancellationToken) -> Outcome {
		let started = Instant::now();

		let decoded = match guarded(|| self.decoder.decode(audio)) {
			Ok(Ok(decoded)) => decoded,
			Ok(Err(e)) => return Outcome::Failed(e.to_string()),
			Err(panic) => return Outcome::Failed(format!("audio decoder panicked: {panic}")),
		};
		if cancel.is_cancelled() {
			return Outcome::Cancelled;
		}
		debug!(task_id = %id, samples = decoded.samples.len(), duration_secs = decoded.duration_secs(), "Audio decoded");

		let reporter = {
			let inner = Arc::clone(self);
			ProgressReporter::new(move |fraction| inner.report_progress(id, fraction))
		};

		let transcript = match guarded(|| self.transcriber.transcribe(&decoded, options, cancel, &reporter)) {
			Ok(Ok(transcript)) => transcript,
			Ok(Err(TranscribeError::Cancelled)) => return Outcome::Cancelled,
			Ok(Err(e)) => return Outcome::Failed(e.to_string()),
			Err(panic) => return Outcome::Failed(format!("transcription engine panicked: {panic}")),
		};
		if cancel.is_cancelled() {
			return Outcome::Cancelled;
		}

		Outcome::Completed(TranscriptionResult::new(transcript, decoded.duration_secs(), started.elapsed().as_secs_f64()))
	}

	fn report_progress(&self, id: TaskId, fraction: f32) {
		self.store.mutate(&id, |record| {
			if record.advance_progress(fraction) {
				self.notifier.publish(record);
			}
		});
	}

	fn finish(&self, id: TaskId, outcome: Outcome) {
		let now = Utc::now();
		match outcome {
			Outcome::Completed(result) => {
				let processing_time_secs = result.processing_time_secs;
				if self.transition(&id, |record| record.complete(result, now)) {
					self.stats.increment_completed();
					info!(task_id = %id, processing_time_secs, "Task completed");
				} else {
					debug!(task_id = %id, "Discarding result of a task cancelled while processing");
				}
			}
			Outcome::Failed(error) => {
				if self.transition(&id, |record| record.fail(error.clone(), now)) {
					self.stats.increment_failed();
					warn!(task_id = %id, error = %error, "Task failed");
				} else {
					debug!(task_id = %id, error = %error, "Discarding failure of a task cancelled while processing");
				}
			}
			Outcome::Cancelled => {
				if self.transition(&id, |record| record.cancel(now).is_some()) {
					self.stats.increment_cancelled();
					info!(task_id = %id, "Task cancelled by the engine");
				} else {
					debug!(task_id = %id, "Cancellation acknowledged");
				}
			}
		}
	}

	/// Apply `update` and publish the record if it changed state
	fn transition(&self, id: &TaskId, update: impl FnOnce(&mut TaskRecord) -> bool) -> bool {
		self
			.store
			.mutate(id, |record| {
				let changed = update(record);
				if changed {
					self.notifier.publish(record);
				}
				changed
			})
			.unwrap_or(false)
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run a collaborator call, turning a panic into its message
fn guarded<T>(call: impl FnOnce() -> T) -> std::result::Result<T, String> {
	panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|message| (*message).to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::DecodeError;
	use crate::pipeline::DecodedAudio;
	use crate::transcript::Transcript;
	use std::time::Duration;

	fn decode(audio: &[u8]) -> std::result::Result<DecodedAudio, DecodeError> {
		Ok(DecodedAudio::new(vec![0.0; audio.len()], 16_000))
	}

	fn echo(audio: &DecodedAudio, _: &TaskOptions, _: &CancellationToken, progress: &ProgressReporter) -> std::result::Result<Transcript, TranscribeError> {
		progress.report(0.5);
		Ok(Transcript {
			text: format!("{} samples", audio.samples.len()),
			..Transcript::default()
		})
	}

	fn scheduler() -> Scheduler {
		Scheduler::new(QueueConfig::test(), decode, echo).unwrap()
	}

	fn wait_until(scheduler: &Scheduler, id: &TaskId, status: TaskStatus) -> TaskRecord {
		let deadline = Instant::now() + Duration::from_secs(5);
		loop {
			let record = scheduler.get_task(id).unwrap();
			if record.status == status {
				return record;
			}
			assert!(Instant::now() < deadline, "task stuck in {:?}", record.status);
			thread::sleep(Duration::from_millis(5));
		}
	}

	#[test]
	fn invalid_config_is_rejected() {
		let mut config = QueueConfig::test();
		config.event_capacity = 0;
		assert!(matches!(Scheduler::new(config, decode, echo), Err(QueueError::InvalidConfig(_))));
	}

	#[test]
	fn queued_task_reports_position() {
		let scheduler = scheduler();
		let first = scheduler.enqueue_task(vec![1; 8], "a.wav").unwrap();
		let second = scheduler.enqueue_task(vec![1; 8], "b.wav").unwrap();

		assert_eq!(scheduler.get_task(&first).unwrap().queue_position, Some(0));
		assert_eq!(scheduler.get_task(&second).unwrap().queue_position, Some(1));
		assert!(scheduler.cancel_task(&first));
		assert_eq!(scheduler.get_task(&second).unwrap().queue_position, Some(0));
		assert_eq!(scheduler.get_task(&first).unwrap().queue_position, None);
	}

	#[test]
	fn completed_task_carries_result_and_stats() {
		let scheduler = scheduler();
		scheduler.start().unwrap();
		let id = scheduler.enqueue_task(vec![1; 160], "a.wav").unwrap();

		let record = wait_until(&scheduler, &id, TaskStatus::Completed);
		let result = record.result.unwrap();
		assert_eq!(result.text, "160 samples");
		assert!((result.audio_duration_secs - 0.01).abs() < 1e-9);
		assert!((record.progress - 1.0).abs() < f32::EPSILON);
		assert!(record.started_at.is_some() && record.completed_at.is_some());

		scheduler.stop();
		let stats = scheduler.stats();
		assert_eq!(stats.enqueued, 1);
		assert_eq!(stats.completed, 1);
		assert!(!stats.worker_busy);
	}

	#[test]
	fn start_and_stop_are_idempotent() {
		let scheduler = scheduler();
		scheduler.stop();
		scheduler.start().unwrap();
		scheduler.start().unwrap();
		assert!(scheduler.is_running());

		scheduler.stop();
		scheduler.stop();
		assert!(!scheduler.is_running());
	}

	#[test]
	fn panic_message_extracts_strings() {
		let payload: Box<dyn Any + Send> = Box::new("boom");
		assert_eq!(panic_message(payload.as_ref()), "boom");
		let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
		assert_eq!(panic_message(payload.as_ref()), "bang");
		let payload: Box<dyn Any + Send> = Box::new(7_u8);
		assert_eq!(panic_message(payload.as_ref()), "unknown panic");
	}
}
