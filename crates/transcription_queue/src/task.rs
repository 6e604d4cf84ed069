use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::transcript::TranscriptionResult;

/// Opaque task identifier, generated once per enqueue and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for TaskId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for TaskId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Queued,
	Processing,
	Completed,
	Failed,
	Cancelled,
}

impl TaskStatus {
	/// `Completed`, `Failed` and `Cancelled` accept no further transitions
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Queued => "queued",
			Self::Processing => "processing",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		};
		f.write_str(name)
	}
}

/// Caller hints forwarded untouched to the transcription engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
	pub language: Option<String>,
	pub model: Option<String>,
}

/// One submitted transcription job and its lifecycle state.
///
/// Records handed out by the scheduler are snapshots: the audio payload is
/// never included and `queue_position` reflects the queue at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
	pub id: TaskId,
	pub status: TaskStatus,
	pub progress: f32,
	pub file_name: String,
	pub options: TaskOptions,
	pub audio_bytes: usize,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub result: Option<TranscriptionResult>,
	pub error_message: Option<String>,
	pub queue_position: Option<usize>,
	#[serde(skip)]
	audio: Option<Arc<[u8]>>,
}

impl TaskRecord {
	pub(crate) fn new(audio: Arc<[u8]>, file_name: String, options: TaskOptions) -> Self {
		Self {
			id: TaskId::new(),
			status: TaskStatus::Queued,
			progress: 0.0,
			file_name,
			options,
			audio_bytes: audio.len(),
			created_at: Utc::now(),
			started_at: None,
			completed_at: None,
			result: None,
			error_message: None,
			queue_position: None,
			audio: Some(audio),
		}
	}

	/// Copy of the record without the audio payload
	#[must_use]
	pub fn snapshot(&self) -> Self {
		Self {
			id: self.id,
			status: self.status,
			progress: self.progress,
			file_name: self.file_name.clone(),
			options: self.options.clone(),
			audio_bytes: self.audio_bytes,
			created_at: self.created_at,
			started_at: self.started_at,
			completed_at: self.completed_at,
			result: self.result.clone(),
			error_message: self.error_message.clone(),
			queue_position: self.queue_position,
			audio: None,
		}
	}

	#[must_use]
	pub const fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Human readable one-line status
	#[must_use]
	pub fn status_message(&self) -> String {
		match self.status {
			TaskStatus::Queued => match self.queue_position {
				Some(position) => format!("queued at position {position}"),
				None => "queued".to_string(),
			},
			TaskStatus::Processing => format!("processing ({:.1}%)", self.progress * 100.0),
			TaskStatus::Completed => "completed".to_string(),
			TaskStatus::Failed => format!("failed: {}", self.error_message.as_deref().unwrap_or("unknown error")),
			TaskStatus::Cancelled => "cancelled".to_string(),
		}
	}

	/// `Queued -> Processing`. Hands the payload over to the worker and
	/// releases it from the record.
	pub(crate) fn begin_processing(&mut self, now: DateTime<Utc>) -> Option<Arc<[u8]>> {
		if self.status != TaskStatus::Queued {
			return None;
		}
		let audio = self.audio.take()?;
		self.status = TaskStatus::Processing;
		self.started_at = Some(now);
		self.progress = 0.0;
		self.queue_position = None;
		Some(audio)
	}

	/// Raise progress while processing. Values are clamped to [0, 1] and never
	/// move backwards; NaN is ignored.
	pub(crate) fn advance_progress(&mut self, progress: f32) -> bool {
		if self.status != TaskStatus::Processing || progress.is_nan() {
			return false;
		}
		self.progress = self.progress.max(progress.clamp(0.0, 1.0));
		true
	}

	pub(crate) fn complete(&mut self, result: TranscriptionResult, now: DateTime<Utc>) -> bool {
		if self.status != TaskStatus::Processing {
			return false;
		}
		self.status = TaskStatus::Completed;
		self.progress = 1.0;
		self.result = Some(result);
		self.completed_at = Some(now);
		true
	}

	pub(crate) fn fail(&mut self, message: String, now: DateTime<Utc>) -> bool {
		if self.status != TaskStatus::Processing {
			return false;
		}
		self.status = TaskStatus::Failed;
		self.error_message = Some(message);
		self.completed_at = Some(now);
		true
	}

	/// `Queued | Processing -> Cancelled`. Returns the status it left.
	pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Option<TaskStatus> {
		let previous = self.status;
		if previous.is_terminal() {
			return None;
		}
		self.status = TaskStatus::Cancelled;
		self.completed_at = Some(now);
		self.queue_position = None;
		self.audio = None;
		Some(previous)
	}
}
