use thiserror::Error;

use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum QueueError {
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Task id already exists: {0}")]
	DuplicateId(TaskId),
	#[error("Failed to spawn thread: {0}")]
	ThreadSpawn(#[from] std::io::Error),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Failure returned by an [`AudioDecoder`](crate::pipeline::AudioDecoder).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("unsupported audio format")]
	UnsupportedFormat,
	#[error("audio payload decoded to zero samples")]
	Empty,
	#[error("malformed audio: {0}")]
	Malformed(String),
}

/// Outcome of a transcription call that did not produce a transcript.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscribeError {
	/// The engine observed the cancellation token and stopped.
	#[error("transcription cancelled")]
	Cancelled,
	#[error("transcription failed: {0}")]
	Failed(String),
}

impl From<hound::Error> for DecodeError {
	fn from(error: hound::Error) -> Self {
		Self::Malformed(error.to_string())
	}
}

pub type Result<T> = std::result::Result<T, QueueError>;
