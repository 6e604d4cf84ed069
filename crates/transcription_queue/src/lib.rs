//! In-process transcription task queue.
//!
//! A [`Scheduler`] accepts audio payloads, keeps a record of every task it has
//! seen, and drains them in submission order on one dedicated worker thread.
//! Decoding and transcription are delegated to an [`AudioDecoder`] and a
//! [`SpeechTranscriber`]; progress and state changes are fanned out to
//! subscribers.

pub mod audio;
pub mod config;
pub mod error;
pub mod notifier;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
mod stats;
pub mod store;
pub mod task;
pub mod transcript;
#[cfg(feature = "whisper")]
pub mod whisper;

pub use audio::{AudioFormat, WavDecoder, WHISPER_SAMPLE_RATE};
pub use config::QueueConfig;
pub use error::{DecodeError, QueueError, TranscribeError};
pub use notifier::SubscriptionId;
pub use pipeline::{AudioDecoder, DecodedAudio, ProgressReporter, SpeechTranscriber};
pub use scheduler::Scheduler;
pub use stats::StatsSnapshot;
pub use task::{TaskId, TaskOptions, TaskRecord, TaskStatus};
pub use tokio_util::sync::CancellationToken;
pub use transcript::{TimedSegment, Transcript, TranscriptionResult};
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;
