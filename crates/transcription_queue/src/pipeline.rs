//! Seams to the external decode and transcription collaborators.
//!
//! Both traits are implemented for plain closures/functions of the matching
//! shape, so tests and small hosts can plug in a pipeline without wrapper types.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{DecodeError, TranscribeError};
use crate::task::TaskOptions;
use crate::transcript::Transcript;

/// Normalized PCM produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
	/// Mono samples in [-1, 1]
	pub samples: Vec<f32>,
	pub sample_rate: u32,
}

impl DecodedAudio {
	#[must_use]
	pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
		Self { samples, sample_rate }
	}

	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn duration_secs(&self) -> f64 {
		if self.sample_rate == 0 {
			return 0.0;
		}
		self.samples.len() as f64 / f64::from(self.sample_rate)
	}
}

pub trait AudioDecoder: Send + Sync {
	fn decode(&self, audio: &[u8]) -> Result<DecodedAudio, DecodeError>;
}

impl<F> AudioDecoder for F
where
	F: Fn(&[u8]) -> Result<DecodedAudio, DecodeError> + Send + Sync,
{
	fn decode(&self, audio: &[u8]) -> Result<DecodedAudio, DecodeError> {
		self(audio)
	}
}

/// A transcription engine.
///
/// Implementations must poll `cancel` and return [`TranscribeError::Cancelled`]
/// within a bounded time once it fires. `progress` may be called any number of
/// times with a fraction in [0, 1].
pub trait SpeechTranscriber: Send + Sync {
	fn transcribe(&self, audio: &DecodedAudio, options: &TaskOptions, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<Transcript, TranscribeError>;
}

impl<F> SpeechTranscriber for F
where
	F: Fn(&DecodedAudio, &TaskOptions, &CancellationToken, &ProgressReporter) -> Result<Transcript, TranscribeError> + Send + Sync,
{
	fn transcribe(&self, audio: &DecodedAudio, options: &TaskOptions, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<Transcript, TranscribeError> {
		self(audio, options, cancel, progress)
	}
}

/// Cloneable progress sink handed to the engine. `'static` so engines can move
/// it into FFI callbacks.
#[derive(Clone)]
pub struct ProgressReporter {
	sink: Arc<dyn Fn(f32) + Send + Sync>,
}

impl ProgressReporter {
	pub fn new<F>(sink: F) -> Self
	where
		F: Fn(f32) + Send + Sync + 'static,
	{
		Self { sink: Arc::new(sink) }
	}

	pub fn report(&self, fraction: f32) {
		(self.sink)(fraction);
	}
}

impl fmt::Debug for ProgressReporter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProgressReporter").finish_non_exhaustive()
	}
}
