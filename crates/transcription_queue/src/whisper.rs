use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::TranscribeError;
use crate::pipeline::{DecodedAudio, ProgressReporter, SpeechTranscriber};
use crate::task::TaskOptions;
use crate::transcript::{TimedSegment, Transcript};

/// Whisper-backed engine. One model context is shared across tasks; each call
/// creates its own decoding state.
pub struct WhisperTranscriber {
	context: WhisperContext,
	threads: i32,
	default_language: Option<String>,
}

impl WhisperTranscriber {
	/// Load a ggml model from disk
	pub fn load(model_path: &str, threads: i32, default_language: Option<String>) -> Result<Self, TranscribeError> {
		info!(model_path, threads, "Loading Whisper model");
		let start = Instant::now();

		let context = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
			.map_err(|e| TranscribeError::Failed(format!("failed to load Whisper model {model_path}: {e}")))?;

		info!(load_time_ms = start.elapsed().as_millis(), "Whisper model loaded");
		Ok(Self { context, threads, default_language })
	}
}

impl SpeechTranscriber for WhisperTranscriber {
	#[allow(clippy::cast_precision_loss)]
	fn transcribe(&self, audio: &DecodedAudio, options: &TaskOptions, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<Transcript, TranscribeError> {
		let mut state = self
			.context
			.create_state()
			.map_err(|e| TranscribeError::Failed(format!("failed to create Whisper state: {e}")))?;

		let language = options.language.clone().or_else(|| self.default_language.clone());

		let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
		params.set_n_threads(self.threads);
		params.set_translate(false);
		params.set_print_special(false);
		params.set_print_progress(false);
		params.set_print_realtime(false);
		params.set_print_timestamps(false);
		params.set_language(language.as_deref());

		let reporter = progress.clone();
		params.set_progress_callback_safe(move |percent: i32| reporter.report(percent as f32 / 100.0));
		let token = cancel.clone();
		params.set_abort_callback_safe(move || token.is_cancelled());

		let outcome = state.full(params, &audio.samples);
		if cancel.is_cancelled() {
			return Err(TranscribeError::Cancelled);
		}
		outcome.map_err(|e| TranscribeError::Failed(format!("Whisper inference failed: {e}")))?;

		let num_segments = state.full_n_segments();
		if num_segments == 0 {
			warn!("No segments extracted - audio may be silence");
		}

		let mut segments = Vec::new();
		for i in 0..num_segments {
			let Some(segment) = state.get_segment(i) else {
				continue;
			};
			let Ok(text) = segment.to_str() else {
				warn!(segment = i, "Skipping segment with invalid UTF-8");
				continue;
			};
			// Whisper timestamps are in centiseconds
			segments.push(TimedSegment {
				start_ms: u64::try_from(segment.start_timestamp()).unwrap_or(0) * 10,
				end_ms: u64::try_from(segment.end_timestamp()).unwrap_or(0) * 10,
				text: text.trim().to_string(),
			});
		}

		progress.report(1.0);
		Ok(Transcript::from_segments(segments, language))
	}
}
