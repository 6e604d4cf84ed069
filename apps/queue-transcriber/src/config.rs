use clap::Parser;
use std::path::PathBuf;
use transcription_queue::QueueConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "queue-transcriber")]
#[command(about = "Queue audio files for Whisper transcription and write the transcripts", long_about = None)]
pub struct Config {
	/// Whisper model path
	#[arg(long, env = "WHISPER_MODELS_PATH")]
	pub whisper_model_path: String,

	/// Number of threads for Whisper processing
	#[arg(long, env = "WHISPER_THREADS", default_value = "2")]
	pub whisper_threads: i32,

	/// Spoken language hint; auto-detected when omitted
	#[arg(long, env = "WHISPER_LANGUAGE")]
	pub language: Option<String>,

	/// Target sample rate for decoded audio
	#[arg(long, env = "TARGET_SAMPLE_RATE", default_value = "16000")]
	pub target_sample_rate: u32,

	/// Directory transcripts are written to
	#[arg(long, env = "TRANSCRIPT_OUTPUT_DIR", default_value = "transcripts")]
	pub output_dir: PathBuf,

	/// Also write SubRip subtitles next to each transcript
	#[arg(long, env = "WRITE_SRT")]
	pub srt: bool,

	#[command(flatten)]
	pub queue: QueueConfig,

	/// Audio files to transcribe
	#[arg(required = true)]
	pub files: Vec<PathBuf>,
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		if self.whisper_threads < 1 {
			return Err("whisper_threads must be at least 1".to_string());
		}

		if self.target_sample_rate == 0 {
			return Err("target_sample_rate must be greater than 0".to_string());
		}

		if self.language.as_deref().is_some_and(|language| language.trim().is_empty()) {
			return Err("language must not be blank".to_string());
		}

		self.queue.validate().map_err(|e| e.to_string())
	}
}
