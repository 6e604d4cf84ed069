mod config;
mod observability;

use anyhow::{bail, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use transcription_queue::{Scheduler, TaskId, TaskRecord, TaskStatus, TranscriptionResult, WavDecoder, WhisperTranscriber};

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
	// Load environment variables
	dotenvy::dotenv().ok();

	let config = Config::parse();
	config.validate().map_err(anyhow::Error::msg)?;

	observability::init_tracing();

	info!(
		whisper_model = %config.whisper_model_path,
		files = config.files.len(),
		output_dir = %config.output_dir.display(),
		"Starting queue transcriber"
	);

	let engine = WhisperTranscriber::load(&config.whisper_model_path, config.whisper_threads, config.language.clone())?;
	let scheduler = Scheduler::new(config.queue.clone(), WavDecoder::new(config.target_sample_rate), engine)?;
	tokio::fs::create_dir_all(&config.output_dir).await?;

	scheduler.subscribe(|record: &TaskRecord| {
		if record.status == TaskStatus::Processing {
			debug!(task_id = %record.id, file_name = %record.file_name, progress = record.progress, "Transcription progress");
		}
	})?;

	// Subscribe before enqueueing so no terminal event is missed
	let mut events = scheduler.events();
	let mut pending = enqueue_files(&scheduler, &config.files).await?;
	scheduler.start()?;

	let outcome = tokio::select! {
		result = drain(&scheduler, &mut events, &mut pending, &config) => result,
		shutdown = wait_for_shutdown_signal() => {
			shutdown?;
			info!("Shutdown signal received (SIGTERM/SIGINT)");
			cancel_outstanding(&scheduler);
			Ok(())
		}
	};

	// `stop` joins the worker thread, keep it off the async runtime
	let stopper = scheduler.clone();
	tokio::task::spawn_blocking(move || stopper.stop()).await?;

	let stats = scheduler.stats();
	info!(completed = stats.completed, failed = stats.failed, cancelled = stats.cancelled, "Queue transcriber finished");
	outcome
}

async fn enqueue_files(scheduler: &Scheduler, files: &[PathBuf]) -> Result<HashMap<TaskId, String>> {
	let mut pending = HashMap::with_capacity(files.len());

	for path in files {
		let audio = match tokio::fs::read(path).await {
			Ok(audio) => audio,
			Err(e) => {
				warn!(path = %path.display(), error = %e, "Skipping unreadable audio file");
				continue;
			}
		};

		let file_name = path.file_name().map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
		match scheduler.enqueue_task(audio, &file_name) {
			Ok(id) => {
				pending.insert(id, output_stem(path));
			}
			Err(e) => warn!(path = %path.display(), error = %e, "Rejected audio file"),
		}
	}

	if pending.is_empty() {
		bail!("no audio files could be queued");
	}
	Ok(pending)
}

/// Wait for every queued file to reach a terminal state, writing transcripts as they complete
async fn drain(scheduler: &Scheduler, events: &mut broadcast::Receiver<TaskRecord>, pending: &mut HashMap<TaskId, String>, config: &Config) -> Result<()> {
	while !pending.is_empty() {
		match events.recv().await {
			Ok(record) if record.status.is_terminal() => handle_terminal(record, pending, config).await?,
			Ok(_) => {}
			Err(RecvError::Lagged(skipped)) => {
				warn!(skipped, "Event stream lagged, reconciling from the task store");
				let ids: Vec<TaskId> = pending.keys().copied().collect();
				for record in ids.iter().filter_map(|id| scheduler.get_task(id)).filter(TaskRecord::is_terminal) {
					handle_terminal(record, pending, config).await?;
				}
			}
			Err(RecvError::Closed) => bail!("scheduler event stream closed with {} tasks outstanding", pending.len()),
		}
	}
	Ok(())
}

async fn handle_terminal(record: TaskRecord, pending: &mut HashMap<TaskId, String>, config: &Config) -> Result<()> {
	let Some(stem) = pending.remove(&record.id) else {
		return Ok(());
	};

	match (&record.status, &record.result) {
		(TaskStatus::Completed, Some(result)) => {
			let path = write_transcript(&config.output_dir, &stem, result, config.srt).await?;
			info!(
				task_id = %record.id,
				file_name = %record.file_name,
				audio_duration_secs = result.audio_duration_secs,
				processing_time_secs = result.processing_time_secs,
				output = %path.display(),
				"Transcript written"
			);
		}
		_ => warn!(task_id = %record.id, file_name = %record.file_name, status = %record.status_message(), "Task did not complete"),
	}
	Ok(())
}

async fn write_transcript(output_dir: &Path, stem: &str, result: &TranscriptionResult, srt: bool) -> Result<PathBuf> {
	let text_path = output_dir.join(format!("{stem}.txt"));
	tokio::fs::write(&text_path, format!("{}\n", result.text)).await?;

	if srt {
		tokio::fs::write(output_dir.join(format!("{stem}.srt")), result.to_srt()).await?;
	}
	Ok(text_path)
}

fn output_stem(path: &Path) -> String {
	path.file_stem().map_or_else(|| "transcript".to_string(), |stem| stem.to_string_lossy().into_owned())
}

fn cancel_outstanding(scheduler: &Scheduler) {
	let outstanding = scheduler.get_all_tasks().into_iter().filter(|record| !record.is_terminal());
	for record in outstanding {
		if scheduler.cancel_task(&record.id) {
			info!(task_id = %record.id, file_name = %record.file_name, "Cancelled outstanding task");
		}
	}
}

async fn wait_for_shutdown_signal() -> Result<()> {
	#[cfg(unix)]
	{
		let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
		tokio::select! {
			result = signal::ctrl_c() => result?,
			_ = terminate.recv() => {},
		}
	}

	#[cfg(not(unix))]
	signal::ctrl_c().await?;

	Ok(())
}
