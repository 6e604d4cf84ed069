use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A span of recognized speech, timestamps relative to the start of the audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedSegment {
	pub start_ms: u64,
	pub end_ms: u64,
	pub text: String,
}

/// Raw output of a transcription engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
	pub text: String,
	pub segments: Vec<TimedSegment>,
	pub language: Option<String>,
}

impl Transcript {
	/// Build a transcript whose text is the trimmed concatenation of its segments
	#[must_use]
	pub fn from_segments(segments: Vec<TimedSegment>, language: Option<String>) -> Self {
		let text = segments.iter().map(|segment| segment.text.trim()).filter(|text| !text.is_empty()).collect::<Vec<_>>().join(" ");
		Self { text, segments, language }
	}
}

/// Result stored on a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
	pub text: String,
	pub segments: Vec<TimedSegment>,
	pub language: Option<String>,
	pub audio_duration_secs: f64,
	pub processing_time_secs: f64,
}

impl TranscriptionResult {
	pub(crate) fn new(transcript: Transcript, audio_duration_secs: f64, processing_time_secs: f64) -> Self {
		Self {
			text: transcript.text,
			segments: transcript.segments,
			language: transcript.language,
			audio_duration_secs,
			processing_time_secs,
		}
	}

	/// Render the segments as SubRip subtitles
	#[must_use]
	pub fn to_srt(&self) -> String {
		let mut srt = String::new();
		for (index, segment) in self.segments.iter().filter(|segment| !segment.text.trim().is_empty()).enumerate() {
			// Writing into a String cannot fail
			let _ = write!(
				srt,
				"{}\n{} --> {}\n{}\n\n",
				index + 1,
				srt_timestamp(segment.start_ms),
				srt_timestamp(segment.end_ms.max(segment.start_ms)),
				segment.text.trim()
			);
		}
		srt
	}
}

fn srt_timestamp(ms: u64) -> String {
	let hours = ms / 3_600_000;
	let minutes = (ms / 60_000) % 60;
	let seconds = (ms / 1_000) % 60;
	let millis = ms % 1_000;
	format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn segment(start_ms: u64, end_ms: u64, text: &str) -> TimedSegment {
		TimedSegment {
			start_ms,
			end_ms,
			text: text.to_string(),
		}
	}

	#[test]
	fn transcript_text_joins_non_empty_segments() {
		let transcript = Transcript::from_segments(vec![segment(0, 900, " Hello "), segment(900, 1000, "  "), segment(1000, 2500, "world.")], None);
		assert_eq!(transcript.text, "Hello world.");
		assert_eq!(transcript.segments.len(), 3);
	}

	#[test]
	fn srt_timestamps_cover_hours() {
		assert_eq!(srt_timestamp(0), "00:00:00,000");
		assert_eq!(srt_timestamp(61_005), "00:01:01,005");
		assert_eq!(srt_timestamp(3_723_450), "01:02:03,450");
	}

	#[test]
	fn srt_numbers_only_spoken_segments() {
		let transcript = Transcript::from_segments(vec![segment(0, 1200, "first"), segment(1200, 1300, ""), segment(1300, 2000, "second")], Some("en".into()));
		let result = TranscriptionResult::new(transcript, 2.0, 0.5);

		let expected = "1\n00:00:00,000 --> 00:00:01,200\nfirst\n\n2\n00:00:01,300 --> 00:00:02,000\nsecond\n\n";
		assert_eq!(result.to_srt(), expected);
	}

	#[test]
	fn empty_result_renders_empty_srt() {
		let result = TranscriptionResult::new(Transcript::default(), 0.0, 0.0);
		assert!(result.to_srt().is_empty());
	}
}
