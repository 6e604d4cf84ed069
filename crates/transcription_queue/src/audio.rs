use std::io::Cursor;
use tracing::debug;

use crate::error::DecodeError;
use crate::pipeline::{AudioDecoder, DecodedAudio};

/// Sample rate Whisper expects
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Container format guessed from the leading bytes of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
	Wav,
	Mp3,
	Aac,
}

impl AudioFormat {
	#[must_use]
	pub fn detect(bytes: &[u8]) -> Option<Self> {
		if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
			return Some(Self::Wav);
		}
		if bytes.len() >= 2 && (bytes[0] == 0xFF && (bytes[1] == 0xFB || bytes[1] == 0xF3) || bytes.starts_with(b"ID3")) {
			return Some(Self::Mp3);
		}
		if bytes.len() >= 8 && (bytes[0] == 0xFF && (bytes[1] == 0xF1 || bytes[1] == 0xF9) || &bytes[4..8] == b"ftyp") {
			return Some(Self::Aac);
		}
		None
	}
}

/// Decodes WAV payloads into mono PCM at a fixed target rate.
///
/// Other recognized containers are rejected with
/// [`DecodeError::UnsupportedFormat`].
#[derive(Debug, Clone, Copy)]
pub struct WavDecoder {
	target_sample_rate: u32,
}

impl Default for WavDecoder {
	fn default() -> Self {
		Self::new(WHISPER_SAMPLE_RATE)
	}
}

impl WavDecoder {
	#[must_use]
	pub const fn new(target_sample_rate: u32) -> Self {
		Self { target_sample_rate }
	}
}

impl AudioDecoder for WavDecoder {
	#[allow(clippy::cast_precision_loss)]
	fn decode(&self, audio: &[u8]) -> Result<DecodedAudio, DecodeError> {
		if AudioFormat::detect(audio) != Some(AudioFormat::Wav) {
			return Err(DecodeError::UnsupportedFormat);
		}

		let mut reader = hound::WavReader::new(Cursor::new(audio))?;
		let spec = reader.spec();
		let interleaved: Vec<f32> = match spec.sample_format {
			hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
			hound::SampleFormat::Int => {
				let scale = int_scale(spec.bits_per_sample)?;
				reader.samples::<i32>().map(|sample| sample.map(|value| value as f32 / scale)).collect::<Result<_, _>>()?
			}
		};

		let mono = downmix(&interleaved, spec.channels);
		if mono.is_empty() {
			return Err(DecodeError::Empty);
		}

		let samples = resample_linear(&mono, spec.sample_rate, self.target_sample_rate);
		debug!(
			source_rate = spec.sample_rate,
			channels = spec.channels,
			bits = spec.bits_per_sample,
			samples = samples.len(),
			"Decoded WAV payload"
		);
		Ok(DecodedAudio::new(samples, self.target_sample_rate))
	}
}

#[allow(clippy::cast_precision_loss)]
fn int_scale(bits_per_sample: u16) -> Result<f32, DecodeError> {
	match bits_per_sample {
		1..=32 => Ok((1_u64 << (bits_per_sample - 1)) as f32),
		other => Err(DecodeError::Malformed(format!("unsupported bit depth {other}"))),
	}
}

fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
	if channels <= 1 {
		return interleaved.to_vec();
	}
	let divisor = f32::from(channels);
	interleaved.chunks_exact(usize::from(channels)).map(|frame| frame.iter().sum::<f32>() / divisor).collect()
}

/// Linear interpolation resampler; quality is sufficient for speech models
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
	if from_rate == to_rate || from_rate == 0 || samples.is_empty() {
		return samples.to_vec();
	}

	let ratio = f64::from(from_rate) / f64::from(to_rate);
	let output_len = (samples.len() as f64 / ratio) as usize;

	(0..output_len)
		.map(|i| {
			let position = i as f64 * ratio;
			let index = position as usize;
			let fraction = (position - index as f64) as f32;
			let current = samples.get(index).copied().unwrap_or(0.0);
			let next = samples.get(index + 1).copied().unwrap_or(current);
			current + (next - current) * fraction
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn wav_bytes(sample_rate: u32, channels: u16, frames: &[i16]) -> Vec<u8> {
		let spec = hound::WavSpec {
			channels,
			sample_rate,
			bits_per_sample: 16,
			sample_format: hound::SampleFormat::Int,
		};
		let mut cursor = Cursor::new(Vec::new());
		{
			let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
			for &sample in frames {
				writer.write_sample(sample).unwrap();
			}
			writer.finalize().unwrap();
		}
		cursor.into_inner()
	}

	#[test]
	fn detects_known_containers() {
		let wav = wav_bytes(16_000, 1, &[0; 16]);
		assert_eq!(AudioFormat::detect(&wav), Some(AudioFormat::Wav));
		assert_eq!(AudioFormat::detect(&[0xFF, 0xFB, 0x90, 0x00]), Some(AudioFormat::Mp3));
		assert_eq!(AudioFormat::detect(b"ID3\x04\x00"), Some(AudioFormat::Mp3));
		assert_eq!(AudioFormat::detect(&[0xFF, 0xF1, 0x50, 0x80, 0, 0, 0, 0, 0]), Some(AudioFormat::Aac));
		assert_eq!(AudioFormat::detect(b"\0\0\0\x20ftypM4A "), Some(AudioFormat::Aac));
		assert_eq!(AudioFormat::detect(&[1, 2, 3]), None);
	}

	#[test]
	fn detects_headers_of_exact_minimum_length() {
		assert_eq!(AudioFormat::detect(b"RIFF\0\0\0\0WAVE"), Some(AudioFormat::Wav));
		assert_eq!(AudioFormat::detect(b"\0\0\0\x08ftyp"), Some(AudioFormat::Aac));
		assert_eq!(AudioFormat::detect(&[0xFF, 0xF3]), Some(AudioFormat::Mp3));
		assert_eq!(AudioFormat::detect(b"RIFF\0\0\0\0WAV"), None);
	}

	#[test]
	fn decodes_mono_wav_at_target_rate() {
		let frames: Vec<i16> = (0..1600).map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN }).collect();
		let decoded = WavDecoder::default().decode(&wav_bytes(16_000, 1, &frames)).unwrap();

		assert_eq!(decoded.sample_rate, WHISPER_SAMPLE_RATE);
		assert_eq!(decoded.samples.len(), 1600);
		assert!(decoded.samples.iter().all(|sample| (-1.0..=1.0).contains(sample)));
		assert!((decoded.duration_secs() - 0.1).abs() < 1e-9);
	}

	#[test]
	fn downmixes_and_resamples_stereo() {
		// 0.5 s of stereo at 32 kHz, left and right cancel out
		let frames: Vec<i16> = (0..16_000).flat_map(|_| [1000_i16, -1000_i16]).collect();
		let decoded = WavDecoder::default().decode(&wav_bytes(32_000, 2, &frames)).unwrap();

		assert_eq!(decoded.samples.len(), 8_000);
		assert!(decoded.samples.iter().all(|sample| sample.abs() < 1e-6));
	}

	#[test]
	fn rejects_non_wav_payloads() {
		let decoder = WavDecoder::default();
		assert_eq!(decoder.decode(&[0xFF, 0xFB, 0x90, 0x00]), Err(DecodeError::UnsupportedFormat));
		assert_eq!(decoder.decode(&[0x01, 0x02, 0x03]), Err(DecodeError::UnsupportedFormat));
	}

	#[test]
	fn empty_wav_is_an_error() {
		assert_eq!(WavDecoder::default().decode(&wav_bytes(16_000, 1, &[])), Err(DecodeError::Empty));
	}

	#[test]
	fn truncated_wav_is_malformed() {
		let mut bytes = wav_bytes(16_000, 1, &[5; 64]);
		bytes.truncate(20);
		assert!(matches!(WavDecoder::default().decode(&bytes), Err(DecodeError::Malformed(_)) | Err(DecodeError::UnsupportedFormat)));
	}

	#[test]
	fn resample_halves_length_when_rate_halves() {
		let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
		let resampled = resample_linear(&samples, 32_000, 16_000);
		assert_eq!(resampled.len(), 50);
		assert!((resampled[10] - 20.0).abs() < f32::EPSILON);
	}
}
