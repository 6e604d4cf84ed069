use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{QueueError, Result};

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct QueueConfig {
	#[arg(long, env = "SUBSCRIBER_BUFFER", default_value = "256", help = "Pending events buffered per progress subscriber")]
	pub subscriber_buffer: usize,

	#[arg(long, env = "EVENT_CAPACITY", default_value = "256", help = "Capacity of the broadcast channel for async event consumers")]
	pub event_capacity: usize,

	#[arg(
        long = "heartbeat-interval-secs",
        env = "HEARTBEAT_INTERVAL_SECS",
        default_value = "30",
        value_parser = parse_duration,
        help = "Idle worker heartbeat interval in seconds"
    )]
	pub heartbeat_interval: Duration,

	#[arg(long, env = "WORKER_THREAD_NAME", default_value = "transcription-worker", help = "Name of the worker thread")]
	pub worker_thread_name: String,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			subscriber_buffer: 256,
			event_capacity: 256,
			heartbeat_interval: Duration::from_secs(30),
			worker_thread_name: "transcription-worker".to_string(),
		}
	}
}

impl QueueConfig {
	pub fn validate(&self) -> Result<()> {
		if self.subscriber_buffer == 0 {
			return Err(QueueError::InvalidConfig("subscriber_buffer must be greater than 0".to_string()));
		}

		if self.event_capacity == 0 {
			return Err(QueueError::InvalidConfig("event_capacity must be greater than 0".to_string()));
		}

		if self.heartbeat_interval.is_zero() {
			return Err(QueueError::InvalidConfig("heartbeat_interval must be greater than 0".to_string()));
		}

		if self.worker_thread_name.trim().is_empty() {
			return Err(QueueError::InvalidConfig("worker_thread_name must not be empty".to_string()));
		}

		Ok(())
	}

	#[cfg(test)]
	pub fn test() -> Self {
		Self {
			subscriber_buffer: 64,
			event_capacity: 64,
			heartbeat_interval: Duration::from_millis(50),
			worker_thread_name: "transcription-worker-test".to_string(),
		}
	}
}

fn parse_duration(s: &str) -> std::result::Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = QueueConfig::default();
		assert_eq!(config.subscriber_buffer, 256);
		assert_eq!(config.event_capacity, 256);
		assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
		assert_eq!(config.worker_thread_name, "transcription-worker");
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_duration() {
		assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
		assert!(parse_duration("invalid").is_err());
	}

	#[test]
	fn test_config_parser() {
		let args = vec![
			"program",
			"--subscriber-buffer",
			"8",
			"--event-capacity",
			"32",
			"--heartbeat-interval-secs",
			"5",
			"--worker-thread-name",
			"whisper",
		];

		let config = QueueConfig::try_parse_from(args).unwrap();
		assert_eq!(config.subscriber_buffer, 8);
		assert_eq!(config.event_capacity, 32);
		assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
		assert_eq!(config.worker_thread_name, "whisper");
	}

	#[test]
	fn test_validate_rejects_zero_values() {
		let mut config = QueueConfig::test();
		config.subscriber_buffer = 0;
		assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));

		let mut config = QueueConfig::test();
		config.heartbeat_interval = Duration::ZERO;
		assert!(config.validate().is_err());

		let mut config = QueueConfig::test();
		config.worker_thread_name = "  ".to_string();
		assert!(config.validate().is_err());
	}
}
