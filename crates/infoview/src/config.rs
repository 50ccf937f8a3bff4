//! Infoview configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the update loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoviewConfig {
	/// Throttle window while the server is idle, in milliseconds.
	#[serde(default = "default_idle_throttle_ms")]
	pub idle_throttle_ms: u64,
	/// Throttle window while the server reports background work, in
	/// milliseconds. Larger than idle to keep from piling requests onto a
	/// busy server.
	#[serde(default = "default_busy_throttle_ms")]
	pub busy_throttle_ms: u64,
	/// Per-request timeout in seconds.
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
}

fn default_idle_throttle_ms() -> u64 {
	50
}

fn default_busy_throttle_ms() -> u64 {
	250
}

fn default_request_timeout_secs() -> u64 {
	30
}

impl Default for InfoviewConfig {
	fn default() -> Self {
		Self {
			idle_throttle_ms: default_idle_throttle_ms(),
			busy_throttle_ms: default_busy_throttle_ms(),
			request_timeout_secs: default_request_timeout_secs(),
		}
	}
}

impl InfoviewConfig {
	/// Throttle window while idle.
	pub fn idle_throttle(&self) -> Duration {
		Duration::from_millis(self.idle_throttle_ms)
	}

	/// Throttle window while the server is busy.
	pub fn busy_throttle(&self) -> Duration {
		Duration::from_millis(self.busy_throttle_ms)
	}

	/// Per-request timeout.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_fill_missing_fields() {
		let config: InfoviewConfig = serde_json::from_str("{}").unwrap();
		assert_eq!(config.idle_throttle_ms, 50);
		assert_eq!(config.busy_throttle_ms, 250);
		assert_eq!(config.request_timeout_secs, 30);
	}

	#[test]
	fn test_partial_override() {
		let config: InfoviewConfig =
			serde_json::from_str(r#"{ "busy_throttle_ms": 500 }"#).unwrap();
		assert_eq!(config.busy_throttle_ms, 500);
		assert_eq!(config.idle_throttle_ms, 50);
	}
}
