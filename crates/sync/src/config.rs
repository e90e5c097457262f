//! Tunables for channels, reconnect, busy-timeouts and persistence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::{Error, Result};

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(20);

/// Default busy-timeout for listings over push transports.
pub const DEFAULT_PUSH_LIST_TIMEOUT: Duration = Duration::from_millis(4000);

/// Engine configuration.
///
/// All durations are milliseconds so the struct maps one-to-one onto a TOML
/// table. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Interval between `ping` frames while connected.
	pub heartbeat_interval_ms: u64,
	/// A link silent for this many heartbeat intervals is treated as dead. `0` disables.
	pub idle_timeout_heartbeats: u32,
	/// Reconnect delay after a successful connection.
	pub backoff_floor_ms: u64,
	/// Multiplier applied to the reconnect delay after each failed attempt.
	pub backoff_factor: f64,
	/// Upper bound of the reconnect delay.
	pub backoff_ceiling_ms: u64,
	/// Pending requests older than this resolve with a timeout. `0` disables.
	pub request_timeout_ms: u64,
	/// Busy-timeout for listings over push transports.
	pub push_list_timeout_ms: u64,
	/// Extra grace added to twice the beacon interval for polled transports.
	pub polled_grace_ms: u64,
	/// Consecutive busy-timeouts after which a navigation is abandoned.
	pub max_consecutive_timeouts: u32,
	/// Requests queued while disconnected beyond this count are rejected.
	pub outbox_limit: usize,
	/// Quiet period before view preferences are written to disk.
	pub persist_debounce_ms: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			heartbeat_interval_ms: DEFAULT_HEARTBEAT.as_millis() as u64,
			idle_timeout_heartbeats: 3,
			backoff_floor_ms: 1000,
			backoff_factor: 1.7,
			backoff_ceiling_ms: 10_000,
			request_timeout_ms: 30_000,
			push_list_timeout_ms: DEFAULT_PUSH_LIST_TIMEOUT.as_millis() as u64,
			polled_grace_ms: 2000,
			max_consecutive_timeouts: 5,
			outbox_limit: 256,
			persist_debounce_ms: 500,
		}
	}
}

impl SyncConfig {
	/// Rejects settings that would stall or spin the engine.
	pub fn validate(&self) -> Result<()> {
		let fail = |msg: &str| Err(Error::Config(msg.to_owned()));
		if self.heartbeat_interval_ms == 0 {
			return fail("heartbeat_interval_ms must be positive");
		}
		if self.backoff_floor_ms == 0 {
			return fail("backoff_floor_ms must be positive");
		}
		if !(self.backoff_factor.is_finite() && self.backoff_factor >= 1.0) {
			return fail("backoff_factor must be a finite number >= 1");
		}
		if self.backoff_floor_ms > self.backoff_ceiling_ms {
			return fail("backoff_floor_ms must not exceed backoff_ceiling_ms");
		}
		if self.push_list_timeout_ms == 0 {
			return fail("push_list_timeout_ms must be positive");
		}
		if self.max_consecutive_timeouts == 0 {
			return fail("max_consecutive_timeouts must be positive");
		}
		Ok(())
	}

	/// Heartbeat interval.
	pub fn heartbeat_interval(&self) -> Duration {
		Duration::from_millis(self.heartbeat_interval_ms)
	}

	/// Silence after which a link is considered dead, if enabled.
	pub fn idle_timeout(&self) -> Option<Duration> {
		(self.idle_timeout_heartbeats > 0).then(|| self.heartbeat_interval() * self.idle_timeout_heartbeats)
	}

	/// Fresh reconnect backoff at its floor.
	pub fn backoff(&self) -> Backoff {
		Backoff::new(
			Duration::from_millis(self.backoff_floor_ms),
			self.backoff_factor,
			Duration::from_millis(self.backoff_ceiling_ms),
		)
	}

	/// Maximum age of a pending request, if enabled.
	pub fn request_timeout(&self) -> Option<Duration> {
		(self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
	}

	/// Busy-timeout for one listing request.
	///
	/// Polled transports only deliver on check-in, so the guard spans two beacon
	/// intervals plus a grace period.
	pub fn list_timeout(&self, beacon_interval: Option<Duration>) -> Duration {
		match beacon_interval {
			Some(beacon) => beacon * 2 + Duration::from_millis(self.polled_grace_ms),
			None => Duration::from_millis(self.push_list_timeout_ms),
		}
	}

	/// Debounce before persisting view preferences.
	pub fn persist_debounce(&self) -> Duration {
		Duration::from_millis(self.persist_debounce_ms)
	}
}
