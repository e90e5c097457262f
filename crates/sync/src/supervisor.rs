//! Connection lifetime state machine.
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected -> ...`
//!
//! The supervisor decides *when* things happen (reconnect, heartbeat, idle
//! detection); the channel actor performs the I/O. Entering `Connected` resets
//! the backoff and arms the heartbeat. Leaving it (transport error or graceful
//! close) disarms the heartbeat and schedules a reconnect after the current
//! backoff, which then grows for the next failure.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::backoff::Backoff;
use crate::config::SyncConfig;

/// Lifecycle state of one resource channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
	/// No link; a reconnect may be scheduled.
	#[default]
	Disconnected,
	/// A connect attempt is in progress.
	Connecting,
	/// The link is up.
	Connected,
}

impl std::fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
		})
	}
}

/// Connection supervisor for one channel.
#[derive(Debug, Clone)]
pub struct Supervisor {
	state: ConnectionState,
	backoff: Backoff,
	heartbeat: Duration,
	idle_timeout: Option<Duration>,
	reconnect_at: Option<Instant>,
	next_heartbeat: Option<Instant>,
	last_inbound: Option<Instant>,
	failures: u32,
}

impl Supervisor {
	/// Creates a disconnected supervisor whose first attempt is due immediately.
	pub fn new(config: &SyncConfig, now: Instant) -> Self {
		Self {
			state: ConnectionState::Disconnected,
			backoff: config.backoff(),
			heartbeat: config.heartbeat_interval(),
			idle_timeout: config.idle_timeout(),
			reconnect_at: Some(now),
			next_heartbeat: None,
			last_inbound: None,
			failures: 0,
		}
	}

	/// Current state.
	pub fn state(&self) -> ConnectionState {
		self.state
	}

	/// Consecutive failed attempts since the last successful connection.
	pub fn failures(&self) -> u32 {
		self.failures
	}

	/// Delay the next scheduled reconnect would use.
	pub fn backoff(&self) -> &Backoff {
		&self.backoff
	}

	/// When the next connect attempt is due, if one is scheduled.
	pub fn reconnect_at(&self) -> Option<Instant> {
		self.reconnect_at
	}

	/// `Disconnected -> Connecting`.
	pub fn begin_connect(&mut self) -> bool {
		if self.state != ConnectionState::Disconnected {
			warn!(state = %self.state, "sync.supervisor.connect_while_not_disconnected");
			return false;
		}
		self.state = ConnectionState::Connecting;
		self.reconnect_at = None;
		true
	}

	/// `Connecting -> Connected`: reset backoff and arm the heartbeat.
	pub fn on_connected(&mut self, now: Instant) {
		self.state = ConnectionState::Connected;
		self.backoff.reset();
		self.failures = 0;
		self.reconnect_at = None;
		self.next_heartbeat = Some(now + self.heartbeat);
		self.last_inbound = Some(now);
	}

	/// Any state `-> Disconnected`: disarm the heartbeat and schedule a reconnect.
	///
	/// Returns the delay before the next attempt.
	pub fn on_disconnected(&mut self, now: Instant) -> Duration {
		if self.state == ConnectionState::Connecting {
			self.failures = self.failures.saturating_add(1);
		}
		self.state = ConnectionState::Disconnected;
		self.next_heartbeat = None;
		self.last_inbound = None;
		let delay = self.backoff.next_delay();
		self.reconnect_at = Some(now + delay);
		delay
	}

	/// Stops all scheduling; the channel is being torn down.
	pub fn shutdown(&mut self) {
		self.state = ConnectionState::Disconnected;
		self.reconnect_at = None;
		self.next_heartbeat = None;
		self.last_inbound = None;
	}

	/// Records inbound traffic for idle detection.
	pub fn on_inbound(&mut self, now: Instant) {
		if self.state == ConnectionState::Connected {
			self.last_inbound = Some(now);
		}
	}

	/// When the next heartbeat is due, if connected.
	pub fn next_heartbeat(&self) -> Option<Instant> {
		self.next_heartbeat
	}

	/// Records a sent heartbeat and arms the next one.
	pub fn heartbeat_sent(&mut self, now: Instant) {
		if self.state == ConnectionState::Connected {
			self.next_heartbeat = Some(now + self.heartbeat);
		}
	}

	/// Instant after which a silent link counts as dead.
	pub fn idle_deadline(&self) -> Option<Instant> {
		Some(self.last_inbound? + self.idle_timeout?)
	}

	/// Whether the link has been silent past its idle timeout.
	pub fn is_idle(&self, now: Instant) -> bool {
		self.idle_deadline().is_some_and(|deadline| now >= deadline)
	}
}
