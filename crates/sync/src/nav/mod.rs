//! Navigation/busy controller for one file-listing view.
//!
//! At most one `list` request is in flight per view. Navigations requested
//! while busy overwrite a single pending slot (last write wins) which is
//! drained the moment the in-flight request resolves. A busy-timeout guard
//! re-sends the in-flight target if no reply arrives, and a stale-reply guard
//! keeps a slow, superseded reply from clobbering a newer one.
//!
//! # State Machine
//!
//! ```text
//!          navigate (idle)                    reply (matches, no pending)
//!   Idle ------------------> Busy(target) ---------------------------------> Idle + commit
//!                             |  ^   |
//!      navigate (busy): pending = t  |  reply (matches, pending) -> Busy(pending)
//!                             |      |
//!                 timeout: re-send same target, until max consecutive -> Idle + give up
//! ```
//!
//! The controller is sans-IO: it decides what to send and when; the
//! [`crate::browser`] actor does the sending.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of [`NavigationController::navigate`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum NavAction {
	/// The controller was idle: send a listing request for this target now.
	Send(String),
	/// A request is in flight; the target was parked in the pending slot.
	Queued {
		/// Earlier pending target that was discarded.
		replaced: Option<String>,
	},
}

/// Result of [`NavigationController::on_reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ReplyOutcome {
	/// The reply is for the in-flight target and nothing newer is queued: commit it.
	Commit(String),
	/// The reply resolved the in-flight request, but a newer target was queued.
	/// The reply is not committed; send `next` now.
	Superseded {
		/// Target the reply echoed.
		target: String,
		/// Pending target that is now in flight.
		next: String,
	},
	/// The echoed target does not match the in-flight one, or nothing is in flight.
	Stale,
}

/// Result of [`NavigationController::on_timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum TimeoutOutcome {
	/// The guard has not fired.
	NotDue,
	/// The guard fired; re-send the same target.
	Retry {
		/// Target to re-send.
		target: String,
		/// Consecutive timeouts so far for this target.
		attempt: u32,
		/// Whether the timeout recurred and should be shown as "retrying".
		escalated: bool,
	},
	/// Too many consecutive timeouts; the navigation was abandoned.
	GaveUp {
		/// Abandoned target.
		target: String,
		/// Consecutive timeouts observed.
		attempts: u32,
	},
}

/// The request currently awaiting its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
	/// Target path of the request.
	pub target: String,
	/// When the request (or its latest retry) was sent.
	pub started_at: Instant,
	/// When the busy-timeout guard fires.
	pub deadline: Instant,
}

/// Busy state of the view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NavPhase {
	/// No request in flight.
	#[default]
	Idle,
	/// One request in flight.
	Busy(InFlight),
}

/// Per-view navigation controller.
#[derive(Debug, Clone)]
pub struct NavigationController {
	phase: NavPhase,
	pending: Option<String>,
	committed: Option<String>,
	timeout: Duration,
	consecutive_timeouts: u32,
	max_timeouts: u32,
}

impl NavigationController {
	/// Creates an idle controller.
	///
	/// `timeout` is the busy-guard duration (see
	/// [`crate::SyncConfig::list_timeout`]); `max_timeouts` consecutive
	/// timeouts abandon a navigation.
	pub fn new(timeout: Duration, max_timeouts: u32) -> Self {
		Self {
			phase: NavPhase::Idle,
			pending: None,
			committed: None,
			timeout,
			consecutive_timeouts: 0,
			max_timeouts: max_timeouts.max(1),
		}
	}

	/// Requests a listing of `target`.
	pub fn navigate(&mut self, target: impl Into<String>, now: Instant) -> NavAction {
		let target = target.into();
		match self.phase {
			NavPhase::Idle => {
				self.consecutive_timeouts = 0;
				self.start(target.clone(), now);
				NavAction::Send(target)
			}
			NavPhase::Busy(_) => {
				let replaced = self.pending.replace(target);
				if let Some(old) = &replaced {
					debug!(path = %old, "sync.nav.pending_replaced");
				}
				NavAction::Queued { replaced }
			}
		}
	}

	/// Handles a listing reply echoing `echoed`.
	pub fn on_reply(&mut self, echoed: &str, now: Instant) -> ReplyOutcome {
		self.resolve(echoed, now, true)
	}

	/// Handles a failed reply (server error, undecodable listing) for `echoed`.
	///
	/// Resolves the in-flight request like [`NavigationController::on_reply`]
	/// but leaves the committed target unchanged.
	pub fn on_error_reply(&mut self, echoed: &str, now: Instant) -> ReplyOutcome {
		self.resolve(echoed, now, false)
	}

	fn resolve(&mut self, echoed: &str, now: Instant, commit: bool) -> ReplyOutcome {
		let NavPhase::Busy(in_flight) = &self.phase else {
			debug!(path = echoed, "sync.nav.stale_reply_idle");
			return ReplyOutcome::Stale;
		};
		if in_flight.target != echoed {
			debug!(path = echoed, in_flight = %in_flight.target, "sync.nav.stale_reply");
			return ReplyOutcome::Stale;
		}

		let target = echoed.to_owned();
		self.phase = NavPhase::Idle;
		self.consecutive_timeouts = 0;
		match self.pending.take() {
			Some(next) => {
				debug!(path = %target, next = %next, "sync.nav.superseded");
				self.start(next.clone(), now);
				ReplyOutcome::Superseded { target, next }
			}
			None => {
				if commit {
					self.committed = Some(target.clone());
				}
				ReplyOutcome::Commit(target)
			}
		}
	}

	/// Fires the busy-timeout guard if it is due.
	pub fn on_timeout(&mut self, now: Instant) -> TimeoutOutcome {
		let NavPhase::Busy(in_flight) = &self.phase else {
			return TimeoutOutcome::NotDue;
		};
		if now < in_flight.deadline {
			return TimeoutOutcome::NotDue;
		}

		let target = in_flight.target.clone();
		self.phase = NavPhase::Idle;
		self.consecutive_timeouts += 1;
		let attempts = self.consecutive_timeouts;

		if attempts >= self.max_timeouts {
			warn!(path = %target, attempts, "sync.nav.gave_up");
			self.pending = None;
			self.consecutive_timeouts = 0;
			return TimeoutOutcome::GaveUp { target, attempts };
		}

		let escalated = attempts >= 2;
		if escalated {
			info!(path = %target, attempts, "sync.nav.retrying");
		} else {
			debug!(path = %target, "sync.nav.timeout_retry");
		}
		self.start(target.clone(), now);
		TimeoutOutcome::Retry {
			target,
			attempt: attempts,
			escalated,
		}
	}

	/// Re-issues the current navigation after the link came back.
	///
	/// A busy view re-sends its in-flight target with a fresh guard; an idle
	/// view re-lists the committed target. Returns the target to send.
	pub fn on_reconnect(&mut self, now: Instant) -> Option<String> {
		self.consecutive_timeouts = 0;
		let target = match &self.phase {
			NavPhase::Busy(in_flight) => in_flight.target.clone(),
			NavPhase::Idle => self.committed.clone()?,
		};
		self.start(target.clone(), now);
		Some(target)
	}

	/// Changes the busy-guard duration for subsequent requests.
	pub fn set_timeout(&mut self, timeout: Duration) {
		self.timeout = timeout;
	}

	/// Busy-guard duration.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// When the busy guard fires, if a request is in flight.
	pub fn deadline(&self) -> Option<Instant> {
		match &self.phase {
			NavPhase::Busy(in_flight) => Some(in_flight.deadline),
			NavPhase::Idle => None,
		}
	}

	/// Whether a request is in flight.
	pub fn is_busy(&self) -> bool {
		matches!(self.phase, NavPhase::Busy(_))
	}

	/// Current phase.
	pub fn phase(&self) -> &NavPhase {
		&self.phase
	}

	/// Target of the in-flight request.
	pub fn in_flight(&self) -> Option<&str> {
		match &self.phase {
			NavPhase::Busy(in_flight) => Some(&in_flight.target),
			NavPhase::Idle => None,
		}
	}

	/// Target waiting for the in-flight request to resolve.
	pub fn pending(&self) -> Option<&str> {
		self.pending.as_deref()
	}

	/// Last committed target.
	pub fn committed(&self) -> Option<&str> {
		self.committed.as_deref()
	}

	/// Consecutive timeouts of the current navigation.
	pub fn consecutive_timeouts(&self) -> u32 {
		self.consecutive_timeouts
	}

	fn start(&mut self, target: String, now: Instant) {
		self.phase = NavPhase::Busy(InFlight {
			target,
			started_at: now,
			deadline: now + self.timeout,
		});
	}
}
