//! Bounded exponential reconnect delay.

use std::time::Duration;

/// Reconnect delay that grows geometrically on failure and resets on success.
///
/// Invariant: `floor <= current() <= ceiling` at all times.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
	floor: Duration,
	factor: f64,
	ceiling: Duration,
	current: Duration,
}

impl Backoff {
	/// Creates a backoff starting at `floor`.
	///
	/// `ceiling` is raised to `floor` if smaller; factors below 1 (or NaN) are treated as 1.
	pub fn new(floor: Duration, factor: f64, ceiling: Duration) -> Self {
		let ceiling = ceiling.max(floor);
		let factor = if factor.is_nan() { 1.0 } else { factor.max(1.0) };
		Self {
			floor,
			factor,
			ceiling,
			current: floor,
		}
	}

	/// Delay the next reconnect would wait.
	pub fn current(&self) -> Duration {
		self.current
	}

	/// Returns the delay for the attempt being scheduled and grows it for the next one.
	pub fn next_delay(&mut self) -> Duration {
		let delay = self.current;
		let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.factor).unwrap_or(self.ceiling);
		self.current = grown.clamp(self.floor, self.ceiling);
		delay
	}

	/// Drops back to the floor after a successful connection.
	pub fn reset(&mut self) {
		self.current = self.floor;
	}

	/// Lower bound.
	pub fn floor(&self) -> Duration {
		self.floor
	}

	/// Upper bound.
	pub fn ceiling(&self) -> Duration {
		self.ceiling
	}
}
