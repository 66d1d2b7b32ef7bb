use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of monotonic time for turn budgeting.
pub trait Clock: std::fmt::Debug {
	/// Returns the current instant.
	fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Hand-driven clock for deterministic tests and simulations.
///
/// Clones share the same offset, so a test can keep one handle and advance
/// time while the scheduler reads another.
#[derive(Debug, Clone)]
pub struct ManualClock {
	origin: Instant,
	offset: Rc<Cell<Duration>>,
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl ManualClock {
	/// Creates a clock frozen at construction time.
	pub fn new() -> Self {
		Self {
			origin: Instant::now(),
			offset: Rc::new(Cell::new(Duration::ZERO)),
		}
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: Duration) {
		self.offset.set(self.offset.get() + by);
	}

	/// Total time advanced so far.
	pub fn elapsed(&self) -> Duration {
		self.offset.get()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.origin + self.offset.get()
	}
}
