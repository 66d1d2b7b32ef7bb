//! Cooperative time-budget policy for runs of standalone operations.
//!
//! [`TimeBudget::decide`] is a pure function of elapsed time. [`TurnTimer`]
//! holds the only state, the instant the current turn opened. Suspending is
//! left to the caller; see [`crate::DocumentSession::process`].

use std::time::{Duration, Instant};

/// Default processing time a turn may spend on standalone operations.
pub const DEFAULT_PROCESSING_BUDGET: Duration = Duration::from_millis(20);

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
	/// Keep processing on the current turn.
	Continue,
	/// End the turn and give the host a chance to run other work.
	Yield,
}

/// Fixed processing-time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
	budget: Duration,
}

impl Default for TimeBudget {
	fn default() -> Self {
		Self::new(DEFAULT_PROCESSING_BUDGET)
	}
}

impl TimeBudget {
	/// Creates a budget of `budget` per turn.
	pub const fn new(budget: Duration) -> Self {
		Self { budget }
	}

	/// Returns the budget.
	pub const fn budget(&self) -> Duration {
		self.budget
	}

	/// Continue while `elapsed` is below the budget, yield once it is reached.
	pub fn decide(&self, elapsed: Duration) -> TurnDecision {
		if elapsed < self.budget {
			TurnDecision::Continue
		} else {
			TurnDecision::Yield
		}
	}
}

/// Start timestamp of the currently open turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnTimer {
	opened_at: Option<Instant>,
}

impl TurnTimer {
	/// Records the opening of a new turn, replacing any previous timestamp.
	pub fn open(&mut self, now: Instant) {
		self.opened_at = Some(now);
	}

	/// Forgets the current turn.
	pub fn close(&mut self) {
		self.opened_at = None;
	}

	/// Time since the turn opened; zero when no turn is open.
	pub fn elapsed(&self, now: Instant) -> Duration {
		self.opened_at.map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
	}

	/// Returns true while a turn is open.
	pub const fn is_open(&self) -> bool {
		self.opened_at.is_some()
	}
}
