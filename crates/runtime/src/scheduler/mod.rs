//! Turn scheduler: batch boundaries and cooperative turn splitting.
//!
//! One call to [`TurnScheduler::run_turn`] is one turn. Within a turn:
//!
//! * An explicit batch (`batch: true` … `batch: false`) is applied start to
//!   finish with no yield point, however long it takes. It is not started
//!   until its end marker has arrived.
//! * Standalone operations are applied one at a time inside an implicit
//!   batch. Between operations the [`TimeBudget`] is consulted; once the turn
//!   has used its budget the implicit batch is closed and the turn ends with
//!   [`TurnOutcome::Yielded`].
//!
//! Every applied operation sits inside exactly one begin/end pair, and no
//! batch is open when `run_turn` returns.

use serde::{Deserialize, Serialize};
use tandem_protocol::{BatchMarker, SeqNum, SequencedOp};

use crate::budget::{TimeBudget, TurnDecision, TurnTimer};
use crate::clock::{Clock, SystemClock};
use crate::error::MalformedOperation;
use crate::events::SessionWarning;
use crate::inbound::InboundQueue;

/// Applies one sequenced operation to document state.
pub trait OpHandler {
	/// Applies `op`. An error skips the operation; the batch continues.
	fn process(&mut self, op: &SequencedOp) -> Result<(), MalformedOperation>;
}

/// Receives batch boundary notifications.
pub trait BatchObserver {
	/// A batch is about to be applied.
	fn batch_begin(&mut self, info: &BatchInfo);
	/// A batch finished applying.
	fn batch_end(&mut self, info: &BatchInfo);
	/// A recoverable fault occurred while applying.
	fn warning(&mut self, warning: SessionWarning);
}

/// Description of a batch.
///
/// At `batch_begin` only `explicit` and `first_seq` are final; `last_seq` and
/// `ops` are complete at `batch_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
	/// True for a marker-delimited batch.
	pub explicit: bool,
	/// Sequence number of the first operation.
	pub first_seq: SeqNum,
	/// Sequence number of the last operation applied so far.
	pub last_seq: SeqNum,
	/// Operations applied so far.
	pub ops: usize,
}

/// How standalone operations are grouped into implicit batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImplicitBatching {
	/// All standalone operations applied in one turn form one batch.
	#[default]
	PerTurn,
	/// Every standalone operation is its own batch, so listeners see exactly
	/// one begin/end pair per non-batched message.
	PerOperation,
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
	/// Nothing was queued.
	Idle,
	/// The queue was emptied.
	Drained,
	/// The time budget ran out with operations still queued.
	Yielded,
	/// The next operation opens an explicit batch whose end has not arrived.
	AwaitingBatchEnd,
	/// The queue is paused.
	Paused,
}

/// Counters over the scheduler's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TurnStats {
	/// Turns started with a non-empty queue.
	pub turns: u64,
	/// Turns ended by the time budget.
	pub yields: u64,
	/// Batch begin notifications.
	pub batches_begun: u64,
	/// Batch end notifications.
	pub batches_ended: u64,
	/// Operations handed to the handler.
	pub ops_applied: u64,
	/// Operations the handler rejected.
	pub ops_failed: u64,
}

/// Decides batch boundaries and turn splits.
#[derive(Debug)]
pub struct TurnScheduler {
	budget: TimeBudget,
	batching: ImplicitBatching,
	clock: Box<dyn Clock>,
	timer: TurnTimer,
	open: Option<BatchInfo>,
	stats: TurnStats,
}

impl Default for TurnScheduler {
	fn default() -> Self {
		Self::new(TimeBudget::default(), ImplicitBatching::default(), Box::new(SystemClock))
	}
}

impl TurnScheduler {
	/// Creates a scheduler reading time from `clock`.
	pub fn new(budget: TimeBudget, batching: ImplicitBatching, clock: Box<dyn Clock>) -> Self {
		Self {
			budget,
			batching,
			clock,
			timer: TurnTimer::default(),
			open: None,
			stats: TurnStats::default(),
		}
	}

	/// Lifetime counters.
	pub const fn stats(&self) -> TurnStats {
		self.stats
	}

	/// Returns true while a batch is open. Always false between turns.
	pub const fn is_batch_open(&self) -> bool {
		self.open.is_some()
	}

	/// The processing budget per turn.
	pub const fn budget(&self) -> TimeBudget {
		self.budget
	}

	/// Runs one turn over `queue`.
	pub fn run_turn<H, O>(&mut self, queue: &mut InboundQueue, handler: &mut H, observer: &mut O) -> TurnOutcome
	where
		H: OpHandler + ?Sized,
		O: BatchObserver + ?Sized,
	{
		if queue.is_paused() {
			return TurnOutcome::Paused;
		}
		if queue.is_empty() {
			return TurnOutcome::Idle;
		}

		self.stats.turns += 1;
		self.timer.open(self.clock.now());
		let applied_before = self.stats.ops_applied;

		let outcome = loop {
			if queue.is_paused() {
				break TurnOutcome::Paused;
			}
			let Some(marker) = queue.peek().map(SequencedOp::batch_marker) else {
				break TurnOutcome::Drained;
			};

			if marker == Some(BatchMarker::Begin) {
				if !queue.contains_batch_end() {
					tracing::trace!(queued = queue.len(), "turn.awaiting_batch_end");
					break TurnOutcome::AwaitingBatchEnd;
				}
				self.close_batch(observer);
				self.run_explicit(queue, handler, observer);
			} else {
				self.run_standalone(queue, handler, observer);
			}

			if queue.is_empty() {
				break TurnOutcome::Drained;
			}
			let elapsed = self.timer.elapsed(self.clock.now());
			if self.budget.decide(elapsed) == TurnDecision::Yield {
				self.stats.yields += 1;
				tracing::debug!(
					elapsed_us = elapsed.as_micros() as u64,
					budget_us = self.budget.budget().as_micros() as u64,
					remaining = queue.len(),
					"turn.yield"
				);
				break TurnOutcome::Yielded;
			}
		};

		self.close_batch(observer);
		self.timer.close();
		tracing::debug!(
			?outcome,
			applied = self.stats.ops_applied - applied_before,
			remaining = queue.len(),
			"turn.end"
		);
		outcome
	}

	fn run_standalone<H, O>(&mut self, queue: &mut InboundQueue, handler: &mut H, observer: &mut O)
	where
		H: OpHandler + ?Sized,
		O: BatchObserver + ?Sized,
	{
		let Some(op) = queue.pop() else {
			return;
		};
		if op.batch_marker() == Some(BatchMarker::End) {
			tracing::warn!(seq = op.seq.0, "turn.stray_batch_end");
			observer.warning(SessionWarning::StrayBatchMarker { seq: op.seq });
		}
		if self.open.is_none() {
			self.open_batch(false, op.seq, observer);
		}
		self.apply(&op, handler, observer);
		if self.batching == ImplicitBatching::PerOperation {
			self.close_batch(observer);
		}
	}

	fn run_explicit<H, O>(&mut self, queue: &mut InboundQueue, handler: &mut H, observer: &mut O)
	where
		H: OpHandler + ?Sized,
		O: BatchObserver + ?Sized,
	{
		let Some(first) = queue.pop() else {
			return;
		};
		self.open_batch(true, first.seq, observer);
		self.apply(&first, handler, observer);

		while let Some(op) = queue.pop() {
			let marker = op.batch_marker();
			if marker == Some(BatchMarker::Begin) {
				tracing::warn!(seq = op.seq.0, "turn.nested_batch_begin");
				observer.warning(SessionWarning::StrayBatchMarker { seq: op.seq });
			}
			self.apply(&op, handler, observer);
			if marker == Some(BatchMarker::End) {
				break;
			}
		}
		self.close_batch(observer);
	}

	fn apply<H, O>(&mut self, op: &SequencedOp, handler: &mut H, observer: &mut O)
	where
		H: OpHandler + ?Sized,
		O: BatchObserver + ?Sized,
	{
		if let Some(info) = self.open.as_mut() {
			info.last_seq = op.seq;
			info.ops += 1;
		}
		self.stats.ops_applied += 1;
		tracing::trace!(seq = op.seq.0, "turn.apply");
		if let Err(error) = handler.process(op) {
			self.stats.ops_failed += 1;
			tracing::warn!(seq = op.seq.0, %error, "turn.apply_failed");
			observer.warning(SessionWarning::Malformed(error));
		}
	}

	fn open_batch<O>(&mut self, explicit: bool, first_seq: SeqNum, observer: &mut O)
	where
		O: BatchObserver + ?Sized,
	{
		debug_assert!(self.open.is_none(), "batch opened while another is open");
		let info = BatchInfo {
			explicit,
			first_seq,
			last_seq: first_seq,
			ops: 0,
		};
		self.open = Some(info);
		self.stats.batches_begun += 1;
		tracing::trace!(explicit, first_seq = first_seq.0, "turn.batch_begin");
		observer.batch_begin(&info);
	}

	fn close_batch<O>(&mut self, observer: &mut O)
	where
		O: BatchObserver + ?Sized,
	{
		let Some(info) = self.open.take() else {
			return;
		};
		self.stats.batches_ended += 1;
		tracing::trace!(explicit = info.explicit, last_seq = info.last_seq.0, ops = info.ops, "turn.batch_end");
		observer.batch_end(&info);
	}
}
