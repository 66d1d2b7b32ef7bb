//! Inbound operation queue.
//!
//! Buffers sequenced operations in arrival order and releases them one at a
//! time. Sequence numbers are checked on arrival against the highest number
//! seen so far: a repeat is dropped, a gap is a [`DesyncError`].

use std::collections::VecDeque;

use tandem_protocol::{BatchMarker, SeqNum, SequencedOp};

use crate::error::DesyncError;

/// Result of handing an operation to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
	/// Appended for delivery.
	Queued,
	/// Already seen; dropped.
	Duplicate,
	/// Dropped because the session is not accepting operations.
	Ignored,
}

/// FIFO of sequenced operations awaiting the turn scheduler.
#[derive(Debug, Default)]
pub struct InboundQueue {
	ops: VecDeque<SequencedOp>,
	paused: bool,
	/// Highest sequence number accepted.
	last_enqueued: SeqNum,
	/// Sequence number of the last operation handed out by [`Self::pop`].
	last_delivered: SeqNum,
	/// Number of queued operations carrying a batch end marker.
	queued_batch_ends: usize,
}

impl InboundQueue {
	/// Creates an empty queue expecting `SeqNum(1)` next.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty queue positioned after `seq`, e.g. after loading a snapshot.
	pub fn starting_at(seq: SeqNum) -> Self {
		Self {
			last_enqueued: seq,
			last_delivered: seq,
			..Self::default()
		}
	}

	/// Appends an operation arriving from the transport.
	pub fn enqueue(&mut self, op: SequencedOp) -> Result<EnqueueOutcome, DesyncError> {
		let expected = self.last_enqueued.next();
		if op.seq < expected {
			tracing::warn!(seq = op.seq.0, expected = expected.0, "inbound.duplicate");
			return Ok(EnqueueOutcome::Duplicate);
		}
		if op.seq != expected {
			tracing::error!(seq = op.seq.0, expected = expected.0, "inbound.gap");
			return Err(DesyncError {
				expected,
				received: op.seq,
			});
		}

		self.last_enqueued = op.seq;
		if op.batch_marker() == Some(BatchMarker::End) {
			self.queued_batch_ends += 1;
		}
		tracing::trace!(seq = op.seq.0, queued = self.ops.len() + 1, paused = self.paused, "inbound.enqueue");
		self.ops.push_back(op);
		Ok(EnqueueOutcome::Queued)
	}

	/// Stops releasing operations. Arrivals keep accumulating.
	pub fn pause(&mut self) {
		if !self.paused {
			tracing::debug!(queued = self.ops.len(), "inbound.pause");
		}
		self.paused = true;
	}

	/// Resumes releasing operations.
	pub fn resume(&mut self) {
		if self.paused {
			tracing::debug!(queued = self.ops.len(), "inbound.resume");
		}
		self.paused = false;
	}

	/// Returns true while paused.
	pub const fn is_paused(&self) -> bool {
		self.paused
	}

	/// Returns true when an operation is available and the queue is not paused.
	pub fn is_ready(&self) -> bool {
		!self.paused && !self.ops.is_empty()
	}

	/// Next operation to be delivered.
	pub fn peek(&self) -> Option<&SequencedOp> {
		self.ops.front()
	}

	/// Removes and returns the next operation, ignoring the pause flag.
	///
	/// The scheduler checks [`Self::is_paused`] at turn and batch boundaries;
	/// inside an explicit batch it drains regardless.
	pub fn pop(&mut self) -> Option<SequencedOp> {
		let op = self.ops.pop_front()?;
		debug_assert!(op.seq > self.last_delivered, "inbound delivery must be strictly increasing");
		self.last_delivered = op.seq;
		if op.batch_marker() == Some(BatchMarker::End) {
			self.queued_batch_ends -= 1;
		}
		Some(op)
	}

	/// Returns true if a batch end marker is queued.
	///
	/// When the front of the queue opens an explicit batch, this tells whether
	/// the whole batch has arrived.
	pub const fn contains_batch_end(&self) -> bool {
		self.queued_batch_ends > 0
	}

	/// Number of queued operations.
	pub fn len(&self) -> usize {
		self.ops.len()
	}

	/// Returns true when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	/// Highest sequence number accepted into the queue.
	pub const fn last_enqueued(&self) -> SeqNum {
		self.last_enqueued
	}

	/// Sequence number of the last delivered operation.
	pub const fn last_delivered(&self) -> SeqNum {
		self.last_delivered
	}
}
