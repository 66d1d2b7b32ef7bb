use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tandem_protocol::ClientSeq;

use super::EchoMatching;

/// A local operation awaiting its echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOp<Op> {
	/// Identity stamped at submission, reused on resubmission.
	pub client_seq: ClientSeq,
	/// The operation as submitted.
	pub op: Op,
}

/// How an echo related to the pending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledged {
	/// The oldest pending operation was acknowledged.
	Front,
	/// A later pending operation was acknowledged out of order.
	Reordered,
	/// Nothing pending matched.
	Unmatched,
}

/// Unacknowledged local operations in submission order.
#[derive(Debug, Clone)]
pub struct PendingOps<Op> {
	ops: VecDeque<PendingOp<Op>>,
}

impl<Op> Default for PendingOps<Op> {
	fn default() -> Self {
		Self { ops: VecDeque::new() }
	}
}

impl<Op> FromIterator<PendingOp<Op>> for PendingOps<Op> {
	fn from_iter<I: IntoIterator<Item = PendingOp<Op>>>(iter: I) -> Self {
		Self {
			ops: iter.into_iter().collect(),
		}
	}
}

impl<Op> PendingOps<Op> {
	/// Appends a newly submitted operation.
	pub fn push(&mut self, client_seq: ClientSeq, op: Op) {
		self.ops.push_back(PendingOp { client_seq, op });
	}

	/// Removes the pending operation an echo acknowledges.
	pub fn acknowledge(&mut self, client_seq: ClientSeq, matching: EchoMatching) -> Acknowledged {
		match matching {
			EchoMatching::Order => match self.ops.pop_front() {
				Some(_) => Acknowledged::Front,
				None => Acknowledged::Unmatched,
			},
			EchoMatching::Identity => match self.ops.iter().position(|p| p.client_seq == client_seq) {
				Some(0) => {
					self.ops.pop_front();
					Acknowledged::Front
				}
				Some(idx) => {
					self.ops.remove(idx);
					Acknowledged::Reordered
				}
				None => Acknowledged::Unmatched,
			},
		}
	}

	/// Keeps only the entries for which `keep` returns true.
	pub fn retain(&mut self, keep: impl FnMut(&PendingOp<Op>) -> bool) {
		self.ops.retain(keep);
	}

	/// Iterates in submission order.
	pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PendingOp<Op>> + ExactSizeIterator {
		self.ops.iter()
	}

	/// Oldest entry.
	pub fn front(&self) -> Option<&PendingOp<Op>> {
		self.ops.front()
	}

	/// Drops every entry.
	pub fn clear(&mut self) {
		self.ops.clear();
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.ops.len()
	}

	/// Returns true when nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}
}

impl<Op: Clone> PendingOps<Op> {
	/// Copies the entries out in submission order.
	pub fn to_vec(&self) -> Vec<PendingOp<Op>> {
		self.ops.iter().cloned().collect()
	}
}
