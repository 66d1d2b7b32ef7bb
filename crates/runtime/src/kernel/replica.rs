use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tandem_protocol::{ClientSeq, ObjectId, ObjectKind};

use super::pending::{Acknowledged, PendingOp, PendingOps};
use super::{ApplyContext, EchoMatching, OpRejected, SharedKernel};

/// Deterministic state of one kind of shared object.
pub trait ReplicaState: Clone + Default + Serialize + DeserializeOwned {
	/// Operation payload.
	type Op: Clone + std::fmt::Debug + Serialize + DeserializeOwned;

	/// Kind recorded for objects holding this state.
	const KIND: ObjectKind;

	/// Applies `op`. Must leave the state untouched when it returns an error.
	fn apply(&mut self, op: &Self::Op) -> Result<(), OpRejected>;

	/// Shrinks the pending list before a resubmission. The default resends
	/// everything.
	fn coalesce(_pending: &mut PendingOps<Self::Op>) {}
}

/// Serialized form of a [`Replica`]. `pending` is omitted when empty, so an
/// acknowledged-only snapshot is `{"sequenced": ...}`.
#[derive(Serialize, Deserialize)]
struct ReplicaSnapshot<S, P> {
	sequenced: S,
	#[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
	pending: Vec<P>,
}

/// Replication bookkeeping shared by every kernel.
///
/// `sequenced` holds only acknowledged operations and is identical on every
/// replica at the same sequence number. `visible` is `sequenced` with the
/// pending local operations replayed on top, which is what the local user
/// reads.
#[derive(Debug, Clone)]
pub struct Replica<S: ReplicaState> {
	id: ObjectId,
	matching: EchoMatching,
	sequenced: S,
	visible: S,
	pending: PendingOps<S::Op>,
}

impl<S: ReplicaState> Replica<S> {
	/// Creates an empty object.
	pub fn new(id: ObjectId, matching: EchoMatching) -> Self {
		Self {
			id,
			matching,
			sequenced: S::default(),
			visible: S::default(),
			pending: PendingOps::default(),
		}
	}

	/// State including pending local operations.
	pub fn visible(&self) -> &S {
		&self.visible
	}

	/// Acknowledged state only.
	pub fn sequenced(&self) -> &S {
		&self.sequenced
	}

	/// Unacknowledged local operations.
	pub fn pending(&self) -> &PendingOps<S::Op> {
		&self.pending
	}

	/// Echo matching policy.
	pub fn matching(&self) -> EchoMatching {
		self.matching
	}

	fn rebuild_visible(&mut self) {
		let mut visible = self.sequenced.clone();
		for pending in self.pending.iter() {
			if let Err(error) = visible.apply(&pending.op) {
				tracing::trace!(
					object = %self.id,
					client_seq = pending.client_seq.0,
					%error,
					"kernel.pending_not_applicable"
				);
			}
		}
		self.visible = visible;
	}
}

impl<S: ReplicaState> SharedKernel for Replica<S> {
	type Op = S::Op;

	const KIND: ObjectKind = S::KIND;

	fn id(&self) -> &ObjectId {
		&self.id
	}

	fn apply(&mut self, op: S::Op, ctx: &ApplyContext) -> Result<(), OpRejected> {
		let result = self.sequenced.apply(&op);
		let acked = if ctx.local {
			self.pending.acknowledge(ctx.client_seq, self.matching)
		} else {
			Acknowledged::Unmatched
		};

		match (&result, ctx.local, acked) {
			(Ok(()), true, Acknowledged::Front) => {}
			(Ok(()), false, _) if self.pending.is_empty() => {
				if self.visible.apply(&op).is_err() {
					self.rebuild_visible();
				}
			}
			_ => {
				if ctx.local && acked == Acknowledged::Unmatched {
					tracing::warn!(
						object = %self.id,
						seq = ctx.seq.0,
						client_seq = ctx.client_seq.0,
						"kernel.unmatched_echo"
					);
				}
				self.rebuild_visible();
			}
		}

		tracing::trace!(
			object = %self.id,
			seq = ctx.seq.0,
			local = ctx.local,
			pending = self.pending.len(),
			ok = result.is_ok(),
			"kernel.apply"
		);
		result
	}

	fn submit_local(&mut self, op: S::Op, client_seq: ClientSeq) -> Result<(), OpRejected> {
		self.visible.apply(&op)?;
		tracing::trace!(object = %self.id, client_seq = client_seq.0, "kernel.submit_local");
		self.pending.push(client_seq, op);
		Ok(())
	}

	fn on_reconnect(&mut self) -> Vec<PendingOp<S::Op>> {
		let before = self.pending.len();
		S::coalesce(&mut self.pending);
		if self.pending.len() != before {
			tracing::debug!(
				object = %self.id,
				before,
				after = self.pending.len(),
				"kernel.coalesce"
			);
			self.rebuild_visible();
		}
		self.pending.to_vec()
	}

	fn pending_len(&self) -> usize {
		self.pending.len()
	}

	fn snapshot(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(&ReplicaSnapshot::<_, &PendingOp<S::Op>> {
			sequenced: &self.sequenced,
			pending: self.pending.iter().collect(),
		})
	}

	fn summary(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(&ReplicaSnapshot::<_, &PendingOp<S::Op>> {
			sequenced: &self.sequenced,
			pending: Vec::new(),
		})
	}

	fn populate(&mut self, snapshot: &str) -> Result<(), serde_json::Error> {
		let snapshot: ReplicaSnapshot<S, PendingOp<S::Op>> = serde_json::from_str(snapshot)?;
		self.sequenced = snapshot.sequenced;
		self.pending = snapshot.pending.into_iter().collect();
		self.rebuild_visible();
		Ok(())
	}
}
