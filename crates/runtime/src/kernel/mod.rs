//! Shared-object kernels.
//!
//! A kernel owns one replicated object. It applies sequenced operations in
//! order, keeps its own unacknowledged local operations, and decides what to
//! resend after a reconnect. [`Replica`] implements the bookkeeping once for
//! any [`ReplicaState`]; the concrete kernels only define their state and how
//! an operation changes it.

use serde::{Deserialize, Serialize};
use tandem_protocol::{ClientSeq, ObjectId, ObjectKind, SeqNum};
use thiserror::Error;

mod intervals;
mod map;
mod pending;
mod replica;

pub use intervals::{
	IntervalCollectionHandle, IntervalCollectionState, IntervalsHandle, SharedIntervalCollection,
};
pub use map::{MapHandle, MapState, SharedMap};
pub use pending::{Acknowledged, PendingOp, PendingOps};
pub use replica::{Replica, ReplicaState};

/// A kernel refused an operation because it does not fit the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OpRejected(pub String);

impl OpRejected {
	/// Creates a rejection with the given reason.
	pub fn new(reason: impl Into<String>) -> Self {
		Self(reason.into())
	}
}

/// How a kernel pairs an echo with its pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EchoMatching {
	/// Match by the client sequence number stamped at submission.
	#[default]
	Identity,
	/// The echo acknowledges the oldest pending operation.
	Order,
}

/// Facts about a sequenced operation a kernel may need while applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyContext {
	/// Sequence number of the operation.
	pub seq: SeqNum,
	/// True when this client submitted the operation.
	pub local: bool,
	/// Client sequence number stamped by the submitter.
	pub client_seq: ClientSeq,
}

/// Contract every shared object fulfils.
pub trait SharedKernel {
	/// Operation payload understood by this kernel.
	type Op;

	/// Kind recorded in snapshots and used for remote creation.
	const KIND: ObjectKind;

	/// Address of this object.
	fn id(&self) -> &ObjectId;

	/// Applies a sequenced operation. `ctx.local` marks the echo of an
	/// operation this client submitted.
	fn apply(&mut self, op: Self::Op, ctx: &ApplyContext) -> Result<(), OpRejected>;

	/// Applies a local mutation optimistically and records it as pending.
	fn submit_local(&mut self, op: Self::Op, client_seq: ClientSeq) -> Result<(), OpRejected>;

	/// Returns the operations to resend after a reconnect, in submission
	/// order. Pending operations stay pending until echoed.
	fn on_reconnect(&mut self) -> Vec<PendingOp<Self::Op>>;

	/// Number of unacknowledged local operations.
	fn pending_len(&self) -> usize;

	/// Serializes acknowledged state together with pending local operations.
	fn snapshot(&self) -> Result<String, serde_json::Error>;

	/// Serializes acknowledged state only, in the same layout as
	/// [`Self::snapshot`] with nothing pending.
	fn summary(&self) -> Result<String, serde_json::Error>;

	/// Replaces all state with a snapshot produced by [`Self::snapshot`] or
	/// [`Self::summary`].
	fn populate(&mut self, snapshot: &str) -> Result<(), serde_json::Error>;
}
