//! Outbound message staging.
//!
//! Local mutations are staged here with a client sequence number and the
//! reference sequence number current at the time they were made. Staged
//! messages leave as one group when the session flushes, which keeps an
//! explicit batch together on the wire.

use tandem_protocol::{ClientSeq, DocumentMessage, ObjectId, OpContents, OpMetadata, SeqNum};

/// Staging area for outbound messages.
#[derive(Debug, Default)]
pub struct Outbox {
	last_client_seq: u64,
	ref_seq: SeqNum,
	staged: Vec<DocumentMessage>,
	batch_depth: usize,
	batch_start: usize,
}

impl Outbox {
	/// Creates an empty outbox.
	pub fn new() -> Self {
		Self::default()
	}

	/// Allocates the next client sequence number. Never reused within a session.
	pub fn next_client_seq(&mut self) -> ClientSeq {
		self.last_client_seq += 1;
		ClientSeq(self.last_client_seq)
	}

	/// Records the last processed sequence number, stamped on later messages.
	pub fn set_ref_seq(&mut self, seq: SeqNum) {
		self.ref_seq = seq;
	}

	/// Reference sequence number stamped on newly staged messages.
	pub const fn ref_seq(&self) -> SeqNum {
		self.ref_seq
	}

	/// Stages an operation for `address`.
	pub fn push(&mut self, client_seq: ClientSeq, address: ObjectId, contents: OpContents) {
		tracing::trace!(client_seq = client_seq.0, object = %address, "outbox.push");
		self.staged
			.push(DocumentMessage::operation(client_seq, self.ref_seq, address, contents));
	}

	/// Opens an outbound batch. Batches nest; only the outermost one is marked.
	pub fn begin_batch(&mut self) {
		if self.batch_depth == 0 {
			self.batch_start = self.staged.len();
		}
		self.batch_depth += 1;
	}

	/// Closes an outbound batch, stamping markers on its first and last
	/// message once the outermost batch closes.
	pub fn end_batch(&mut self) {
		let Some(depth) = self.batch_depth.checked_sub(1) else {
			tracing::warn!("outbox.unbalanced_end_batch");
			return;
		};
		self.batch_depth = depth;
		if depth > 0 {
			return;
		}

		let start = self.batch_start.min(self.staged.len());
		let batch = &mut self.staged[start..];
		if let [first, .., last] = batch {
			first.metadata = OpMetadata::BEGIN;
			last.metadata = OpMetadata::END;
			tracing::trace!(messages = batch.len(), "outbox.batch");
		}
	}

	/// Returns true while an outbound batch is open.
	pub const fn in_batch(&self) -> bool {
		self.batch_depth > 0
	}

	/// Removes every staged message for sending. Returns nothing while a
	/// batch is still open.
	pub fn take(&mut self) -> Vec<DocumentMessage> {
		if self.in_batch() {
			return Vec::new();
		}
		std::mem::take(&mut self.staged)
	}

	/// Drops staged messages. Their operations stay pending in the kernels.
	pub fn discard(&mut self) -> usize {
		let dropped = self.staged.len();
		self.staged.clear();
		self.batch_start = 0;
		if dropped > 0 {
			tracing::debug!(dropped, "outbox.discard");
		}
		dropped
	}

	/// Staged message count.
	pub fn len(&self) -> usize {
		self.staged.len()
	}

	/// Returns true when nothing is staged.
	pub fn is_empty(&self) -> bool {
		self.staged.is_empty()
	}
}
