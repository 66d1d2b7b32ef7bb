use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, ClientSeq, ObjectId, SeqNum};
use crate::ops::OpContents;

/// Kind of a sequenced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
	/// A change addressed to a shared object.
	Operation,
	/// A control message that only advances the sequence number.
	NoOp,
}

/// Position of an operation within an explicit batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchMarker {
	/// First operation of an explicit batch (`batch: true`).
	Begin,
	/// Last operation of an explicit batch (`batch: false`).
	End,
}

/// Per-message metadata.
///
/// `batch` is tri-state on the wire: `true` opens an explicit batch, `false`
/// closes it, absent means the operation is standalone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpMetadata {
	/// Explicit batch marker.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub batch: Option<bool>,
}

impl OpMetadata {
	/// Metadata of a standalone operation.
	pub const NONE: Self = Self { batch: None };
	/// Metadata opening an explicit batch.
	pub const BEGIN: Self = Self { batch: Some(true) };
	/// Metadata closing an explicit batch.
	pub const END: Self = Self { batch: Some(false) };

	/// Decodes the tri-state batch flag.
	pub const fn marker(&self) -> Option<BatchMarker> {
		match self.batch {
			Some(true) => Some(BatchMarker::Begin),
			Some(false) => Some(BatchMarker::End),
			None => None,
		}
	}
}

/// Addressed operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
	/// Target shared object.
	pub address: ObjectId,
	/// Kernel-specific payload.
	pub contents: OpContents,
}

/// An operation as delivered by the ordering service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedOp {
	/// Position in the document's total order.
	#[serde(rename = "sequenceNumber")]
	pub seq: SeqNum,
	/// Low-water mark below which every client has seen every operation.
	#[serde(rename = "minimumSequenceNumber")]
	pub min_seq: SeqNum,
	/// Originating client, `None` for service-originated messages.
	#[serde(default)]
	pub client_id: Option<ClientId>,
	/// Client-assigned identity of the submitted message.
	#[serde(rename = "clientSequenceNumber", default)]
	pub client_seq: ClientSeq,
	/// Last sequence number the sender had processed when submitting.
	#[serde(rename = "referenceSequenceNumber", default)]
	pub ref_seq: SeqNum,
	/// Message kind.
	#[serde(rename = "type")]
	pub kind: MessageType,
	/// Addressed payload; absent for control messages.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contents: Option<Envelope>,
	/// Batch metadata.
	#[serde(default)]
	pub metadata: OpMetadata,
}

impl SequencedOp {
	/// Returns the explicit batch marker carried by this operation, if any.
	pub const fn batch_marker(&self) -> Option<BatchMarker> {
		self.metadata.marker()
	}

	/// Builds a service-originated no-op at `seq`.
	pub fn noop(seq: SeqNum, min_seq: SeqNum) -> Self {
		Self {
			seq,
			min_seq,
			client_id: None,
			client_seq: ClientSeq::default(),
			ref_seq: min_seq,
			kind: MessageType::NoOp,
			contents: None,
			metadata: OpMetadata::NONE,
		}
	}

	/// Stamps an outbound message with its position in the total order.
	pub fn sequence(message: DocumentMessage, client_id: ClientId, seq: SeqNum, min_seq: SeqNum) -> Self {
		Self {
			seq,
			min_seq,
			client_id: Some(client_id),
			client_seq: message.client_seq,
			ref_seq: message.ref_seq,
			kind: message.kind,
			contents: message.contents,
			metadata: message.metadata,
		}
	}
}

/// A locally produced message on its way to the ordering service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMessage {
	/// Client-assigned identity used to match the echo.
	#[serde(rename = "clientSequenceNumber")]
	pub client_seq: ClientSeq,
	/// Last sequence number processed by the sender.
	#[serde(rename = "referenceSequenceNumber")]
	pub ref_seq: SeqNum,
	/// Message kind.
	#[serde(rename = "type")]
	pub kind: MessageType,
	/// Addressed payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contents: Option<Envelope>,
	/// Batch metadata.
	#[serde(default)]
	pub metadata: OpMetadata,
}

impl DocumentMessage {
	/// Builds an operation message addressed to `address`.
	pub fn operation(client_seq: ClientSeq, ref_seq: SeqNum, address: ObjectId, contents: OpContents) -> Self {
		Self {
			client_seq,
			ref_seq,
			kind: MessageType::Operation,
			contents: Some(Envelope { address, contents }),
			metadata: OpMetadata::NONE,
		}
	}
}
