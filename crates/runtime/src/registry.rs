//! Object registry: owns every shared object of a document and routes
//! sequenced operations to them.

use std::collections::BTreeMap;

use tandem_protocol::{ClientSeq, MessageType, ObjectId, ObjectKind, OpContents, SequencedOp};

use crate::error::{MalformedOperation, SessionError};
use crate::kernel::{
	ApplyContext, EchoMatching, OpRejected, SharedIntervalCollection, SharedKernel, SharedMap,
};

/// A shared object of any kind.
#[derive(Debug, Clone)]
pub enum SharedObject {
	/// Last-writer-wins map.
	Map(SharedMap),
	/// Interval collection.
	Intervals(SharedIntervalCollection),
}

impl SharedObject {
	/// Creates an empty object of `kind`.
	pub fn new(kind: ObjectKind, id: ObjectId, matching: EchoMatching) -> Self {
		match kind {
			ObjectKind::Map => Self::Map(SharedMap::new(id, matching)),
			ObjectKind::IntervalCollection => Self::Intervals(SharedIntervalCollection::new(id, matching)),
		}
	}

	/// Kind of this object.
	pub const fn kind(&self) -> ObjectKind {
		match self {
			Self::Map(_) => ObjectKind::Map,
			Self::Intervals(_) => ObjectKind::IntervalCollection,
		}
	}

	/// Address of this object.
	pub fn id(&self) -> &ObjectId {
		match self {
			Self::Map(map) => map.id(),
			Self::Intervals(intervals) => intervals.id(),
		}
	}

	/// Unacknowledged local operations.
	pub fn pending_len(&self) -> usize {
		match self {
			Self::Map(map) => map.pending_len(),
			Self::Intervals(intervals) => intervals.pending_len(),
		}
	}

	/// Applies a sequenced payload. A payload for another kind is rejected.
	pub fn apply(&mut self, contents: OpContents, ctx: &ApplyContext) -> Result<(), OpRejected> {
		match (self, contents) {
			(Self::Map(map), OpContents::Map(op)) => map.apply(op, ctx),
			(Self::Intervals(intervals), OpContents::Intervals(op)) => intervals.apply(op, ctx),
			(object, contents) => Err(OpRejected::new(format!(
				"{:?} operation sent to {:?} object",
				contents.object_kind(),
				object.kind()
			))),
		}
	}

	/// Pending operations to resend, as wire payloads.
	pub fn on_reconnect(&mut self) -> Vec<(ClientSeq, OpContents)> {
		match self {
			Self::Map(map) => map
				.on_reconnect()
				.into_iter()
				.map(|p| (p.client_seq, OpContents::Map(p.op)))
				.collect(),
			Self::Intervals(intervals) => intervals
				.on_reconnect()
				.into_iter()
				.map(|p| (p.client_seq, OpContents::Intervals(p.op)))
				.collect(),
		}
	}

	/// Serializes acknowledged state and pending operations.
	pub fn snapshot(&self) -> Result<String, serde_json::Error> {
		match self {
			Self::Map(map) => map.snapshot(),
			Self::Intervals(intervals) => intervals.snapshot(),
		}
	}

	/// Serializes acknowledged state only.
	pub fn summary(&self) -> Result<String, serde_json::Error> {
		match self {
			Self::Map(map) => map.summary(),
			Self::Intervals(intervals) => intervals.summary(),
		}
	}

	/// Loads a snapshot or summary.
	pub fn populate(&mut self, snapshot: &str) -> Result<(), serde_json::Error> {
		match self {
			Self::Map(map) => map.populate(snapshot),
			Self::Intervals(intervals) => intervals.populate(snapshot),
		}
	}
}

/// Every shared object of one document, by address.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
	objects: BTreeMap<ObjectId, SharedObject>,
	matching: EchoMatching,
}

impl ObjectRegistry {
	/// Creates an empty registry whose objects match echoes with `matching`.
	pub fn new(matching: EchoMatching) -> Self {
		Self {
			objects: BTreeMap::new(),
			matching,
		}
	}

	/// Returns the object at `id`, creating an empty one of `kind` if absent.
	pub fn get_or_create(&mut self, id: &ObjectId, kind: ObjectKind) -> Result<&mut SharedObject, SessionError> {
		let matching = self.matching;
		let object = self.objects.entry(id.clone()).or_insert_with(|| {
			tracing::debug!(object = %id, ?kind, "registry.create");
			SharedObject::new(kind, id.clone(), matching)
		});
		if object.kind() != kind {
			return Err(SessionError::ObjectKind {
				address: id.clone(),
				expected: kind,
				found: object.kind(),
			});
		}
		Ok(object)
	}

	/// Inserts or replaces an object.
	pub fn insert(&mut self, object: SharedObject) {
		self.objects.insert(object.id().clone(), object);
	}

	/// Object at `id`.
	pub fn get(&self, id: &ObjectId) -> Option<&SharedObject> {
		self.objects.get(id)
	}

	/// Map at `id`, if it exists and is a map.
	pub fn map(&self, id: &ObjectId) -> Option<&SharedMap> {
		match self.objects.get(id)? {
			SharedObject::Map(map) => Some(map),
			SharedObject::Intervals(_) => None,
		}
	}

	/// Interval collection at `id`, if it exists and is one.
	pub fn intervals(&self, id: &ObjectId) -> Option<&SharedIntervalCollection> {
		match self.objects.get(id)? {
			SharedObject::Intervals(intervals) => Some(intervals),
			SharedObject::Map(_) => None,
		}
	}

	/// Objects in address order.
	pub fn iter(&self) -> impl Iterator<Item = &SharedObject> {
		self.objects.values()
	}

	/// Mutable objects in address order.
	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SharedObject> {
		self.objects.values_mut()
	}

	/// Total unacknowledged local operations.
	pub fn pending_len(&self) -> usize {
		self.objects.values().map(SharedObject::pending_len).sum()
	}

	/// Object count.
	pub fn len(&self) -> usize {
		self.objects.len()
	}

	/// Returns true when the document has no objects.
	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	/// Routes a sequenced operation to its object.
	///
	/// No-ops are accepted without effect. An operation addressed to an
	/// unknown object creates it with the kind its payload names.
	pub fn dispatch(&mut self, op: &SequencedOp, local: bool) -> Result<(), MalformedOperation> {
		if op.kind == MessageType::NoOp {
			return Ok(());
		}
		let Some(envelope) = op.contents.as_ref() else {
			return Err(MalformedOperation {
				address: None,
				seq: op.seq,
				reason: "operation carries no contents".into(),
			});
		};

		let address = &envelope.address;
		let matching = self.matching;
		let object = self.objects.entry(address.clone()).or_insert_with(|| {
			let kind = envelope.contents.object_kind();
			tracing::debug!(object = %address, ?kind, seq = op.seq.0, "registry.remote_create");
			SharedObject::new(kind, address.clone(), matching)
		});

		let ctx = ApplyContext {
			seq: op.seq,
			local,
			client_seq: op.client_seq,
		};
		object
			.apply(envelope.contents.clone(), &ctx)
			.map_err(|rejected| MalformedOperation {
				address: Some(address.clone()),
				seq: op.seq,
				reason: rejected.0,
			})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tandem_protocol::{ClientId, DocumentMessage, IntervalOp, MapOp, SeqNum};

	use super::*;

	fn sequenced(seq: u64, address: &str, contents: OpContents) -> SequencedOp {
		let message = DocumentMessage::operation(ClientSeq(seq), SeqNum::ZERO, address.into(), contents);
		SequencedOp::sequence(message, ClientId::from("other"), SeqNum(seq), SeqNum::ZERO)
	}

	fn set(key: &str) -> OpContents {
		OpContents::Map(MapOp::Set {
			key: key.into(),
			value: json!(true),
		})
	}

	#[test]
	fn test_remote_op_creates_object() {
		let mut registry = ObjectRegistry::default();
		registry.dispatch(&sequenced(1, "m", set("k")), false).unwrap();

		let map = registry.map(&"m".into()).unwrap();
		assert_eq!(map.get("k"), Some(&json!(true)));
	}

	#[test]
	fn test_kind_mismatch_is_malformed() {
		let mut registry = ObjectRegistry::default();
		registry.dispatch(&sequenced(1, "m", set("k")), false).unwrap();

		let wrong = OpContents::Intervals(IntervalOp::CreateCollection { label: "x".into() });
		let err = registry.dispatch(&sequenced(2, "m", wrong), false).unwrap_err();
		assert_eq!(err.address, Some(ObjectId::from("m")));
		assert_eq!(err.seq, SeqNum(2));
	}

	#[test]
	fn test_operation_without_contents_is_malformed() {
		let mut op = sequenced(1, "m", set("k"));
		op.contents = None;
		let err = ObjectRegistry::default().dispatch(&op, false).unwrap_err();
		assert_eq!(err.address, None);
	}

	#[test]
	fn test_noop_is_accepted() {
		let mut registry = ObjectRegistry::default();
		registry.dispatch(&SequencedOp::noop(SeqNum(1), SeqNum::ZERO), false).unwrap();
		assert!(registry.is_empty());
	}

	#[test]
	fn test_get_or_create_rejects_other_kind() {
		let mut registry = ObjectRegistry::default();
		registry.get_or_create(&"m".into(), ObjectKind::Map).unwrap();
		assert!(matches!(
			registry.get_or_create(&"m".into(), ObjectKind::IntervalCollection),
			Err(SessionError::ObjectKind { .. })
		));
	}
}
