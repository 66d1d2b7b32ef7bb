//! Reconnect resubmission.

use tandem_protocol::ObjectId;

use crate::outbox::Outbox;
use crate::registry::ObjectRegistry;

/// What one resubmission round staged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResubmitReport {
	/// Messages staged per object, in address order.
	pub objects: Vec<(ObjectId, usize)>,
}

impl ResubmitReport {
	/// Total messages staged.
	pub fn messages(&self) -> usize {
		self.objects.iter().map(|(_, count)| count).sum()
	}
}

/// Asks every object with pending operations to resubmit them.
///
/// Each object is asked once per round; order within an object is its
/// submission order. Resubmitted messages keep their original client
/// sequence number so a late echo of the first attempt still matches, and
/// carry no batch markers. Nothing is removed from the pending lists here.
#[derive(Debug, Default)]
pub struct ResubmissionCoordinator {
	rounds: u64,
}

impl ResubmissionCoordinator {
	/// Creates a coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Stages every object's resubmissions into `outbox`.
	pub fn resubmit(&mut self, registry: &mut ObjectRegistry, outbox: &mut Outbox) -> ResubmitReport {
		self.rounds += 1;
		let mut report = ResubmitReport::default();

		for object in registry.iter_mut().filter(|object| object.pending_len() > 0) {
			let address = object.id().clone();
			let resend = object.on_reconnect();
			let count = resend.len();
			for (client_seq, contents) in resend {
				outbox.push(client_seq, address.clone(), contents);
			}
			tracing::debug!(object = %address, pending = object.pending_len(), resent = count, "resubmit.object");
			report.objects.push((address, count));
		}

		tracing::debug!(
			round = self.rounds,
			objects = report.objects.len(),
			messages = report.messages(),
			"resubmit.done"
		);
		report
	}

	/// Rounds run so far.
	pub const fn rounds(&self) -> u64 {
		self.rounds
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;
	use tandem_protocol::{ClientSeq, ObjectKind};

	use super::*;
	use crate::kernel::{IntervalsHandle, MapHandle};
	use crate::registry::SharedObject;

	#[test]
	fn test_only_objects_with_pending_ops_resubmit() {
		let mut registry = ObjectRegistry::default();
		let mut outbox = Outbox::new();
		registry.get_or_create(&"idle".into(), ObjectKind::Map).unwrap();
		if let SharedObject::Map(map) = registry.get_or_create(&"busy".into(), ObjectKind::Map).unwrap() {
			let mut handle = MapHandle::new(map, &mut outbox);
			handle.set("a", json!(1)).unwrap();
			handle.set("b", json!(2)).unwrap();
		}
		outbox.discard();

		let report = ResubmissionCoordinator::new().resubmit(&mut registry, &mut outbox);
		assert_eq!(report.objects, vec![(ObjectId::from("busy"), 2)]);

		let staged: Vec<_> = outbox.take().iter().map(|m| m.client_seq).collect();
		assert_eq!(staged, vec![ClientSeq(1), ClientSeq(2)]);
		assert_eq!(registry.pending_len(), 2);
	}

	#[test]
	fn test_resubmitted_messages_carry_no_batch_markers() {
		let mut registry = ObjectRegistry::default();
		let mut outbox = Outbox::new();
		outbox.begin_batch();
		if let SharedObject::Intervals(kernel) = registry.get_or_create(&"iv".into(), ObjectKind::IntervalCollection).unwrap() {
			let mut coll = IntervalsHandle::new(kernel, &mut outbox).get_interval_collection("x").unwrap();
			coll.add(0, 1, Default::default()).unwrap();
		}
		outbox.end_batch();
		outbox.discard();

		ResubmissionCoordinator::new().resubmit(&mut registry, &mut outbox);
		let staged = outbox.take();
		assert_eq!(staged.len(), 2);
		assert!(staged.iter().all(|m| m.metadata.batch.is_none()));
	}
}
