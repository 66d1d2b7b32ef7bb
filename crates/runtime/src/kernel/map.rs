//! Last-writer-wins map kernel.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_protocol::{MapOp, ObjectKind, OpContents};

use super::pending::PendingOps;
use super::replica::{Replica, ReplicaState};
use super::{OpRejected, SharedKernel};
use crate::outbox::Outbox;

/// Contents of a shared map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapState(BTreeMap<String, Value>);

impl MapState {
	/// Value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Iterates entries in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v))
	}

	/// Entry count.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true for an empty map.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl ReplicaState for MapState {
	type Op = MapOp;

	const KIND: ObjectKind = ObjectKind::Map;

	fn apply(&mut self, op: &MapOp) -> Result<(), OpRejected> {
		match op {
			MapOp::Set { key, value } => {
				self.0.insert(key.clone(), value.clone());
			}
			MapOp::Delete { key } => {
				self.0.remove(key);
			}
			MapOp::Clear => self.0.clear(),
		}
		Ok(())
	}

	/// Keeps the last `Clear` and, after it, the newest operation per key.
	/// Earlier writes are invisible once a later one is sequenced, so other
	/// replicas never need them.
	fn coalesce(pending: &mut PendingOps<MapOp>) {
		let last_clear = pending
			.iter()
			.rposition(|p| matches!(p.op, MapOp::Clear));
		let mut newest = HashSet::new();
		let keep: HashSet<_> = pending
			.iter()
			.enumerate()
			.rev()
			.filter(|(idx, p)| match p.op.key() {
				None => Some(*idx) == last_clear,
				Some(key) => last_clear.is_none_or(|clear| *idx > clear) && newest.insert(key.to_string()),
			})
			.map(|(_, p)| p.client_seq)
			.collect();
		pending.retain(|p| keep.contains(&p.client_seq));
	}
}

/// A shared label to value map.
pub type SharedMap = Replica<MapState>;

impl Replica<MapState> {
	/// Value under `key`, including pending local writes.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.visible().get(key)
	}

	/// Returns true if `key` is present.
	pub fn contains_key(&self, key: &str) -> bool {
		self.get(key).is_some()
	}

	/// Number of visible entries.
	pub fn len(&self) -> usize {
		self.visible().len()
	}

	/// Returns true when no entry is visible.
	pub fn is_empty(&self) -> bool {
		self.visible().is_empty()
	}
}

/// Mutable access to a [`SharedMap`] inside a session.
///
/// Every mutation applies locally at once and is staged for the next flush.
#[derive(Debug)]
pub struct MapHandle<'a> {
	map: &'a mut SharedMap,
	outbox: &'a mut Outbox,
}

impl<'a> MapHandle<'a> {
	pub(crate) fn new(map: &'a mut SharedMap, outbox: &'a mut Outbox) -> Self {
		Self { map, outbox }
	}

	/// Sets `key` to `value`.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), OpRejected> {
		self.submit(MapOp::Set {
			key: key.into(),
			value: value.into(),
		})
	}

	/// Removes `key`.
	pub fn delete(&mut self, key: impl Into<String>) -> Result<(), OpRejected> {
		self.submit(MapOp::Delete { key: key.into() })
	}

	/// Removes every key.
	pub fn clear(&mut self) -> Result<(), OpRejected> {
		self.submit(MapOp::Clear)
	}

	/// Read access to the map.
	pub fn map(&self) -> &SharedMap {
		self.map
	}

	/// Value under `key`.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.map.get(key)
	}

	fn submit(&mut self, op: MapOp) -> Result<(), OpRejected> {
		let client_seq = self.outbox.next_client_seq();
		self.map.submit_local(op.clone(), client_seq)?;
		self.outbox.push(client_seq, self.map.id().clone(), OpContents::Map(op));
		Ok(())
	}
}
