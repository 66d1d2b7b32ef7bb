//! Interval collection kernel.
//!
//! Labelled collections of `[start, end]` intervals with properties. Unlike
//! the map, operations here depend on what came before them (an interval
//! must exist to be changed), so every pending operation is resent in order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_protocol::{Interval, IntervalId, IntervalOp, ObjectKind, OpContents};

use super::replica::{Replica, ReplicaState};
use super::{OpRejected, SharedKernel};
use crate::outbox::Outbox;

type Collection = BTreeMap<IntervalId, Interval>;

/// Contents of a shared interval collection, keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalCollectionState(BTreeMap<String, Collection>);

impl IntervalCollectionState {
	/// Intervals under `label`, if the collection exists.
	pub fn collection(&self, label: &str) -> Option<&BTreeMap<IntervalId, Interval>> {
		self.0.get(label)
	}

	/// Existing collection labels in order.
	pub fn labels(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	fn existing(&mut self, label: &str) -> Result<&mut Collection, OpRejected> {
		self.0
			.get_mut(label)
			.ok_or_else(|| OpRejected::new(format!("no interval collection labelled {label:?}")))
	}
}

fn check_bounds(start: u64, end: u64) -> Result<(), OpRejected> {
	if start > end {
		return Err(OpRejected::new(format!("interval start {start} is after end {end}")));
	}
	Ok(())
}

impl ReplicaState for IntervalCollectionState {
	type Op = IntervalOp;

	const KIND: ObjectKind = ObjectKind::IntervalCollection;

	fn apply(&mut self, op: &IntervalOp) -> Result<(), OpRejected> {
		match op {
			IntervalOp::CreateCollection { label } => {
				self.0.entry(label.clone()).or_default();
			}
			IntervalOp::Add { label, interval } => {
				check_bounds(interval.start, interval.end)?;
				self.existing(label)?.insert(interval.id.clone(), interval.clone());
			}
			IntervalOp::Delete { label, id } => {
				self.existing(label)?.remove(id);
			}
			IntervalOp::Change {
				label,
				id,
				start,
				end,
				props,
			} => {
				let Some(interval) = self.existing(label)?.get_mut(id) else {
					return Ok(());
				};
				let new_start = start.unwrap_or(interval.start);
				let new_end = end.unwrap_or(interval.end);
				check_bounds(new_start, new_end)?;

				interval.start = new_start;
				interval.end = new_end;
				for (key, value) in props {
					if value.is_null() {
						interval.props.remove(key);
					} else {
						interval.props.insert(key.clone(), value.clone());
					}
				}
			}
		}
		Ok(())
	}
}

/// A shared set of labelled interval collections.
pub type SharedIntervalCollection = Replica<IntervalCollectionState>;

impl Replica<IntervalCollectionState> {
	/// Visible intervals under `label`.
	pub fn collection(&self, label: &str) -> Option<&BTreeMap<IntervalId, Interval>> {
		self.visible().collection(label)
	}

	/// Visible collection labels.
	pub fn labels(&self) -> impl Iterator<Item = &str> {
		self.visible().labels()
	}
}

/// Mutable access to a [`SharedIntervalCollection`] inside a session.
#[derive(Debug)]
pub struct IntervalsHandle<'a> {
	kernel: &'a mut SharedIntervalCollection,
	outbox: &'a mut Outbox,
}

impl<'a> IntervalsHandle<'a> {
	pub(crate) fn new(kernel: &'a mut SharedIntervalCollection, outbox: &'a mut Outbox) -> Self {
		Self { kernel, outbox }
	}

	/// Returns the collection under `label`, creating it if absent.
	pub fn get_interval_collection(self, label: impl Into<String>) -> Result<IntervalCollectionHandle<'a>, OpRejected> {
		let label = label.into();
		let mut handle = IntervalCollectionHandle {
			kernel: self.kernel,
			outbox: self.outbox,
			label,
		};
		if handle.kernel.collection(&handle.label).is_none() {
			let op = IntervalOp::CreateCollection {
				label: handle.label.clone(),
			};
			handle.submit(op)?;
		}
		Ok(handle)
	}

	/// Read access to the kernel.
	pub fn kernel(&self) -> &SharedIntervalCollection {
		self.kernel
	}
}

/// Mutable access to one labelled collection.
#[derive(Debug)]
pub struct IntervalCollectionHandle<'a> {
	kernel: &'a mut SharedIntervalCollection,
	outbox: &'a mut Outbox,
	label: String,
}

impl IntervalCollectionHandle<'_> {
	/// Collection label.
	pub fn label(&self) -> &str {
		&self.label
	}

	/// Adds an interval and returns its id.
	pub fn add(&mut self, start: u64, end: u64, props: BTreeMap<String, Value>) -> Result<IntervalId, OpRejected> {
		let interval = Interval {
			id: IntervalId::generate(),
			start,
			end,
			props,
		};
		let id = interval.id.clone();
		self.submit(IntervalOp::Add {
			label: self.label.clone(),
			interval,
		})?;
		Ok(id)
	}

	/// Removes an interval.
	pub fn delete(&mut self, id: &IntervalId) -> Result<(), OpRejected> {
		self.submit(IntervalOp::Delete {
			label: self.label.clone(),
			id: id.clone(),
		})
	}

	/// Moves an interval and merges `props`; a `null` value removes a property.
	pub fn change(
		&mut self,
		id: &IntervalId,
		start: Option<u64>,
		end: Option<u64>,
		props: BTreeMap<String, Value>,
	) -> Result<(), OpRejected> {
		self.submit(IntervalOp::Change {
			label: self.label.clone(),
			id: id.clone(),
			start,
			end,
			props,
		})
	}

	/// Visible interval by id.
	pub fn get(&self, id: &IntervalId) -> Option<&Interval> {
		self.kernel.collection(&self.label)?.get(id)
	}

	/// Visible intervals in id order.
	pub fn iter(&self) -> impl Iterator<Item = &Interval> {
		self.kernel.collection(&self.label).into_iter().flat_map(|c| c.values())
	}

	/// Visible intervals intersecting `[start, end]`.
	pub fn find_overlapping(&self, start: u64, end: u64) -> Vec<&Interval> {
		self.iter().filter(|i| i.start <= end && start <= i.end).collect()
	}

	fn submit(&mut self, op: IntervalOp) -> Result<(), OpRejected> {
		let client_seq = self.outbox.next_client_seq();
		self.kernel.submit_local(op.clone(), client_seq)?;
		self.outbox
			.push(client_seq, self.kernel.id().clone(), OpContents::Intervals(op));
		Ok(())
	}
}
