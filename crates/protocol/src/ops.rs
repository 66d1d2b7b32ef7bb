use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::ObjectKind;
use crate::ids::IntervalId;

/// Closed set of operation payloads, one variant per kernel kind.
///
/// Adding a kernel means adding a variant here; every dispatch site matches
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "op", rename_all = "camelCase")]
pub enum OpContents {
	/// Operation on a shared map.
	Map(MapOp),
	/// Operation on a shared interval collection.
	Intervals(IntervalOp),
}

impl OpContents {
	/// Returns the kernel kind this payload targets.
	pub const fn object_kind(&self) -> ObjectKind {
		match self {
			Self::Map(_) => ObjectKind::Map,
			Self::Intervals(_) => ObjectKind::IntervalCollection,
		}
	}
}

/// Last-writer-wins map operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapOp {
	/// Sets `key` to `value`.
	Set {
		/// Map key.
		key: String,
		/// New value.
		value: Value,
	},
	/// Removes `key`.
	Delete {
		/// Map key.
		key: String,
	},
	/// Removes every key.
	Clear,
}

impl MapOp {
	/// Returns the key touched by this operation, `None` for [`MapOp::Clear`].
	pub fn key(&self) -> Option<&str> {
		match self {
			Self::Set { key, .. } | Self::Delete { key } => Some(key),
			Self::Clear => None,
		}
	}
}

/// A labelled span `[start, end]` with free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
	/// Stable identity.
	pub id: IntervalId,
	/// Inclusive start position.
	pub start: u64,
	/// Inclusive end position.
	pub end: u64,
	/// Arbitrary properties.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub props: BTreeMap<String, Value>,
}

/// Interval collection operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntervalOp {
	/// Creates an empty collection under `label` if it does not exist.
	CreateCollection {
		/// Collection label.
		label: String,
	},
	/// Inserts an interval, replacing one with the same id.
	Add {
		/// Collection label.
		label: String,
		/// Interval to insert.
		interval: Interval,
	},
	/// Removes an interval by id.
	Delete {
		/// Collection label.
		label: String,
		/// Interval to remove.
		id: IntervalId,
	},
	/// Moves an interval and merges properties; a `null` property removes it.
	Change {
		/// Collection label.
		label: String,
		/// Interval to change.
		id: IntervalId,
		/// New start, if moved.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		start: Option<u64>,
		/// New end, if moved.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		end: Option<u64>,
		/// Property updates.
		#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
		props: BTreeMap<String, Value>,
	},
}

impl IntervalOp {
	/// Returns the collection label this operation targets.
	pub fn label(&self) -> &str {
		match self {
			Self::CreateCollection { label }
			| Self::Add { label, .. }
			| Self::Delete { label, .. }
			| Self::Change { label, .. } => label,
		}
	}
}
