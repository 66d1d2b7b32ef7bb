use std::fmt;

use serde::{Deserialize, Serialize};

/// Service-assigned position of an operation in the document's total order.
///
/// Sequence numbers are gapless per document and start at 1; `SeqNum(0)` is
/// the position before any operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNum(pub u64);

impl SeqNum {
	/// Position before the first sequenced operation.
	pub const ZERO: Self = Self(0);

	/// Returns the sequence number immediately after this one.
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0.wrapping_add(1))
	}
}

impl fmt::Display for SeqNum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Client-assigned identity of a locally submitted operation.
///
/// Monotonic for the lifetime of a session, across reconnects, so an echo can
/// be matched to its pending operation regardless of which connection sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSeq(pub u64);

/// Identity handed out by the ordering service for one connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ClientId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Address of a shared object within a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
	/// Returns the id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ObjectId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Stable identity of an interval inside an interval collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalId(pub String);

impl IntervalId {
	/// Generates a fresh random id.
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}
}

impl fmt::Display for IntervalId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for IntervalId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}
