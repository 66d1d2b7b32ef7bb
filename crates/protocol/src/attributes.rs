use serde::{Deserialize, Serialize};

/// Version of this protocol crate, recorded in snapshot attributes.
pub const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Closed set of shared-object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
	/// Last-writer-wins label → value map.
	Map,
	/// Label → interval collection.
	IntervalCollection,
}

impl ObjectKind {
	/// All kinds, in declaration order.
	pub const ALL: [Self; 2] = [Self::Map, Self::IntervalCollection];

	/// Type name recorded in snapshot attributes.
	pub const fn type_name(self) -> &'static str {
		match self {
			Self::Map => "https://tandem.dev/types/map",
			Self::IntervalCollection => "https://tandem.dev/types/sharedIntervalCollection",
		}
	}

	/// Snapshot layout version this build reads and writes.
	pub const fn snapshot_format_version(self) -> &'static str {
		match self {
			Self::Map => "0.1",
			Self::IntervalCollection => "0.1",
		}
	}

	/// Resolves a recorded type name.
	pub fn from_type_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.type_name() == name)
	}

	/// Attributes written alongside a snapshot of this kind.
	pub fn attributes(self) -> ChannelAttributes {
		ChannelAttributes {
			type_name: self.type_name().to_string(),
			snapshot_format_version: self.snapshot_format_version().to_string(),
			package_version: PACKAGE_VERSION.to_string(),
		}
	}
}

/// Attribute pair stored next to every object snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAttributes {
	/// Kernel type name.
	#[serde(rename = "type")]
	pub type_name: String,
	/// Snapshot layout version.
	pub snapshot_format_version: String,
	/// Version of the package that wrote the snapshot.
	pub package_version: String,
}
