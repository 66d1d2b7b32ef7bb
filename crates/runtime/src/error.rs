//! Error types for the synchronization core.

use tandem_protocol::{ObjectId, ObjectKind, SeqNum};
use thiserror::Error;

use crate::connection::ConnectionState;
use crate::kernel::OpRejected;

/// A sequence-number gap in the inbound stream.
///
/// Fatal: the client must discard local state and resynchronize from a fresh
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sequence gap: expected {expected}, received {received}")]
pub struct DesyncError {
	/// The sequence number the queue was waiting for.
	pub expected: SeqNum,
	/// The sequence number that arrived instead.
	pub received: SeqNum,
}

/// A kernel could not interpret a sequenced operation.
///
/// Recoverable: the operation is skipped for that kernel and the batch
/// continues.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed operation at {seq} for {}: {reason}", .address.as_ref().map_or("<none>", ObjectId::as_str))]
pub struct MalformedOperation {
	/// Target object, if the operation carried one.
	pub address: Option<ObjectId>,
	/// Sequence number of the offending operation.
	pub seq: SeqNum,
	/// Why the contents were rejected.
	pub reason: String,
}

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	/// No connection is established.
	#[error("not connected")]
	NotConnected,
	/// The connection dropped.
	#[error("connection lost: {0}")]
	ConnectionLost(String),
	/// The service refused the request.
	#[error("rejected by service: {0}")]
	Rejected(String),
}

/// Illegal connection state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
	/// The requested transition is not allowed from the current state.
	#[error("invalid connection transition {from:?} -> {to:?}")]
	InvalidTransition {
		/// Current state.
		from: ConnectionState,
		/// Requested state.
		to: ConnectionState,
	},
}

/// Failure reading or writing a snapshot blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage failure at {path}: {reason}")]
pub struct StorageError {
	/// Blob path.
	pub path: String,
	/// Underlying cause.
	pub reason: String,
}

/// Errors loading or producing persisted snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
	/// The stored layout version is not the one this build reads.
	#[error("snapshot format {found} for {type_name} is not supported (expected {expected})")]
	FormatVersion {
		/// Recorded kernel type.
		type_name: String,
		/// Recorded version.
		found: String,
		/// Version this build reads.
		expected: String,
	},
	/// The recorded type name is unknown.
	#[error("unknown shared object type: {0}")]
	UnknownType(String),
	/// The recorded type disagrees with the object being populated.
	#[error("snapshot for {address} has kind {found:?}, expected {expected:?}")]
	KindMismatch {
		/// Object address.
		address: ObjectId,
		/// Kind the caller expected.
		expected: ObjectKind,
		/// Kind found in storage.
		found: ObjectKind,
	},
	/// A required blob is missing.
	#[error("missing snapshot blob: {0}")]
	MissingBlob(String),
	/// Blob is not valid base64.
	#[error("invalid base64 in snapshot blob: {0}")]
	Base64(#[from] base64::DecodeError),
	/// Blob is not valid UTF-8.
	#[error("invalid utf-8 in snapshot blob: {0}")]
	Utf8(#[from] std::string::FromUtf8Error),
	/// Blob content does not decode.
	#[error("invalid snapshot json: {0}")]
	Json(#[from] serde_json::Error),
	/// The storage collaborator failed.
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Errors parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// TOML syntax or schema error.
	#[error("config parse error: {0}")]
	Parse(#[from] toml::de::Error),
	/// A value is out of range.
	#[error("invalid config value for {field}: {reason}")]
	Invalid {
		/// Offending field.
		field: &'static str,
		/// Why it was rejected.
		reason: String,
	},
}

/// Errors surfaced from [`crate::DocumentSession`] entry points.
#[derive(Debug, Error)]
pub enum SessionError {
	/// Inbound stream desynchronized.
	#[error(transparent)]
	Desync(#[from] DesyncError),
	/// Transport failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Illegal connection transition.
	#[error(transparent)]
	Connection(#[from] ConnectionError),
	/// Snapshot load or write failure.
	#[error(transparent)]
	Snapshot(#[from] SnapshotError),
	/// Invalid configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A local mutation was rejected by its kernel.
	#[error(transparent)]
	Rejected(#[from] OpRejected),
	/// An object exists under the address with a different kind.
	#[error("object {address} is a {found:?}, not a {expected:?}")]
	ObjectKind {
		/// Object address.
		address: ObjectId,
		/// Requested kind.
		expected: ObjectKind,
		/// Existing kind.
		found: ObjectKind,
	},
	/// The session hit a fatal error earlier and no longer accepts work.
	#[error("session is closed after a fatal error")]
	Closed,
}

impl SessionError {
	/// Returns true for errors that end the document session.
	pub const fn is_fatal(&self) -> bool {
		matches!(self, Self::Desync(_) | Self::Snapshot(_) | Self::Closed)
	}
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
