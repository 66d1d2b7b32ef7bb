//! Snapshot persistence.
//!
//! Layout written by [`write_document`]:
//!
//! ```text
//! .document              {"sequenceNumber", "minimumSequenceNumber", "objects"}
//! <id>/.attributes       {"type", "snapshotFormatVersion", "packageVersion"}
//! <id>/header            base64 of the object's UTF-8 JSON summary
//! ```
//!
//! Snapshots hold acknowledged state only; pending local operations are not
//! persisted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tandem_protocol::{ChannelAttributes, ObjectId, ObjectKind, SeqNum};

use crate::error::{SnapshotError, StorageError};
use crate::kernel::EchoMatching;
use crate::registry::{ObjectRegistry, SharedObject};

/// Blob holding the document header.
pub const DOCUMENT_BLOB: &str = ".document";
/// Per-object attributes blob name.
pub const ATTRIBUTES_BLOB: &str = ".attributes";
/// Per-object content blob name.
pub const HEADER_BLOB: &str = "header";

/// Blob store the session persists snapshots to.
#[async_trait(?Send)]
pub trait SnapshotStorage {
	/// Reads a blob. `Ok(None)` when it does not exist.
	async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

	/// Writes a blob, replacing any previous content.
	async fn write_blob(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// In-memory blob store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
	blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryStorage {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Stored blob paths in order.
	pub fn paths(&self) -> impl Iterator<Item = &str> {
		self.blobs.keys().map(String::as_str)
	}

	/// Raw blob content.
	pub fn get(&self, path: &str) -> Option<&[u8]> {
		self.blobs.get(path).map(Vec::as_slice)
	}

	/// Stores raw blob content.
	pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
		self.blobs.insert(path.into(), bytes);
	}

	/// Blob count.
	pub fn len(&self) -> usize {
		self.blobs.len()
	}

	/// Returns true when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.blobs.is_empty()
	}
}

#[async_trait(?Send)]
impl SnapshotStorage for MemoryStorage {
	async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.blobs.get(path).cloned())
	}

	async fn write_blob(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
		self.blobs.insert(path.to_string(), bytes);
		Ok(())
	}
}

/// Document-level header blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHeader {
	/// Last sequence number folded into the snapshot.
	pub sequence_number: SeqNum,
	/// Minimum sequence number at that point.
	pub minimum_sequence_number: SeqNum,
	/// Objects present in the snapshot.
	pub objects: Vec<ObjectId>,
}

fn object_path(id: &ObjectId, blob: &str) -> String {
	format!("{id}/{blob}")
}

/// Encodes an object snapshot for the `header` blob.
pub fn encode_header(json: &str) -> Vec<u8> {
	STANDARD.encode(json.as_bytes()).into_bytes()
}

/// Decodes a `header` blob back to the object's JSON snapshot.
pub fn decode_header(bytes: &[u8]) -> Result<String, SnapshotError> {
	let raw = STANDARD.decode(bytes)?;
	Ok(String::from_utf8(raw)?)
}

/// Checks recorded attributes against what this build reads.
pub fn check_attributes(attributes: &ChannelAttributes) -> Result<ObjectKind, SnapshotError> {
	let kind = ObjectKind::from_type_name(&attributes.type_name)
		.ok_or_else(|| SnapshotError::UnknownType(attributes.type_name.clone()))?;
	let expected = kind.snapshot_format_version();
	if attributes.snapshot_format_version != expected {
		return Err(SnapshotError::FormatVersion {
			type_name: attributes.type_name.clone(),
			found: attributes.snapshot_format_version.clone(),
			expected: expected.to_string(),
		});
	}
	Ok(kind)
}

async fn read_required<S>(storage: &S, path: &str) -> Result<Vec<u8>, SnapshotError>
where
	S: SnapshotStorage + ?Sized,
{
	storage
		.read_blob(path)
		.await?
		.ok_or_else(|| SnapshotError::MissingBlob(path.to_string()))
}

/// Writes the document header and every object's acknowledged state.
/// Returns the number of blobs written.
pub async fn write_document<S>(
	storage: &mut S,
	header: &DocumentHeader,
	registry: &ObjectRegistry,
) -> Result<usize, SnapshotError>
where
	S: SnapshotStorage + ?Sized,
{
	let mut written = 0;
	for object in registry.iter() {
		let attributes = serde_json::to_vec(&object.kind().attributes())?;
		storage
			.write_blob(&object_path(object.id(), ATTRIBUTES_BLOB), attributes)
			.await?;
		storage
			.write_blob(&object_path(object.id(), HEADER_BLOB), encode_header(&object.summary()?))
			.await?;
		written += 2;
	}
	storage
		.write_blob(DOCUMENT_BLOB, serde_json::to_vec(header)?)
		.await?;
	written += 1;

	tracing::debug!(
		seq = header.sequence_number.0,
		objects = header.objects.len(),
		blobs = written,
		"snapshot.write"
	);
	Ok(written)
}

/// Reads a document written by [`write_document`].
pub async fn read_document<S>(
	storage: &S,
	matching: EchoMatching,
) -> Result<(DocumentHeader, ObjectRegistry), SnapshotError>
where
	S: SnapshotStorage + ?Sized,
{
	let header: DocumentHeader = serde_json::from_slice(&read_required(storage, DOCUMENT_BLOB).await?)?;
	let mut registry = ObjectRegistry::new(matching);

	for id in &header.objects {
		let attributes: ChannelAttributes =
			serde_json::from_slice(&read_required(storage, &object_path(id, ATTRIBUTES_BLOB)).await?)?;
		let kind = check_attributes(&attributes)?;
		let content = decode_header(&read_required(storage, &object_path(id, HEADER_BLOB)).await?)?;

		let mut object = SharedObject::new(kind, id.clone(), matching);
		object.populate(&content)?;
		registry.insert(object);
	}

	tracing::debug!(
		seq = header.sequence_number.0,
		objects = registry.len(),
		"snapshot.read"
	);
	Ok((header, registry))
}

#[cfg(test)]
mod tests;
