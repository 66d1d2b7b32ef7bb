use proptest::prelude::*;
use serde_json::json;
use tandem_protocol::{ClientId, ClientSeq, DocumentMessage, Interval, IntervalOp, MapOp, OpContents, SequencedOp};

use super::*;
use crate::kernel::{ApplyContext, SharedKernel, SharedMap};

fn header(seq: u64, objects: &[&str]) -> DocumentHeader {
	DocumentHeader {
		sequence_number: SeqNum(seq),
		minimum_sequence_number: SeqNum(seq),
		objects: objects.iter().map(|o| ObjectId::from(*o)).collect(),
	}
}

fn sequenced(seq: u64, address: &str, contents: OpContents) -> SequencedOp {
	let message = DocumentMessage::operation(ClientSeq(seq), SeqNum::ZERO, address.into(), contents);
	SequencedOp::sequence(message, ClientId::from("remote"), SeqNum(seq), SeqNum::ZERO)
}

fn sample_registry() -> ObjectRegistry {
	let mut registry = ObjectRegistry::default();
	let ops = [
		OpContents::Map(MapOp::Set {
			key: "title".into(),
			value: json!("draft"),
		}),
		OpContents::Intervals(IntervalOp::CreateCollection { label: "comments".into() }),
		OpContents::Intervals(IntervalOp::Add {
			label: "comments".into(),
			interval: Interval {
				id: "c1".into(),
				start: 3,
				end: 9,
				props: [("author".to_string(), json!("ana"))].into(),
			},
		}),
	];
	for (idx, contents) in ops.into_iter().enumerate() {
		let address = if matches!(contents, OpContents::Map(_)) { "meta" } else { "notes" };
		registry.dispatch(&sequenced(idx as u64 + 1, address, contents), false).unwrap();
	}
	registry
}

#[test]
fn test_header_blob_is_base64_json() {
	let encoded = encode_header(r#"{"a":1}"#);
	assert_eq!(encoded, b"eyJhIjoxfQ==".to_vec());
	assert_eq!(decode_header(&encoded).unwrap(), r#"{"a":1}"#);
}

#[test]
fn test_invalid_header_blob_is_rejected() {
	assert!(matches!(decode_header(b"%%%"), Err(SnapshotError::Base64(_))));
	let not_utf8 = STANDARD.encode([0xff, 0xfe]).into_bytes();
	assert!(matches!(decode_header(&not_utf8), Err(SnapshotError::Utf8(_))));
}

#[test]
fn test_attribute_checks() {
	let mut attributes = ObjectKind::Map.attributes();
	assert_eq!(check_attributes(&attributes).unwrap(), ObjectKind::Map);

	attributes.snapshot_format_version = "9.9".into();
	assert!(matches!(check_attributes(&attributes), Err(SnapshotError::FormatVersion { .. })));

	attributes.type_name = "https://example.com/unknown".into();
	assert!(matches!(check_attributes(&attributes), Err(SnapshotError::UnknownType(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn test_document_round_trip() {
	let registry = sample_registry();
	let mut storage = MemoryStorage::new();
	let written = write_document(&mut storage, &header(3, &["meta", "notes"]), &registry)
		.await
		.unwrap();
	assert_eq!(written, 5);
	assert_eq!(
		storage.paths().collect::<Vec<_>>(),
		vec![".document", "meta/.attributes", "meta/header", "notes/.attributes", "notes/header"]
	);

	let (loaded_header, loaded) = read_document(&storage, EchoMatching::Identity).await.unwrap();
	assert_eq!(loaded_header, header(3, &["meta", "notes"]));
	for (a, b) in registry.iter().zip(loaded.iter()) {
		assert_eq!(a.snapshot().unwrap(), b.snapshot().unwrap());
	}
	assert_eq!(
		loaded.map(&"meta".into()).and_then(|m| m.get("title")),
		Some(&json!("draft"))
	);
}

#[tokio::test(flavor = "current_thread")]
async fn test_format_version_mismatch_fails_load() {
	let mut storage = MemoryStorage::new();
	write_document(&mut storage, &header(3, &["meta", "notes"]), &sample_registry())
		.await
		.unwrap();
	let mut attributes = ObjectKind::Map.attributes();
	attributes.snapshot_format_version = "0.0".into();
	storage.insert("meta/.attributes", serde_json::to_vec(&attributes).unwrap());

	let err = read_document(&storage, EchoMatching::Identity).await.unwrap_err();
	assert!(matches!(err, SnapshotError::FormatVersion { found, .. } if found == "0.0"));
}

#[tokio::test(flavor = "current_thread")]
async fn test_missing_blob_fails_load() {
	let mut storage = MemoryStorage::new();
	storage.insert(DOCUMENT_BLOB, serde_json::to_vec(&header(1, &["gone"])).unwrap());

	let err = read_document(&storage, EchoMatching::Identity).await.unwrap_err();
	assert!(matches!(err, SnapshotError::MissingBlob(path) if path == "gone/.attributes"));
}

fn arb_map_op() -> impl Strategy<Value = MapOp> {
	let key = prop::sample::select(vec!["a", "b", "c"]);
	prop_oneof![
		4 => (key.clone(), any::<i32>()).prop_map(|(k, v)| MapOp::Set { key: k.into(), value: json!(v) }),
		2 => key.prop_map(|k| MapOp::Delete { key: k.into() }),
		1 => Just(MapOp::Clear),
	]
}

#[derive(Debug, Clone)]
enum MapStep {
	Remote(MapOp),
	Local(MapOp),
}

fn arb_map_step() -> impl Strategy<Value = MapStep> {
	prop_oneof![arb_map_op().prop_map(MapStep::Remote), arb_map_op().prop_map(MapStep::Local)]
}

proptest! {
	/// Any remote history, snapshotted and reloaded, reproduces the same state.
	#[test]
	fn prop_map_snapshot_round_trip(ops in prop::collection::vec(arb_map_op(), 0..40)) {
		let mut registry = ObjectRegistry::default();
		registry.get_or_create(&"m".into(), ObjectKind::Map).unwrap();
		for (idx, op) in ops.into_iter().enumerate() {
			registry.dispatch(&sequenced(idx as u64 + 1, "m", OpContents::Map(op)), false).unwrap();
		}
		let source = registry.get(&"m".into()).unwrap();
		let snapshot = source.snapshot().unwrap();

		let mut copy = SharedObject::new(ObjectKind::Map, "m".into(), EchoMatching::Identity);
		copy.populate(&decode_header(&encode_header(&snapshot)).unwrap()).unwrap();
		prop_assert_eq!(copy.snapshot().unwrap(), snapshot);
	}

	/// Remote and local writes interleaved: the copy shows the same values,
	/// holds the same pending list, and resends the same operations.
	#[test]
	fn prop_map_round_trip_with_pending(steps in prop::collection::vec(arb_map_step(), 0..40)) {
		let mut source = SharedMap::new("m".into(), EchoMatching::Identity);
		let (mut seq, mut client_seq) = (0, 0);
		for step in steps {
			match step {
				MapStep::Remote(op) => {
					seq += 1;
					let ctx = ApplyContext { seq: SeqNum(seq), local: false, client_seq: ClientSeq(0) };
					source.apply(op, &ctx).unwrap();
				}
				MapStep::Local(op) => {
					client_seq += 1;
					source.submit_local(op, ClientSeq(client_seq)).unwrap();
				}
			}
		}

		let mut copy = SharedMap::new("m".into(), EchoMatching::Identity);
		copy.populate(&source.snapshot().unwrap()).unwrap();
		prop_assert_eq!(copy.visible(), source.visible());
		prop_assert_eq!(copy.sequenced(), source.sequenced());
		prop_assert_eq!(copy.pending().to_vec(), source.pending().to_vec());
		prop_assert_eq!(copy.snapshot().unwrap(), source.snapshot().unwrap());
		prop_assert_eq!(copy.on_reconnect(), source.on_reconnect());
	}
}
