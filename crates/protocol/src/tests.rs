use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn test_batch_flag_is_tristate_on_the_wire() {
	let begin: OpMetadata = serde_json::from_value(json!({ "batch": true })).unwrap();
	let end: OpMetadata = serde_json::from_value(json!({ "batch": false })).unwrap();
	let none: OpMetadata = serde_json::from_value(json!({})).unwrap();

	assert_eq!(begin.marker(), Some(BatchMarker::Begin));
	assert_eq!(end.marker(), Some(BatchMarker::End));
	assert_eq!(none.marker(), None);
	assert_eq!(serde_json::to_value(OpMetadata::NONE).unwrap(), json!({}));
}

#[test]
fn test_sequenced_op_uses_wire_field_names() {
	let op = SequencedOp {
		seq: SeqNum(4),
		min_seq: SeqNum(1),
		client_id: Some(ClientId::from("a")),
		client_seq: ClientSeq(2),
		ref_seq: SeqNum(3),
		kind: MessageType::Operation,
		contents: Some(Envelope {
			address: ObjectId::from("root"),
			contents: OpContents::Map(MapOp::Set {
				key: "k".into(),
				value: json!(1),
			}),
		}),
		metadata: OpMetadata::END,
	};

	let value = serde_json::to_value(&op).unwrap();
	assert_eq!(value["sequenceNumber"], json!(4));
	assert_eq!(value["minimumSequenceNumber"], json!(1));
	assert_eq!(value["clientSequenceNumber"], json!(2));
	assert_eq!(value["type"], json!("operation"));
	assert_eq!(value["metadata"], json!({ "batch": false }));
	assert_eq!(value["contents"]["contents"]["kind"], json!("map"));
	assert_eq!(value["contents"]["contents"]["op"]["type"], json!("set"));

	let back: SequencedOp = serde_json::from_value(value).unwrap();
	assert_eq!(back, op);
}

#[test]
fn test_noop_without_metadata_decodes() {
	let op: SequencedOp = serde_json::from_value(json!({
		"sequenceNumber": 7,
		"minimumSequenceNumber": 5,
		"type": "noOp",
	}))
	.unwrap();
	assert_eq!(op.seq, SeqNum(7));
	assert!(op.contents.is_none());
	assert!(op.client_id.is_none());
	assert_eq!(op.batch_marker(), None);
}

#[test]
fn test_object_kind_type_names_resolve() {
	for kind in ObjectKind::ALL {
		assert_eq!(ObjectKind::from_type_name(kind.type_name()), Some(kind));
		let attrs = kind.attributes();
		assert_eq!(attrs.snapshot_format_version, kind.snapshot_format_version());
	}
	assert_eq!(ObjectKind::from_type_name("https://example.com/unknown"), None);
}

#[test]
fn test_contents_report_their_kind() {
	let map = OpContents::Map(MapOp::Clear);
	let intervals = OpContents::Intervals(IntervalOp::CreateCollection { label: "x".into() });
	assert_eq!(map.object_kind(), ObjectKind::Map);
	assert_eq!(intervals.object_kind(), ObjectKind::IntervalCollection);
}
