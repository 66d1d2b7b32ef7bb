//! Disconnect, resubmission and catch-up over the loopback sequencer.

mod common;

use std::collections::BTreeMap;

use common::{Client, init_tracing, ops_from, settle};
use pretty_assertions::assert_eq;
use serde_json::json;
use tandem_protocol::{ClientSeq, MapOp, OpContents, SeqNum};
use tandem_runtime::{
	ConnectionState, DocumentSession, EventKind, MemoryStorage, SessionConfig, SessionEvent,
};
use tandem_sequencer::{LoopbackSequencer, pump};

fn client_seqs(ops: &[tandem_protocol::SequencedOp]) -> Vec<ClientSeq> {
	ops.iter().map(|op| op.client_seq).collect()
}

#[tokio::test(flavor = "current_thread")]
async fn test_offline_interval_ops_resubmitted_in_order() {
	init_tracing();
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::connected(&sequencer).await;
	let mut b = Client::connected(&sequencer).await;
	let first_id = a.id();

	a.session.disconnect().await;
	{
		let mut notes = a.session.intervals("text").unwrap().get_interval_collection("notes").unwrap();
		let id = notes.add(1, 5, BTreeMap::new()).unwrap();
		notes.change(&id, Some(3), None, BTreeMap::new()).unwrap();
		notes.change(&id, None, Some(9), BTreeMap::new()).unwrap();
	}
	settle(&mut [&mut a, &mut b]).await;
	assert!(sequencer.log().is_empty(), "nothing leaves while offline");
	assert_eq!(a.session.pending_count(), 4);

	let resubmitted = a.record(EventKind::Resubmitted);
	a.session.connect().await.unwrap();
	assert_ne!(a.id(), first_id);

	let sent = ops_from(&sequencer, &a.id());
	assert_eq!(client_seqs(&sent), vec![ClientSeq(1), ClientSeq(2), ClientSeq(3), ClientSeq(4)]);
	assert_eq!(
		*resubmitted.borrow(),
		vec![SessionEvent::Resubmitted {
			address: "text".into(),
			count: 4,
		}]
	);

	settle(&mut [&mut a, &mut b]).await;
	assert_eq!(a.session.pending_count(), 0);
	assert_eq!(a.snapshots(), b.snapshots());
}

#[tokio::test(flavor = "current_thread")]
async fn test_lost_submissions_are_resubmitted_exactly_once() {
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::connected(&sequencer).await;
	let mut b = Client::connected(&sequencer).await;
	let doomed = a.id();

	sequencer.drop_submissions(&doomed, true);
	{
		let mut notes = a.session.intervals("text").unwrap().get_interval_collection("notes").unwrap();
		notes.add(0, 2, BTreeMap::new()).unwrap();
		notes.add(5, 8, BTreeMap::new()).unwrap();
	}
	settle(&mut [&mut a, &mut b]).await;
	assert!(sequencer.log().is_empty());
	assert_eq!(a.session.pending_count(), 3);

	assert!(sequencer.disconnect(&doomed));
	pump(&mut a.session, &mut a.events).await.unwrap();
	assert_eq!(a.session.connection_state(), ConnectionState::Disconnected);

	a.session.connect().await.unwrap();
	settle(&mut [&mut a, &mut b]).await;

	let sent = ops_from(&sequencer, &a.id());
	assert_eq!(client_seqs(&sent), vec![ClientSeq(1), ClientSeq(2), ClientSeq(3)]);
	assert_eq!(sequencer.log().len(), 3);
	assert_eq!(a.session.pending_count(), 0);
	assert_eq!(a.snapshots(), b.snapshots());
}

#[tokio::test(flavor = "current_thread")]
async fn test_late_disconnect_notice_leaves_new_connection_up() {
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::connected(&sequencer).await;
	let mut b = Client::connected(&sequencer).await;
	let first_id = a.id();

	assert!(sequencer.disconnect(&first_id));
	// a drops on its own before reading the sequencer's notice
	a.session.disconnect().await;
	a.session.connect().await.unwrap();
	assert_ne!(a.id(), first_id);

	pump(&mut a.session, &mut a.events).await.unwrap();
	assert_eq!(a.session.connection_state(), ConnectionState::Connected);

	a.session.map("doc").unwrap().set("k", 1).unwrap();
	settle(&mut [&mut a, &mut b]).await;
	assert_eq!(b.map_value("doc", "k"), Some(json!(1)));
}

#[tokio::test(flavor = "current_thread")]
async fn test_sequenced_but_unseen_ops_are_acknowledged_by_catch_up() {
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::connected(&sequencer).await;
	let mut b = Client::connected(&sequencer).await;

	a.session.map("doc").unwrap().set("k", 1).unwrap();
	a.session.flush().await.unwrap();
	assert_eq!(sequencer.seq(), SeqNum(1));

	// a leaves before reading its own echo
	a.session.disconnect().await;
	assert_eq!(a.session.pending_count(), 1);
	a.session.connect().await.unwrap();

	assert_eq!(a.session.pending_count(), 0);
	assert_eq!(a.session.last_processed_seq(), SeqNum(1));
	assert_eq!(sequencer.log().len(), 1, "the echo in the catch-up prevents a resend");

	settle(&mut [&mut a, &mut b]).await;
	assert_eq!(b.map_value("doc", "k"), Some(json!(1)));
}

#[tokio::test(flavor = "current_thread")]
async fn test_map_reconnect_sends_latest_value_per_key() {
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::new(&sequencer);
	let mut b = Client::connected(&sequencer).await;

	{
		let mut map = a.session.map("doc").unwrap();
		map.set("a", 1).unwrap();
		map.set("a", 2).unwrap();
		map.set("b", 1).unwrap();
		map.set("a", 3).unwrap();
	}
	a.session.connect().await.unwrap();

	let contents: Vec<_> = ops_from(&sequencer, &a.id())
		.into_iter()
		.filter_map(|op| op.contents.map(|envelope| envelope.contents))
		.collect();
	assert_eq!(
		contents,
		vec![
			OpContents::Map(MapOp::Set {
				key: "b".into(),
				value: json!(1)
			}),
			OpContents::Map(MapOp::Set {
				key: "a".into(),
				value: json!(3)
			}),
		]
	);

	settle(&mut [&mut a, &mut b]).await;
	assert_eq!(b.map_value("doc", "a"), Some(json!(3)));
	assert_eq!(a.session.pending_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn test_snapshot_load_then_catch_up_converges() {
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::connected(&sequencer).await;
	let mut b = Client::connected(&sequencer).await;

	a.session.map("doc").unwrap().set("title", "draft").unwrap();
	b.session.intervals("text").unwrap().get_interval_collection("notes").unwrap();
	settle(&mut [&mut a, &mut b]).await;

	let mut storage = MemoryStorage::new();
	a.session.summarize(&mut storage).await.unwrap();
	let snapshot_seq = a.session.last_processed_seq();

	b.session.map("doc").unwrap().set("title", "final").unwrap();
	sequencer.sequence_noop();
	settle(&mut [&mut a, &mut b]).await;

	let (transport, events) = sequencer.transport();
	let session = DocumentSession::load(SessionConfig::default(), transport, &storage)
		.await
		.unwrap();
	let mut c = Client { session, events };
	assert_eq!(c.session.last_processed_seq(), snapshot_seq);
	assert_eq!(c.map_value("doc", "title"), Some(json!("draft")));

	c.session.connect().await.unwrap();
	settle(&mut [&mut a, &mut b, &mut c]).await;

	assert_eq!(c.session.last_processed_seq(), sequencer.seq());
	assert_eq!(c.map_value("doc", "title"), Some(json!("final")));
	assert_eq!(c.snapshots(), b.snapshots());
}

#[tokio::test(flavor = "current_thread")]
async fn test_ops_after_disconnect_are_ignored_until_reconnect() {
	let sequencer = LoopbackSequencer::new();
	let mut a = Client::connected(&sequencer).await;
	let mut b = Client::connected(&sequencer).await;

	a.session.disconnect().await;
	b.session.map("doc").unwrap().set("k", 1).unwrap();
	settle(&mut [&mut a, &mut b]).await;
	assert_eq!(a.map_value("doc", "k"), None);

	a.session.connect().await.unwrap();
	assert_eq!(a.map_value("doc", "k"), Some(json!(1)));
}
