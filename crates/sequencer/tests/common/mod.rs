//! Shared harness for multi-client tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tandem_protocol::{ClientId, ObjectId, SequencedOp};
use tandem_runtime::{DocumentSession, EventKind, SessionConfig, SessionEvent, TransportEvent};
use tandem_sequencer::{LoopbackSequencer, LoopbackTransport, pump};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A session wired to the loopback sequencer.
pub struct Client {
	pub session: DocumentSession<LoopbackTransport>,
	pub events: UnboundedReceiver<TransportEvent>,
}

impl Client {
	/// Creates a disconnected client.
	pub fn new(sequencer: &LoopbackSequencer) -> Self {
		let (transport, events) = sequencer.transport();
		let session = DocumentSession::new(SessionConfig::default(), transport).unwrap();
		Self { session, events }
	}

	/// Creates and connects a client.
	pub async fn connected(sequencer: &LoopbackSequencer) -> Self {
		let mut client = Self::new(sequencer);
		client.session.connect().await.unwrap();
		client
	}

	/// Current client id.
	pub fn id(&self) -> ClientId {
		self.session.client_id().cloned().unwrap()
	}

	/// Visible value of `key` in map `id`.
	pub fn map_value(&self, id: &str, key: &str) -> Option<Value> {
		self.session
			.registry()
			.map(&ObjectId::from(id))
			.and_then(|map| map.get(key))
			.cloned()
	}

	/// Acknowledged snapshot of every object, for convergence checks.
	pub fn snapshots(&self) -> Vec<(ObjectId, String)> {
		self.session
			.registry()
			.iter()
			.map(|object| (object.id().clone(), object.summary().unwrap()))
			.collect()
	}

	/// Records every event of `kind`.
	pub fn record(&mut self, kind: EventKind) -> Rc<RefCell<Vec<SessionEvent>>> {
		let log = Rc::new(RefCell::new(Vec::new()));
		let sink = Rc::clone(&log);
		self.session.on(kind, move |event| sink.borrow_mut().push(event.clone()));
		log
	}
}

/// Pumps every client until no events or submissions move.
pub async fn settle(clients: &mut [&mut Client]) {
	for _ in 0..64 {
		let mut quiet = true;
		for client in clients.iter_mut() {
			let report = pump(&mut client.session, &mut client.events).await.unwrap();
			quiet &= report.is_quiet();
		}
		if quiet {
			return;
		}
	}
	panic!("clients did not settle");
}

/// Sequenced operations submitted by `client`.
pub fn ops_from(sequencer: &LoopbackSequencer, client: &ClientId) -> Vec<SequencedOp> {
	sequencer
		.log()
		.into_iter()
		.filter(|op| op.client_id.as_ref() == Some(client))
		.collect()
}
