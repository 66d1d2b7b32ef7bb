//! In-process ordering service.
//!
//! [`LoopbackSequencer`] plays the role of the remote sequencing service for
//! any number of [`DocumentSession`]s living on the same thread. It assigns
//! gapless sequence numbers, computes the minimum sequence number from each
//! client's reference sequence number, broadcasts every sequenced operation
//! to every connected client and keeps the full log for catch-up.
//!
//! Faults can be injected: [`LoopbackSequencer::disconnect`] drops a client
//! and [`LoopbackSequencer::drop_submissions`] silently loses everything a
//! client submits, as a connection dying with operations in flight would.

#![warn(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tandem_protocol::{ClientId, DocumentMessage, SeqNum, SequencedOp};
use tandem_runtime::{Connection, DocumentSession, SessionError, Transport, TransportError, TransportEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
struct ClientSlot {
	events: UnboundedSender<TransportEvent>,
	ref_seq: SeqNum,
	dropping: bool,
}

#[derive(Debug, Default)]
struct SequencerState {
	seq: SeqNum,
	min_seq: SeqNum,
	log: Vec<SequencedOp>,
	clients: FxHashMap<ClientId, ClientSlot>,
	next_client: u64,
}

impl SequencerState {
	fn register(&mut self, events: UnboundedSender<TransportEvent>) -> ClientId {
		self.next_client += 1;
		let client_id = ClientId(format!("client-{}", self.next_client));
		let slot = ClientSlot {
			events,
			ref_seq: self.seq,
			dropping: false,
		};
		self.clients.insert(client_id.clone(), slot);
		client_id
	}

	fn catch_up(&self, last_seen: SeqNum) -> Vec<SequencedOp> {
		self.log.iter().filter(|op| op.seq > last_seen).cloned().collect()
	}

	fn advance_min_seq(&mut self) -> SeqNum {
		let floor = self.clients.values().map(|slot| slot.ref_seq).min().unwrap_or(self.seq);
		self.min_seq = self.min_seq.max(floor);
		self.min_seq
	}

	fn broadcast(&mut self, op: SequencedOp) {
		for slot in self.clients.values() {
			// a closed receiver only means the session is gone
			let _ = slot.events.send(TransportEvent::Op(op.clone()));
		}
		self.log.push(op);
	}

	fn sequence(&mut self, client_id: &ClientId, message: DocumentMessage) -> SeqNum {
		if let Some(slot) = self.clients.get_mut(client_id) {
			slot.ref_seq = slot.ref_seq.max(message.ref_seq);
		}
		self.seq = self.seq.next();
		let min_seq = self.advance_min_seq();
		let op = SequencedOp::sequence(message, client_id.clone(), self.seq, min_seq);
		tracing::trace!(seq = op.seq.0, client_id = %client_id, client_seq = op.client_seq.0, "sequencer.op");
		self.broadcast(op);
		self.seq
	}
}

/// Shared ordering service handing out [`LoopbackTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct LoopbackSequencer {
	state: Rc<RefCell<SequencerState>>,
}

impl LoopbackSequencer {
	/// Creates a sequencer with an empty log.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a transport and the receiver its sessions read events from.
	/// The receiver stays valid across reconnects of that transport.
	pub fn transport(&self) -> (LoopbackTransport, UnboundedReceiver<TransportEvent>) {
		let (events, rx) = mpsc::unbounded_channel();
		let transport = LoopbackTransport {
			state: Rc::clone(&self.state),
			client_id: None,
			events,
		};
		(transport, rx)
	}

	/// Drops `client` and notifies it. Returns false if it was not connected.
	pub fn disconnect(&self, client_id: &ClientId) -> bool {
		let Some(slot) = self.state.borrow_mut().clients.remove(client_id) else {
			return false;
		};
		tracing::debug!(client_id = %client_id, "sequencer.disconnect");
		let _ = slot.events.send(TransportEvent::Disconnected {
			client_id: client_id.clone(),
			reason: "dropped by sequencer".into(),
		});
		true
	}

	/// While set, submissions from `client` are accepted and then lost.
	pub fn drop_submissions(&self, client_id: &ClientId, drop: bool) {
		if let Some(slot) = self.state.borrow_mut().clients.get_mut(client_id) {
			slot.dropping = drop;
		}
	}

	/// Sequences a service-originated no-op.
	pub fn sequence_noop(&self) -> SeqNum {
		let mut state = self.state.borrow_mut();
		state.seq = state.seq.next();
		let min_seq = state.advance_min_seq();
		let op = SequencedOp::noop(state.seq, min_seq);
		state.broadcast(op);
		state.seq
	}

	/// Every operation sequenced so far.
	pub fn log(&self) -> Vec<SequencedOp> {
		self.state.borrow().log.clone()
	}

	/// Last assigned sequence number.
	pub fn seq(&self) -> SeqNum {
		self.state.borrow().seq
	}

	/// Current minimum sequence number.
	pub fn min_seq(&self) -> SeqNum {
		self.state.borrow().min_seq
	}

	/// Connected clients, sorted.
	pub fn clients(&self) -> Vec<ClientId> {
		let mut clients: Vec<_> = self.state.borrow().clients.keys().cloned().collect();
		clients.sort();
		clients
	}
}

/// One client's connection to a [`LoopbackSequencer`].
#[derive(Debug)]
pub struct LoopbackTransport {
	state: Rc<RefCell<SequencerState>>,
	client_id: Option<ClientId>,
	events: UnboundedSender<TransportEvent>,
}

impl LoopbackTransport {
	/// Client id of the current connection.
	pub fn client_id(&self) -> Option<&ClientId> {
		self.client_id.as_ref()
	}
}

#[async_trait(?Send)]
impl Transport for LoopbackTransport {
	async fn connect(&mut self, last_seen: SeqNum) -> Result<Connection, TransportError> {
		let mut state = self.state.borrow_mut();
		if let Some(stale) = self.client_id.take() {
			state.clients.remove(&stale);
		}
		let client_id = state.register(self.events.clone());
		let catch_up = state.catch_up(last_seen);
		tracing::debug!(
			client_id = %client_id,
			last_seen = last_seen.0,
			catch_up = catch_up.len(),
			"sequencer.connect"
		);
		self.client_id = Some(client_id.clone());
		Ok(Connection { client_id, catch_up })
	}

	async fn submit(&mut self, messages: &[DocumentMessage]) -> Result<(), TransportError> {
		let client_id = self.client_id.as_ref().ok_or(TransportError::NotConnected)?;
		let mut state = self.state.borrow_mut();
		let Some(slot) = state.clients.get(client_id) else {
			return Err(TransportError::ConnectionLost(format!("{client_id} is no longer connected")));
		};
		if slot.dropping {
			tracing::debug!(client_id = %client_id, lost = messages.len(), "sequencer.drop");
			return Ok(());
		}
		for message in messages {
			state.sequence(client_id, message.clone());
		}
		Ok(())
	}

	async fn disconnect(&mut self) {
		if let Some(client_id) = self.client_id.take() {
			self.state.borrow_mut().clients.remove(&client_id);
		}
	}
}

/// What one [`pump`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
	/// Transport events handed to the session.
	pub events: usize,
	/// Messages the session submitted afterwards.
	pub sent: usize,
}

impl PumpReport {
	/// Returns true when nothing moved in either direction.
	pub fn is_quiet(&self) -> bool {
		self.events == 0 && self.sent == 0
	}
}

/// Hands every event already waiting on `events` to `session`, then
/// processes and flushes.
pub async fn pump<T: Transport>(
	session: &mut DocumentSession<T>,
	events: &mut UnboundedReceiver<TransportEvent>,
) -> Result<PumpReport, SessionError> {
	let mut handled = 0;
	while let Ok(event) = events.try_recv() {
		session.handle_event(event)?;
		handled += 1;
	}
	let report = session.process().await?;
	Ok(PumpReport {
		events: handled,
		sent: report.sent,
	})
}
