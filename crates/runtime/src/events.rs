//! Session events and the listener registry.

use tandem_protocol::{ClientId, ObjectId, SeqNum};

use crate::connection::ConnectionState;
use crate::error::{MalformedOperation, TransportError};
use crate::scheduler::{BatchInfo, BatchObserver};

/// Event categories listeners can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// A batch is about to be applied.
	BatchBegin,
	/// A batch finished applying.
	BatchEnd,
	/// A recoverable fault.
	Warning,
	/// The connection state changed.
	ConnectionChanged,
	/// Pending operations were resent after a reconnect.
	Resubmitted,
}

/// Recoverable faults reported without interrupting the batch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionWarning {
	/// A kernel skipped an operation it could not interpret.
	Malformed(MalformedOperation),
	/// An operation arrived twice and was dropped.
	Duplicate {
		/// Repeated sequence number.
		seq: SeqNum,
	},
	/// A batch marker appeared where no batch could be open or closed.
	StrayBatchMarker {
		/// Sequence number carrying the marker.
		seq: SeqNum,
	},
	/// Submitting local operations failed; they stay pending until the next reconnect.
	SubmitFailed {
		/// Transport failure.
		error: TransportError,
		/// Messages that were not sent.
		messages: usize,
	},
}

/// Notification delivered to session listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
	/// Emitted before the first operation of a batch is applied.
	BatchBegin(BatchInfo),
	/// Emitted after the last operation of a batch is applied.
	BatchEnd(BatchInfo),
	/// Recoverable fault.
	Warning(SessionWarning),
	/// Connection state changed.
	ConnectionChanged {
		/// New state.
		state: ConnectionState,
		/// Client id while connected.
		client_id: Option<ClientId>,
	},
	/// An object resent its pending operations.
	Resubmitted {
		/// Object address.
		address: ObjectId,
		/// Messages sent.
		count: usize,
	},
}

impl SessionEvent {
	/// Category of this event.
	pub const fn kind(&self) -> EventKind {
		match self {
			Self::BatchBegin(_) => EventKind::BatchBegin,
			Self::BatchEnd(_) => EventKind::BatchEnd,
			Self::Warning(_) => EventKind::Warning,
			Self::ConnectionChanged { .. } => EventKind::ConnectionChanged,
			Self::Resubmitted { .. } => EventKind::Resubmitted,
		}
	}
}

/// Handle returned by [`EventBus::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&SessionEvent)>;

/// Synchronous listener registry. Handlers run on the session's thread in
/// registration order.
#[derive(Default)]
pub struct EventBus {
	next_id: u64,
	listeners: Vec<(ListenerId, EventKind, Handler)>,
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus").field("listeners", &self.listeners.len()).finish()
	}
}

impl EventBus {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` for events of `kind`.
	pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&SessionEvent) + 'static) -> ListenerId {
		self.next_id += 1;
		let id = ListenerId(self.next_id);
		self.listeners.push((id, kind, Box::new(handler)));
		id
	}

	/// Unregisters a listener. Returns false if it was not registered.
	pub fn off(&mut self, id: ListenerId) -> bool {
		let before = self.listeners.len();
		self.listeners.retain(|(listener, _, _)| *listener != id);
		self.listeners.len() != before
	}

	/// Delivers `event` to every listener registered for its kind.
	pub fn emit(&mut self, event: &SessionEvent) {
		let kind = event.kind();
		for (_, _, handler) in self.listeners.iter_mut().filter(|(_, k, _)| *k == kind) {
			handler(event);
		}
	}

	/// Number of registered listeners.
	pub fn len(&self) -> usize {
		self.listeners.len()
	}

	/// Returns true when no listener is registered.
	pub fn is_empty(&self) -> bool {
		self.listeners.is_empty()
	}
}

impl BatchObserver for EventBus {
	fn batch_begin(&mut self, info: &BatchInfo) {
		self.emit(&SessionEvent::BatchBegin(*info));
	}

	fn batch_end(&mut self, info: &BatchInfo) {
		self.emit(&SessionEvent::BatchEnd(*info));
	}

	fn warning(&mut self, warning: SessionWarning) {
		self.emit(&SessionEvent::Warning(warning));
	}
}
