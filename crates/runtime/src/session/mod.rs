//! Per-document session.
//!
//! [`DocumentSession`] owns every piece of per-document state: the connection,
//! the inbound queue, the scheduler, the shared objects with their pending
//! operations, the outbox and the listeners. Nothing is global; two sessions
//! in one process share nothing.
//!
//! Local mutations made through [`DocumentSession::map`] and
//! [`DocumentSession::intervals`] apply immediately and are staged; they
//! reach the transport on the next [`DocumentSession::flush`] (which
//! [`DocumentSession::process`] and [`DocumentSession::run`] call).

use rustc_hash::FxHashSet;
use tandem_protocol::{ClientId, ObjectId, ObjectKind, SeqNum, SequencedOp};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::connection::{ConnectionState, ConnectionStateMachine};
use crate::error::{MalformedOperation, Result, SessionError};
use crate::events::{EventBus, EventKind, ListenerId, SessionEvent, SessionWarning};
use crate::inbound::{EnqueueOutcome, InboundQueue};
use crate::kernel::{IntervalsHandle, MapHandle};
use crate::outbox::Outbox;
use crate::registry::{ObjectRegistry, SharedObject};
use crate::resubmit::ResubmissionCoordinator;
use crate::scheduler::{OpHandler, TurnOutcome, TurnScheduler, TurnStats};
use crate::snapshot::{self, DocumentHeader, SnapshotStorage};
use crate::transport::{Transport, TransportEvent};

/// Document state the scheduler applies operations to.
#[derive(Debug)]
struct DocumentCore {
	registry: ObjectRegistry,
	/// Every client id this session has held; their echoes are local.
	client_ids: FxHashSet<ClientId>,
	last_processed: SeqNum,
	min_seq: SeqNum,
}

impl DocumentCore {
	fn new(registry: ObjectRegistry, seq: SeqNum, min_seq: SeqNum) -> Self {
		Self {
			registry,
			client_ids: FxHashSet::default(),
			last_processed: seq,
			min_seq,
		}
	}

	fn is_local(&self, op: &SequencedOp) -> bool {
		op.client_id.as_ref().is_some_and(|id| self.client_ids.contains(id))
	}
}

impl OpHandler for DocumentCore {
	fn process(&mut self, op: &SequencedOp) -> std::result::Result<(), MalformedOperation> {
		self.last_processed = op.seq;
		self.min_seq = self.min_seq.max(op.min_seq);
		let local = self.is_local(op);
		self.registry.dispatch(op, local)
	}
}

/// Summary of one [`DocumentSession::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
	/// Turns run.
	pub turns: usize,
	/// Turns that ended on the time budget.
	pub yields: usize,
	/// Why the last turn ended.
	pub outcome: TurnOutcome,
	/// Messages handed to the transport by the closing flush.
	pub sent: usize,
}

/// Client side of one collaborative document.
#[derive(Debug)]
pub struct DocumentSession<T: Transport> {
	config: SessionConfig,
	transport: T,
	connection: ConnectionStateMachine,
	queue: InboundQueue,
	scheduler: TurnScheduler,
	core: DocumentCore,
	outbox: Outbox,
	resubmitter: ResubmissionCoordinator,
	events: EventBus,
	closed: bool,
}

impl<T: Transport> DocumentSession<T> {
	/// Creates an empty, disconnected session.
	pub fn new(config: SessionConfig, transport: T) -> Result<Self> {
		Self::with_clock(config, transport, Box::new(SystemClock))
	}

	/// Creates an empty session reading turn time from `clock`.
	pub fn with_clock(config: SessionConfig, transport: T, clock: Box<dyn Clock>) -> Result<Self> {
		let registry = ObjectRegistry::new(config.echo_matching);
		Self::assemble(config, transport, clock, registry, SeqNum::ZERO, SeqNum::ZERO)
	}

	/// Creates a session from a stored snapshot.
	pub async fn load<S>(config: SessionConfig, transport: T, storage: &S) -> Result<Self>
	where
		S: SnapshotStorage + ?Sized,
	{
		Self::load_with_clock(config, transport, storage, Box::new(SystemClock)).await
	}

	/// [`Self::load`] with an explicit clock.
	pub async fn load_with_clock<S>(
		config: SessionConfig,
		transport: T,
		storage: &S,
		clock: Box<dyn Clock>,
	) -> Result<Self>
	where
		S: SnapshotStorage + ?Sized,
	{
		config.validate()?;
		let (header, registry) = snapshot::read_document(storage, config.echo_matching).await?;
		tracing::debug!(
			seq = header.sequence_number.0,
			objects = registry.len(),
			"session.load"
		);
		Self::assemble(
			config,
			transport,
			clock,
			registry,
			header.sequence_number,
			header.minimum_sequence_number,
		)
	}

	fn assemble(
		config: SessionConfig,
		transport: T,
		clock: Box<dyn Clock>,
		registry: ObjectRegistry,
		seq: SeqNum,
		min_seq: SeqNum,
	) -> Result<Self> {
		config.validate()?;
		let scheduler = TurnScheduler::new(config.budget(), config.implicit_batching, clock);
		let mut outbox = Outbox::new();
		outbox.set_ref_seq(seq);
		Ok(Self {
			config,
			transport,
			connection: ConnectionStateMachine::new(),
			queue: InboundQueue::starting_at(seq),
			scheduler,
			core: DocumentCore::new(registry, seq, min_seq),
			outbox,
			resubmitter: ResubmissionCoordinator::new(),
			events: EventBus::new(),
			closed: false,
		})
	}

	/// Registers a listener.
	pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&SessionEvent) + 'static) -> ListenerId {
		self.events.on(kind, handler)
	}

	/// Unregisters a listener.
	pub fn off(&mut self, id: ListenerId) -> bool {
		self.events.off(id)
	}

	/// Active configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// The transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Mutable access to the transport.
	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	/// Connection state.
	pub fn connection_state(&self) -> ConnectionState {
		self.connection.state()
	}

	/// Client id of the live connection.
	pub fn client_id(&self) -> Option<&ClientId> {
		self.connection.client_id()
	}

	/// Returns true after a fatal error.
	pub fn is_closed(&self) -> bool {
		self.closed
	}

	/// Last sequence number applied.
	pub fn last_processed_seq(&self) -> SeqNum {
		self.core.last_processed
	}

	/// Highest minimum sequence number observed.
	pub fn min_seq(&self) -> SeqNum {
		self.core.min_seq
	}

	/// Unacknowledged local operations across all objects.
	pub fn pending_count(&self) -> usize {
		self.core.registry.pending_len()
	}

	/// Operations waiting in the inbound queue.
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// Scheduler counters.
	pub fn stats(&self) -> TurnStats {
		self.scheduler.stats()
	}

	/// Read access to the shared objects.
	pub fn registry(&self) -> &ObjectRegistry {
		&self.core.registry
	}

	/// Opens the map at `id`, creating it if absent.
	pub fn map(&mut self, id: impl Into<ObjectId>) -> Result<MapHandle<'_>> {
		self.ensure_open()?;
		let id = id.into();
		match self.core.registry.get_or_create(&id, ObjectKind::Map)? {
			SharedObject::Map(map) => Ok(MapHandle::new(map, &mut self.outbox)),
			SharedObject::Intervals(_) => Err(SessionError::ObjectKind {
				address: id,
				expected: ObjectKind::Map,
				found: ObjectKind::IntervalCollection,
			}),
		}
	}

	/// Opens the interval collection at `id`, creating it if absent.
	pub fn intervals(&mut self, id: impl Into<ObjectId>) -> Result<IntervalsHandle<'_>> {
		self.ensure_open()?;
		let id = id.into();
		match self.core.registry.get_or_create(&id, ObjectKind::IntervalCollection)? {
			SharedObject::Intervals(kernel) => Ok(IntervalsHandle::new(kernel, &mut self.outbox)),
			SharedObject::Map(_) => Err(SessionError::ObjectKind {
				address: id,
				expected: ObjectKind::IntervalCollection,
				found: ObjectKind::Map,
			}),
		}
	}

	/// Runs `f` with every local mutation it makes grouped into one explicit
	/// batch on the wire.
	pub fn order_sequentially<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R> {
		self.ensure_open()?;
		self.outbox.begin_batch();
		let result = f(self);
		self.outbox.end_batch();
		Ok(result)
	}

	/// Connects, applies the catch-up, then resubmits pending operations.
	pub async fn connect(&mut self) -> Result<()> {
		self.ensure_open()?;
		self.connection.begin_connect()?;
		self.emit_connection();

		let last_seen = self.queue.last_enqueued();
		let connection = match self.transport.connect(last_seen).await {
			Ok(connection) => connection,
			Err(error) => {
				tracing::warn!(%error, "session.connect_failed");
				self.connection.disconnected();
				self.emit_connection();
				return Err(error.into());
			}
		};

		tracing::debug!(
			client_id = %connection.client_id,
			last_seen = last_seen.0,
			catch_up = connection.catch_up.len(),
			"session.connect"
		);
		self.core.client_ids.insert(connection.client_id.clone());
		for op in connection.catch_up {
			self.accept(op)?;
		}
		self.drain().await?;

		self.connection.established(connection.client_id)?;
		self.emit_connection();

		// anything staged before this point is already in the pending lists
		self.outbox.discard();
		let report = self.resubmitter.resubmit(&mut self.core.registry, &mut self.outbox);
		for (address, count) in report.objects {
			self.events.emit(&SessionEvent::Resubmitted { address, count });
		}
		self.flush().await?;
		Ok(())
	}

	/// Closes the connection. Pending operations are kept for the next connect.
	pub async fn disconnect(&mut self) {
		self.transport.disconnect().await;
		self.mark_disconnected("closed by client");
	}

	/// Feeds one transport event into the session.
	pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
		match event {
			TransportEvent::Op(op) => self.enqueue(op).map(|_| ()),
			TransportEvent::Disconnected { client_id, reason } => {
				if self.connection.client_id() == Some(&client_id) {
					self.mark_disconnected(&reason);
				} else {
					tracing::debug!(%client_id, %reason, "session.stale_disconnect");
				}
				Ok(())
			}
		}
	}

	/// Accepts a sequenced operation from the transport.
	///
	/// While disconnected nothing is accepted; the catch-up of the next
	/// connect covers the gap.
	pub fn enqueue(&mut self, op: SequencedOp) -> Result<EnqueueOutcome> {
		self.ensure_open()?;
		if self.connection.state() == ConnectionState::Disconnected {
			tracing::trace!(seq = op.seq.0, "session.ignored_while_disconnected");
			return Ok(EnqueueOutcome::Ignored);
		}
		self.accept(op)
	}

	fn accept(&mut self, op: SequencedOp) -> Result<EnqueueOutcome> {
		let seq = op.seq;
		match self.queue.enqueue(op) {
			Ok(EnqueueOutcome::Duplicate) => {
				self.events
					.emit(&SessionEvent::Warning(SessionWarning::Duplicate { seq }));
				Ok(EnqueueOutcome::Duplicate)
			}
			Ok(outcome) => Ok(outcome),
			Err(desync) => Err(self.fail(desync)),
		}
	}

	/// Stops applying queued operations.
	pub fn pause(&mut self) {
		self.queue.pause();
	}

	/// Resumes applying queued operations.
	pub fn resume(&mut self) {
		self.queue.resume();
	}

	/// Returns true while paused.
	pub fn is_paused(&self) -> bool {
		self.queue.is_paused()
	}

	/// Runs a single turn.
	pub fn run_turn(&mut self) -> Result<TurnOutcome> {
		self.ensure_open()?;
		let outcome = self
			.scheduler
			.run_turn(&mut self.queue, &mut self.core, &mut self.events);
		self.outbox.set_ref_seq(self.core.last_processed);
		Ok(outcome)
	}

	async fn drain(&mut self) -> Result<(usize, usize, TurnOutcome)> {
		let mut turns = 0;
		let mut yields = 0;
		loop {
			let outcome = self.run_turn()?;
			turns += 1;
			if outcome != TurnOutcome::Yielded {
				return Ok((turns, yields, outcome));
			}
			yields += 1;
			tokio::task::yield_now().await;
		}
	}

	/// Applies queued operations turn by turn, yielding to the runtime
	/// between turns, then flushes local changes.
	pub async fn process(&mut self) -> Result<ProcessReport> {
		let (turns, yields, outcome) = self.drain().await?;
		let sent = self.flush().await?;
		Ok(ProcessReport {
			turns,
			yields,
			outcome,
			sent,
		})
	}

	/// Sends staged local changes.
	///
	/// While disconnected the staged messages are dropped; the operations
	/// stay pending and are resubmitted on the next connect. A transport
	/// failure does the same and marks the session disconnected.
	pub async fn flush(&mut self) -> Result<usize> {
		self.ensure_open()?;
		if !self.connection.is_connected() {
			self.outbox.discard();
			return Ok(0);
		}
		let messages = self.outbox.take();
		if messages.is_empty() {
			return Ok(0);
		}

		match self.transport.submit(&messages).await {
			Ok(()) => {
				tracing::trace!(messages = messages.len(), "session.flush");
				Ok(messages.len())
			}
			Err(error) => {
				tracing::warn!(%error, messages = messages.len(), "session.submit_failed");
				self.events
					.emit(&SessionEvent::Warning(SessionWarning::SubmitFailed {
						error: error.clone(),
						messages: messages.len(),
					}));
				self.mark_disconnected(&error.to_string());
				Ok(0)
			}
		}
	}

	/// Drives the session from a stream of transport events until the stream
	/// ends. Every burst of events is followed by a [`Self::process`].
	pub async fn run(&mut self, events: &mut UnboundedReceiver<TransportEvent>) -> Result<()> {
		while let Some(event) = events.recv().await {
			self.handle_event(event)?;
			while let Ok(event) = events.try_recv() {
				self.handle_event(event)?;
			}
			self.process().await?;
		}
		Ok(())
	}

	/// Writes the acknowledged state of the document to `storage`.
	pub async fn summarize<S>(&self, storage: &mut S) -> Result<usize>
	where
		S: SnapshotStorage + ?Sized,
	{
		self.ensure_open()?;
		let header = DocumentHeader {
			sequence_number: self.core.last_processed,
			minimum_sequence_number: self.core.min_seq,
			objects: self.core.registry.iter().map(|object| object.id().clone()).collect(),
		};
		Ok(snapshot::write_document(storage, &header, &self.core.registry).await?)
	}

	fn mark_disconnected(&mut self, reason: &str) {
		if self.connection.state() == ConnectionState::Disconnected {
			return;
		}
		tracing::debug!(reason, pending = self.pending_count(), "session.disconnected");
		self.connection.disconnected();
		self.outbox.discard();
		self.emit_connection();
	}

	fn emit_connection(&mut self) {
		let event = SessionEvent::ConnectionChanged {
			state: self.connection.state(),
			client_id: self.connection.client_id().cloned(),
		};
		self.events.emit(&event);
	}

	fn ensure_open(&self) -> Result<()> {
		if self.closed {
			return Err(SessionError::Closed);
		}
		Ok(())
	}

	fn fail(&mut self, error: impl Into<SessionError>) -> SessionError {
		let error = error.into();
		if error.is_fatal() {
			tracing::error!(%error, "session.closed");
			self.closed = true;
		}
		error
	}
}
