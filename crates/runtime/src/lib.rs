//! Client-side synchronization core for tandem documents.
//!
//! A [`DocumentSession`] receives the totally ordered operation stream from
//! the ordering service and applies it to the document's shared objects:
//!
//! * [`InboundQueue`]: buffers sequenced operations, rejects gaps, drops
//!   duplicates, supports pause/resume.
//! * [`TurnScheduler`]: groups operations into batches and turns, emitting
//!   balanced begin/end notifications.
//! * [`TimeBudget`]: the cooperative yield policy for runs of standalone
//!   operations.
//! * [`kernel`]: the shared-object contract plus the map and interval
//!   collection kernels, each tracking its own pending local operations.
//! * [`ResubmissionCoordinator`]: resends pending operations after a reconnect.
//!
//! Everything runs on one logical thread. The only suspension points are the
//! yield between implicit-batch turns and awaiting the transport.

#![warn(missing_docs)]

/// Time-budget turn splitting policy.
pub mod budget;
/// Clock abstraction used to measure turn time.
pub mod clock;
/// Session configuration.
pub mod config;
/// Connection state machine.
pub mod connection;
/// Error types.
pub mod error;
/// Session events and listener registry.
pub mod events;
/// Inbound operation queue.
pub mod inbound;
/// Shared-object kernels.
pub mod kernel;
/// Outbound message staging.
pub mod outbox;
/// Object registry.
pub mod registry;
/// Reconnect resubmission.
pub mod resubmit;
/// Turn scheduler.
pub mod scheduler;
/// Per-document session.
pub mod session;
/// Snapshot persistence.
pub mod snapshot;
/// Transport collaborator interface.
pub mod transport;

pub use budget::{DEFAULT_PROCESSING_BUDGET, TimeBudget, TurnDecision, TurnTimer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use connection::{ConnectionState, ConnectionStateMachine};
pub use error::{
	ConfigError, ConnectionError, DesyncError, MalformedOperation, Result, SessionError, SnapshotError,
	StorageError, TransportError,
};
pub use events::{EventBus, EventKind, ListenerId, SessionEvent, SessionWarning};
pub use inbound::{EnqueueOutcome, InboundQueue};
pub use kernel::{
	EchoMatching, IntervalCollectionHandle, IntervalsHandle, MapHandle, OpRejected, SharedIntervalCollection,
	SharedKernel, SharedMap,
};
pub use outbox::Outbox;
pub use registry::{ObjectRegistry, SharedObject};
pub use resubmit::{ResubmissionCoordinator, ResubmitReport};
pub use scheduler::{BatchInfo, BatchObserver, ImplicitBatching, OpHandler, TurnOutcome, TurnScheduler, TurnStats};
pub use session::{DocumentSession, ProcessReport};
pub use snapshot::{DocumentHeader, MemoryStorage, SnapshotStorage};
pub use transport::{Connection, Transport, TransportEvent};
