//! Transport collaborator interface.
//!
//! The session drives outbound traffic through [`Transport`]; inbound traffic
//! arrives as [`TransportEvent`]s, either pushed through a channel into
//! [`crate::DocumentSession::run`] or handed over one at a time with
//! [`crate::DocumentSession::handle_event`].

use async_trait::async_trait;
use tandem_protocol::{ClientId, DocumentMessage, SeqNum, SequencedOp};

use crate::error::TransportError;

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
	/// Identity assigned to this connection.
	pub client_id: ClientId,
	/// Operations sequenced after the `last_seen` passed to connect, in order.
	pub catch_up: Vec<SequencedOp>,
}

/// Inbound traffic from the ordering service.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	/// A sequenced operation.
	Op(SequencedOp),
	/// The connection dropped.
	Disconnected {
		/// Identity of the connection that dropped. Notices about an earlier
		/// connection are ignored.
		client_id: ClientId,
		/// Human-readable cause.
		reason: String,
	},
}

/// Connection to the ordering service.
#[async_trait(?Send)]
pub trait Transport {
	/// Opens a connection, returning the new client id and every operation
	/// sequenced after `last_seen`.
	async fn connect(&mut self, last_seen: SeqNum) -> Result<Connection, TransportError>;

	/// Submits messages for sequencing. Messages of one call form a unit:
	/// an explicit batch is never split across calls.
	async fn submit(&mut self, messages: &[DocumentMessage]) -> Result<(), TransportError>;

	/// Closes the connection.
	async fn disconnect(&mut self);
}
