//! Connection lifecycle for one document session.
//!
//! `Disconnected -> Connecting` on an explicit connect request,
//! `Connecting -> Connected` once the transport hands back a client id, and any
//! state `-> Disconnected` on transport failure. The client id is dropped on
//! disconnect; pending operations are owned by the kernels and never touched
//! here.

use tandem_protocol::ClientId;

use crate::error::ConnectionError;

/// Attachment state relative to the ordering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
	/// Not attached.
	#[default]
	Disconnected,
	/// Connect requested, waiting for the transport.
	Connecting,
	/// Attached with a client id.
	Connected,
}

impl ConnectionState {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
		}
	}
}

/// Tracks the connection state and current client id.
#[derive(Debug, Default, Clone)]
pub struct ConnectionStateMachine {
	state: ConnectionState,
	client_id: Option<ClientId>,
}

impl ConnectionStateMachine {
	/// Creates a machine in `Disconnected`.
	pub fn new() -> Self {
		Self::default()
	}

	/// Current state.
	pub const fn state(&self) -> ConnectionState {
		self.state
	}

	/// Client id of the live connection.
	pub fn client_id(&self) -> Option<&ClientId> {
		self.client_id.as_ref()
	}

	/// Returns true when connected.
	pub const fn is_connected(&self) -> bool {
		matches!(self.state, ConnectionState::Connected)
	}

	/// `Disconnected -> Connecting`.
	pub fn begin_connect(&mut self) -> Result<(), ConnectionError> {
		self.transition(ConnectionState::Disconnected, ConnectionState::Connecting)
	}

	/// `Connecting -> Connected`, recording the client id.
	pub fn established(&mut self, client_id: ClientId) -> Result<(), ConnectionError> {
		self.transition(ConnectionState::Connecting, ConnectionState::Connected)?;
		tracing::debug!(%client_id, "connection.established");
		self.client_id = Some(client_id);
		Ok(())
	}

	/// Any state `-> Disconnected`. Returns the discarded client id.
	pub fn disconnected(&mut self) -> Option<ClientId> {
		let previous = self.state;
		self.state = ConnectionState::Disconnected;
		let stale = self.client_id.take();
		if previous != ConnectionState::Disconnected {
			tracing::debug!(from = previous.as_str(), client_id = ?stale, "connection.disconnected");
		}
		stale
	}

	fn transition(&mut self, from: ConnectionState, to: ConnectionState) -> Result<(), ConnectionError> {
		if self.state != from {
			return Err(ConnectionError::InvalidTransition { from: self.state, to });
		}
		self.state = to;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_full_lifecycle() {
		let mut conn = ConnectionStateMachine::new();
		assert_eq!(conn.state(), ConnectionState::Disconnected);

		conn.begin_connect().unwrap();
		assert_eq!(conn.state(), ConnectionState::Connecting);
		assert!(conn.client_id().is_none());

		conn.established(ClientId::from("c1")).unwrap();
		assert!(conn.is_connected());
		assert_eq!(conn.client_id(), Some(&ClientId::from("c1")));

		assert_eq!(conn.disconnected(), Some(ClientId::from("c1")));
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		assert!(conn.client_id().is_none());
	}

	#[test]
	fn test_cannot_establish_without_connect_request() {
		let mut conn = ConnectionStateMachine::new();
		let err = conn.established(ClientId::from("c1")).unwrap_err();
		assert_eq!(
			err,
			ConnectionError::InvalidTransition {
				from: ConnectionState::Disconnected,
				to: ConnectionState::Connected,
			}
		);
	}

	#[test]
	fn test_double_connect_rejected() {
		let mut conn = ConnectionStateMachine::new();
		conn.begin_connect().unwrap();
		assert!(conn.begin_connect().is_err());
	}

	#[test]
	fn test_failure_while_connecting_returns_to_disconnected() {
		let mut conn = ConnectionStateMachine::new();
		conn.begin_connect().unwrap();
		assert_eq!(conn.disconnected(), None);
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		conn.begin_connect().unwrap();
	}
}
