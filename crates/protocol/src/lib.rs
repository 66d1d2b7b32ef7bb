//! Wire types for the tandem ordering protocol.
//!
//! Everything a client and the ordering service exchange lives here: sequence
//! numbers and identities, the inbound [`SequencedOp`], the outbound
//! [`DocumentMessage`], and the closed set of per-object operation payloads in
//! [`OpContents`]. All types serialize with camelCase field names.

#![warn(missing_docs)]

/// Shared-object type descriptors and snapshot attributes.
pub mod attributes;
/// Identifier newtypes.
pub mod ids;
/// Inbound and outbound message envelopes.
pub mod message;
/// Per-kernel operation payloads.
pub mod ops;

pub use attributes::{ChannelAttributes, ObjectKind, PACKAGE_VERSION};
pub use ids::{ClientId, ClientSeq, IntervalId, ObjectId, SeqNum};
pub use message::{BatchMarker, DocumentMessage, Envelope, MessageType, OpMetadata, SequencedOp};
pub use ops::{Interval, IntervalOp, MapOp, OpContents};

#[cfg(test)]
mod tests;
