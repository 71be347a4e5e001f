//! OpenWire wire protocol, transport, and session core for an ActiveMQ client.
//!
//! This crate covers the pieces an application-level client builds on:
//! encoding/decoding OpenWire `Command`s, a pluggable async `Transport`
//! filter chain (TCP, wireformat negotiation, inactivity monitoring,
//! response correlation, failover), per-session consumer dispatch with
//! prefetch and redelivery, and local/XA transaction bookkeeping. It does
//! not implement a JMS-shaped API; callers assemble these pieces into
//! whatever surface they need.

pub mod codec;
pub mod command;
pub mod destination;
pub mod error;
pub mod ids;
pub mod primitives;
pub mod session;
pub mod tracker;
pub mod transaction_context;
pub mod transport;

pub use codec::{OpenWireFormat, WireFormatOptions};
pub use command::Command;
pub use error::ClientError;
pub use session::Session;
pub use tracker::ConnectionStateTracker;
pub use transaction_context::TransactionContext;
pub use transport::{Transport, TransportError, TransportListener};
