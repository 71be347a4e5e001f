//! Transport abstraction and the filter chain built on top of it (§4.D).
//!
//! A `Transport` is the narrowest contract the rest of the crate depends on:
//! start/stop a background read loop that hands commands to a listener,
//! send oneway or request/response, and `close`. Every concrete transport
//! (mock, TCP, failover) and every filter (wireformat negotiator, inactivity
//! monitor, response correlator, connection state tracker) implements it,
//! so they compose as a linear decorator chain exactly the way the original
//! `TransportFilter` hierarchy does, but via trait objects instead of
//! virtual dispatch.

pub mod errors;
pub mod filter;
pub mod inactivity;
pub mod logging;
pub mod mock;
pub mod response_correlator;
pub mod uri;
pub mod wireformat_negotiator;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "failover")]
pub mod failover;

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Command;
pub use errors::TransportError;

/// Receives commands and lifecycle notifications from a transport's
/// background read loop. Implemented by the layer above (state tracker,
/// session dispatcher, or a test harness).
pub trait TransportListener: Send + Sync {
    fn on_command(&self, command: Command);
    fn on_exception(&self, error: TransportError);
    fn transport_interrupted(&self) {}
    fn transport_resumed(&self) {}
}

/// The contract every transport and transport filter implements.
///
/// Mirrors the original `Transport` interface: `oneway` posts without
/// waiting, `request` correlates a response, `narrow` lets a caller walk the
/// filter chain looking for a specific layer (e.g. the failover transport
/// asking its state tracker for the replay program).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start(&self) -> Result<(), TransportError>;
    async fn stop(&self) -> Result<(), TransportError>;

    async fn oneway(&self, command: Command) -> Result<(), TransportError>;

    /// Send `command` and wait for its correlated response.
    async fn request(&self, command: Command) -> Result<Command, TransportError>;

    fn set_listener(&self, listener: Arc<dyn TransportListener>);

    fn is_connected(&self) -> bool;

    /// Remote endpoint this transport is (or was) connected to, for logging.
    fn remote_address(&self) -> Option<String> { None }
}
