//! Transport-layer error type (§7).

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport already closed")]
    Closed,
    #[error("request timed out waiting for a response")]
    RequestTimeout,
    #[error("no broker URI in the pool could be reached")]
    ExhaustedUriPool,
    #[error("wire format negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("peer was inactive past the negotiated grace period")]
    InactivityTimeout,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
