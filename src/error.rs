//! Crate-level error type, unifying the lower layers' errors with the
//! client-level states callers actually need to branch on.

use thiserror::Error;

use crate::codec::CodecError;
use crate::session::SessionError;
use crate::transaction_context::TransactionError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected to a broker")]
    NotConnected,
    #[error("operation is not valid in the connection's current state")]
    IllegalState,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
