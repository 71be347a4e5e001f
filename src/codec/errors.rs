//! Error types for the wire-format codec.

use thiserror::Error;

/// Errors raised while marshalling or unmarshalling OpenWire frames.
///
/// Per §7, every one of these is fatal to the transport that raised it; a
/// filter above the codec converts it into a transport-interrupted event.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("wire format magic mismatch")]
    BadMagic,
    #[error("unknown data structure type tag {0}")]
    UnknownTypeTag(u8),
    #[error("frame truncated")]
    Truncated,
    #[error("frame length {0} exceeds configured maximum {1}")]
    OversizedFrameBounded(u32, u32),
    #[error("frame exceeds configured maximum")]
    OversizedFrame,
    #[error("cache reference to an unassigned slot")]
    CacheMiss,
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("unsupported property type conversion")]
    UnsupportedConversion,
    #[error("unsupported or unnegotiated wire format version {0}")]
    UnsupportedVersion(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
