//! Hierarchical command identifiers.
//!
//! Every identifier is globally unique within one connection and has a
//! canonical string form (`ID:host-pid-ts-0:1:2`) used as a stable
//! cross-language key, including as the hash/eq basis for the wire-format
//! identifier cache (see [`crate::codec::cache`]).

use std::fmt;

/// Connection-scoped identifier, assigned by the client at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Identifier for a session within a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub connection_id: ConnectionId,
    pub value: u64,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.value)
    }
}

/// Identifier for a producer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId {
    pub connection_id: ConnectionId,
    pub session_value: u64,
    pub value: u64,
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_value, self.value)
    }
}

impl ProducerId {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId {
            connection_id: self.connection_id.clone(),
            value: self.session_value,
        }
    }
}

/// Identifier for a consumer within a session. Shares [`ProducerId`]'s shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId {
    pub connection_id: ConnectionId,
    pub session_value: u64,
    pub value: u64,
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_value, self.value)
    }
}

impl ConsumerId {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId {
            connection_id: self.connection_id.clone(),
            value: self.session_value,
        }
    }
}

/// Identifier for one message sent by one producer.
///
/// `broker_sequence_id` is filled in once the broker has accepted the
/// message; it does not participate in equality because a message keeps the
/// same logical identity before and after that happens.
#[derive(Debug, Clone)]
pub struct MessageId {
    pub producer_id: ProducerId,
    pub producer_sequence_id: u64,
    pub broker_sequence_id: Option<u64>,
}

impl MessageId {
    #[must_use]
    pub fn new(producer_id: ProducerId, producer_sequence_id: u64) -> Self {
        Self {
            producer_id,
            producer_sequence_id,
            broker_sequence_id: None,
        }
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.producer_id == other.producer_id
            && self.producer_sequence_id == other.producer_sequence_id
    }
}
impl Eq for MessageId {}

impl std::hash::Hash for MessageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.producer_id.hash(state);
        self.producer_sequence_id.hash(state);
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID:{}:{}", self.producer_id, self.producer_sequence_id)
    }
}

/// A local (non-XA) transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalTransactionId {
    pub connection_id: ConnectionId,
    pub value: u64,
}

impl fmt::Display for LocalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX:{}:{}", self.connection_id, self.value)
    }
}

/// An XA transaction identifier: format id plus global/branch qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XaTransactionId {
    pub format_id: i32,
    pub global_tx_id: Vec<u8>,
    pub branch_qualifier: Vec<u8>,
}

/// Tagged transaction identifier.
///
/// Four variants mirror the wire-level cases an OpenWire peer can observe:
/// no transaction, a local transaction, an XA transaction, and the abstract
/// "unspecified" case a malformed or future peer might send, which is kept
/// rather than rejected outright so `unmarshal` stays total over the type
/// tag space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TransactionId {
    #[default]
    None,
    Local(LocalTransactionId),
    Xa(XaTransactionId),
    Unspecified(u8),
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("TX:none"),
            Self::Local(id) => write!(f, "{id}"),
            Self::Xa(id) => write!(f, "TX:XA:{}", id.format_id),
            Self::Unspecified(tag) => write!(f, "TX:unspecified({tag})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn conn(name: &str) -> ConnectionId { ConnectionId::new(name) }

    #[test]
    fn message_id_equality_ignores_broker_sequence() {
        let producer = ProducerId { connection_id: conn("c1"), session_value: 1, value: 1 };
        let mut a = MessageId::new(producer.clone(), 7);
        let b = MessageId::new(producer, 7);
        a.broker_sequence_id = Some(42);
        assert_eq!(a, b);
    }

    #[rstest]
    #[case(1, 2, "c1:1:2")]
    #[case(9, 0, "c1:9:0")]
    fn producer_id_display(#[case] session: u64, #[case] value: u64, #[case] expected: &str) {
        let id = ProducerId { connection_id: conn("c1"), session_value: session, value };
        assert_eq!(id.to_string(), expected);
    }

    #[test]
    fn consumer_id_session_id_roundtrips_parent() {
        let consumer = ConsumerId { connection_id: conn("c1"), session_value: 3, value: 9 };
        let session = consumer.session_id();
        assert_eq!(session, SessionId { connection_id: conn("c1"), value: 3 });
    }
}
