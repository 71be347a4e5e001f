//! The OpenWire command hierarchy as a single tagged union.
//!
//! The original C++ client expresses commands through deep virtual
//! inheritance (`DataStructure` → `BaseCommand` → concrete command). Per the
//! redesign notes this becomes one `enum Command` with a per-variant struct
//! and `type_tag`/marshal dispatch done by `match` instead of virtual calls.

mod connection;
mod consumer;
mod control;
mod message;
mod producer;
mod response;
mod session;
mod transaction;
mod wireformat;

pub use connection::ConnectionInfo;
pub use consumer::{ConsumerControl, ConsumerControlKind, ConsumerInfo, MessageDispatch, MessagePull};
pub use control::{
    BrokerInfo, ConnectionControl, DestinationInfo, DestinationOp, KeepAliveInfo, RemoveInfo,
    ShutdownInfo,
};
pub use message::{AckType, Message, MessageAck};
pub use producer::{ProducerAck, ProducerInfo};
pub use response::{ExceptionResponse, Response};
pub use session::SessionInfo;
pub use transaction::{TransactionInfo, TransactionOp};
pub use wireformat::{WireFormatInfo, MAGIC, MAX_VERSION};

/// Stable numeric type tags. Values are illustrative (per the glossary) but
/// fixed for the lifetime of this crate's wire compatibility.
pub mod tag {
    pub const MESSAGE: u8 = 0;
    pub const WIREFORMAT_INFO: u8 = 1;
    pub const BROKER_INFO: u8 = 2;
    pub const CONNECTION_INFO: u8 = 3;
    pub const SESSION_INFO: u8 = 4;
    pub const CONSUMER_INFO: u8 = 5;
    pub const PRODUCER_INFO: u8 = 6;
    pub const TRANSACTION_INFO: u8 = 7;
    pub const DESTINATION_INFO: u8 = 8;
    pub const REMOVE_INFO: u8 = 9;
    pub const KEEP_ALIVE_INFO: u8 = 10;
    pub const SHUTDOWN_INFO: u8 = 11;
    pub const CONNECTION_CONTROL: u8 = 12;
    pub const CONSUMER_CONTROL: u8 = 13;
    pub const RESPONSE: u8 = 30;
    pub const EXCEPTION_RESPONSE: u8 = 31;
    pub const MESSAGE_DISPATCH: u8 = 32;
    pub const MESSAGE_ACK: u8 = 33;
    pub const PRODUCER_ACK: u8 = 34;
    pub const MESSAGE_PULL: u8 = 35;

    pub const QUEUE: u8 = 100;
    pub const TOPIC: u8 = 101;
    pub const TEMP_QUEUE: u8 = 102;
    pub const TEMP_TOPIC: u8 = 103;

    pub const LOCAL_TRANSACTION_ID: u8 = 111;
    pub const MESSAGE_ID: u8 = 110;
    pub const XA_TRANSACTION_ID: u8 = 112;
    pub const CONNECTION_ID: u8 = 120;
    pub const SESSION_ID: u8 = 121;
    pub const PRODUCER_ID: u8 = 122;
    pub const CONSUMER_ID: u8 = 123;
}

/// The envelope every command carries: a 32-bit command id and whether the
/// sender requires a matching [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandHeader {
    pub command_id: u32,
    pub response_required: bool,
}

impl CommandHeader {
    #[must_use]
    pub const fn new(command_id: u32, response_required: bool) -> Self {
        Self { command_id, response_required }
    }

    #[must_use]
    pub const fn oneway(command_id: u32) -> Self { Self::new(command_id, false) }
}

/// The tagged union of every command this crate marshals.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    WireFormatInfo(WireFormatInfo),
    BrokerInfo(BrokerInfo),
    ConnectionInfo(ConnectionInfo),
    SessionInfo(SessionInfo),
    ConsumerInfo(ConsumerInfo),
    ProducerInfo(ProducerInfo),
    TransactionInfo(TransactionInfo),
    DestinationInfo(DestinationInfo),
    RemoveInfo(RemoveInfo),
    KeepAliveInfo(KeepAliveInfo),
    ShutdownInfo(ShutdownInfo),
    ConnectionControl(ConnectionControl),
    ConsumerControl(ConsumerControl),
    Message(Box<Message>),
    MessageAck(MessageAck),
    MessageDispatch(Box<MessageDispatch>),
    MessagePull(MessagePull),
    ProducerAck(ProducerAck),
    Response(Response),
    ExceptionResponse(ExceptionResponse),
}

impl Command {
    #[must_use]
    pub const fn type_tag(&self) -> u8 {
        match self {
            Self::Message(_) => tag::MESSAGE,
            Self::WireFormatInfo(_) => tag::WIREFORMAT_INFO,
            Self::BrokerInfo(_) => tag::BROKER_INFO,
            Self::ConnectionInfo(_) => tag::CONNECTION_INFO,
            Self::SessionInfo(_) => tag::SESSION_INFO,
            Self::ConsumerInfo(_) => tag::CONSUMER_INFO,
            Self::ProducerInfo(_) => tag::PRODUCER_INFO,
            Self::TransactionInfo(_) => tag::TRANSACTION_INFO,
            Self::DestinationInfo(_) => tag::DESTINATION_INFO,
            Self::RemoveInfo(_) => tag::REMOVE_INFO,
            Self::KeepAliveInfo(_) => tag::KEEP_ALIVE_INFO,
            Self::ShutdownInfo(_) => tag::SHUTDOWN_INFO,
            Self::ConnectionControl(_) => tag::CONNECTION_CONTROL,
            Self::ConsumerControl(_) => tag::CONSUMER_CONTROL,
            Self::Response(_) => tag::RESPONSE,
            Self::ExceptionResponse(_) => tag::EXCEPTION_RESPONSE,
            Self::MessageDispatch(_) => tag::MESSAGE_DISPATCH,
            Self::MessageAck(_) => tag::MESSAGE_ACK,
            Self::ProducerAck(_) => tag::PRODUCER_ACK,
            Self::MessagePull(_) => tag::MESSAGE_PULL,
        }
    }

    #[must_use]
    pub const fn header(&self) -> &CommandHeader {
        match self {
            Self::Message(c) => &c.header,
            Self::WireFormatInfo(c) => &c.header,
            Self::BrokerInfo(c) => &c.header,
            Self::ConnectionInfo(c) => &c.header,
            Self::SessionInfo(c) => &c.header,
            Self::ConsumerInfo(c) => &c.header,
            Self::ProducerInfo(c) => &c.header,
            Self::TransactionInfo(c) => &c.header,
            Self::DestinationInfo(c) => &c.header,
            Self::RemoveInfo(c) => &c.header,
            Self::KeepAliveInfo(c) => &c.header,
            Self::ShutdownInfo(c) => &c.header,
            Self::ConnectionControl(c) => &c.header,
            Self::ConsumerControl(c) => &c.header,
            Self::Response(c) => &c.header,
            Self::ExceptionResponse(c) => &c.header,
            Self::MessageDispatch(c) => &c.header,
            Self::MessageAck(c) => &c.header,
            Self::ProducerAck(c) => &c.header,
            Self::MessagePull(c) => &c.header,
        }
    }

    #[must_use]
    pub fn header_mut(&mut self) -> &mut CommandHeader {
        match self {
            Self::Message(c) => &mut c.header,
            Self::WireFormatInfo(c) => &mut c.header,
            Self::BrokerInfo(c) => &mut c.header,
            Self::ConnectionInfo(c) => &mut c.header,
            Self::SessionInfo(c) => &mut c.header,
            Self::ConsumerInfo(c) => &mut c.header,
            Self::ProducerInfo(c) => &mut c.header,
            Self::TransactionInfo(c) => &mut c.header,
            Self::DestinationInfo(c) => &mut c.header,
            Self::RemoveInfo(c) => &mut c.header,
            Self::KeepAliveInfo(c) => &mut c.header,
            Self::ShutdownInfo(c) => &mut c.header,
            Self::ConnectionControl(c) => &mut c.header,
            Self::ConsumerControl(c) => &mut c.header,
            Self::Response(c) => &mut c.header,
            Self::ExceptionResponse(c) => &mut c.header,
            Self::MessageDispatch(c) => &mut c.header,
            Self::MessageAck(c) => &mut c.header,
            Self::ProducerAck(c) => &mut c.header,
            Self::MessagePull(c) => &mut c.header,
        }
    }

    #[must_use]
    pub const fn command_id(&self) -> u32 { self.header().command_id }

    #[must_use]
    pub const fn response_required(&self) -> bool { self.header().response_required }

    /// `true` for commands the connection state tracker replays verbatim on
    /// reconnect (§4.F): `*Info` commands that rebuild session/producer/
    /// consumer state, plus `TransactionInfo`.
    #[must_use]
    pub const fn is_trackable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionInfo(_)
                | Self::SessionInfo(_)
                | Self::ProducerInfo(_)
                | Self::ConsumerInfo(_)
                | Self::TransactionInfo(_)
                | Self::DestinationInfo(_)
                | Self::RemoveInfo(_)
        )
    }
}
