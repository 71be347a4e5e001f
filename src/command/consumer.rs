//! Consumer lifecycle and dispatch commands (§4.G).

use crate::command::message::Message;
use crate::command::CommandHeader;
use crate::destination::Destination;
use crate::ids::ConsumerId;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerInfo {
    pub header: CommandHeader,
    pub consumer_id: ConsumerId,
    pub destination: Option<Destination>,
    pub selector: Option<String>,
    pub no_local: bool,
    pub exclusive: bool,
    pub durable: bool,
    pub subscription_name: Option<String>,
    pub prefetch_size: u32,
    pub priority: i8,
    pub dispatch_async: bool,
}

impl Default for ConsumerInfo {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            consumer_id: ConsumerId {
                connection_id: crate::ids::ConnectionId::new(String::new()),
                session_value: 0,
                value: 0,
            },
            destination: None,
            selector: None,
            no_local: false,
            exclusive: false,
            durable: false,
            subscription_name: None,
            prefetch_size: 1000,
            priority: 0,
            dispatch_async: true,
        }
    }
}

/// Broker-to-client command to pause/resume/close a consumer without a full
/// `RemoveInfo` round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerControlKind {
    #[default]
    Start,
    Stop,
    Close,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsumerControl {
    pub header: CommandHeader,
    pub consumer_id: Option<ConsumerId>,
    pub kind: ConsumerControlKind,
    pub prefetch: Option<u32>,
}

/// A message pushed to a consumer, with the dispatch's redelivery count
/// mirrored onto the envelope so the session dispatcher doesn't need to
/// mutate the message in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDispatch {
    pub header: CommandHeader,
    pub consumer_id: Option<ConsumerId>,
    pub destination: Option<Destination>,
    pub message: Option<Message>,
    pub redelivery_counter: u32,
}

/// Pull-mode consumer request (prefetch 0): explicitly ask the broker for
/// the next message instead of relying on push dispatch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessagePull {
    pub header: CommandHeader,
    pub consumer_id: Option<ConsumerId>,
    pub destination: Option<Destination>,
    pub timeout_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefetch_matches_common_broker_default() {
        assert_eq!(ConsumerInfo::default().prefetch_size, 1000);
    }

    #[test]
    fn consumer_control_defaults_to_start() {
        assert_eq!(ConsumerControl::default().kind, ConsumerControlKind::Start);
    }
}
