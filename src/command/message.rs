//! `Message` and the acknowledgement commands that reference it.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::command::CommandHeader;
use crate::destination::Destination;
use crate::ids::{ConsumerId, MessageId, ProducerId, TransactionId};
use crate::primitives::PrimitiveMap;

/// A message in flight. Covers the common `ActiveMQMessage` envelope; body
/// framing (text/bytes/map/stream/object) is left to the caller as an opaque
/// payload, since the wire distinction is carried entirely by `type_tag` on
/// [`crate::command::Command`] variants this crate does not need to open.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: CommandHeader,
    pub message_id: Option<MessageId>,
    pub producer_id: Option<ProducerId>,
    pub destination: Option<Destination>,
    pub reply_to: Option<Destination>,
    pub transaction_id: TransactionId,
    pub persistent: bool,
    pub priority: u8,
    pub timestamp: u64,
    pub expiration: u64,
    pub correlation_id: Option<String>,
    pub redelivery_counter: u32,
    pub compressed: bool,
    pub properties: PrimitiveMap,
    pub body: Vec<u8>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            message_id: None,
            producer_id: None,
            destination: None,
            reply_to: None,
            transaction_id: TransactionId::None,
            persistent: true,
            priority: 4,
            timestamp: now_millis(),
            expiration: 0,
            correlation_id: None,
            redelivery_counter: 0,
            compressed: false,
            properties: PrimitiveMap::new(),
            body: Vec::new(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// JMS acknowledgement modes a consumer is opened with (§4.G).
///
/// `Delivered` is not a JMS-level mode a consumer is opened with; it marks a
/// client-initiated pre-ack telling the broker a batch of messages has been
/// handed to the application but not yet confirmed consumed, so the broker
/// can redeliver them if the consumer dies before a real ack follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckType {
    #[default]
    Auto,
    Client,
    DupsOk,
    Individual,
    Transacted,
    Delivered,
}

/// An acknowledgement of one or more dispatched messages.
///
/// `first_message_id`/`last_message_id` delimit a contiguous acked range for
/// batched client acks; `message_count` records how many messages that range
/// covers so a poison-ack dead-letter decision doesn't need to recount.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageAck {
    pub header: CommandHeader,
    pub consumer_id: Option<ConsumerId>,
    pub transaction_id: TransactionId,
    pub destination: Option<Destination>,
    pub ack_type: AckType,
    pub first_message_id: Option<MessageId>,
    pub last_message_id: Option<MessageId>,
    pub message_count: u32,
    pub poison_ack: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConnectionId;

    #[test]
    fn message_default_has_no_identity_yet() {
        let msg = Message::default();
        assert!(msg.message_id.is_none());
        assert!(msg.persistent);
        assert_eq!(msg.priority, 4);
    }

    #[test]
    fn ack_default_is_auto_non_poison() {
        let ack = MessageAck::default();
        assert_eq!(ack.ack_type, AckType::Auto);
        assert!(!ack.poison_ack);
    }

    #[test]
    fn message_carries_its_producer_and_destination() {
        let producer = ProducerId {
            connection_id: ConnectionId::new("c1"),
            session_value: 1,
            value: 1,
        };
        let mut msg = Message {
            producer_id: Some(producer.clone()),
            destination: Some(Destination::Queue("orders".into())),
            ..Default::default()
        };
        msg.message_id = Some(MessageId::new(producer, 1));
        assert_eq!(msg.destination, Some(Destination::Queue("orders".into())));
    }
}
