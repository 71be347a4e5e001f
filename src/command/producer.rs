//! `ProducerInfo` and the flow-control ack the broker sends back to it.

use crate::command::CommandHeader;
use crate::destination::Destination;
use crate::ids::ProducerId;

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerInfo {
    pub header: CommandHeader,
    pub producer_id: ProducerId,
    pub destination: Option<Destination>,
    pub dispatch_async: bool,
    pub window_size: u32,
}

impl Default for ProducerInfo {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            producer_id: ProducerId {
                connection_id: crate::ids::ConnectionId::new(String::new()),
                session_value: 0,
                value: 0,
            },
            destination: None,
            dispatch_async: false,
            window_size: 0,
        }
    }
}

/// Broker acknowledgement of producer-side flow control (producer window).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProducerAck {
    pub header: CommandHeader,
    pub producer_id: Option<ProducerId>,
    pub size: u32,
}
