//! Connection-lifecycle and out-of-band control commands.

use crate::command::CommandHeader;
use crate::destination::Destination;
use crate::ids::ConnectionId;

/// Broker self-identification, exchanged once after wire format negotiation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrokerInfo {
    pub header: CommandHeader,
    pub broker_id: Option<String>,
    pub broker_url: Option<String>,
    pub peer_brokers: Vec<String>,
}

/// Broker-initiated request to fail over to a different URI, or to signal
/// that the connection is about to be torn down cleanly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionControl {
    pub header: CommandHeader,
    pub close: bool,
    pub exit: bool,
    pub fail_over_urls: Option<String>,
}

/// Creates or destroys a (typically temporary) destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationOp {
    #[default]
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationInfo {
    pub header: CommandHeader,
    pub connection_id: Option<ConnectionId>,
    pub destination: Destination,
    pub op: DestinationOp,
}

impl Default for DestinationInfo {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            connection_id: None,
            destination: Destination::Queue(String::new()),
            op: DestinationOp::default(),
        }
    }
}

/// Tears down a session/producer/consumer/connection by id. Which id field
/// is populated determines which kind of object is being removed; exactly
/// one of the scoped ids is set per the original `RemoveInfo` contract.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoveInfo {
    pub header: CommandHeader,
    pub connection_id: Option<ConnectionId>,
    pub session_value: Option<u64>,
    pub producer_value: Option<u64>,
    pub consumer_value: Option<u64>,
    pub last_delivered_sequence_id: Option<u64>,
}

/// Heartbeat command used by the inactivity monitor (§4.D).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeepAliveInfo {
    pub header: CommandHeader,
}

/// Graceful shutdown notice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShutdownInfo {
    pub header: CommandHeader,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_info_defaults_to_add() {
        assert_eq!(DestinationInfo::default().op, DestinationOp::Add);
    }
}
