//! `ConnectionInfo`: the first command sent on a new connection.

use crate::command::CommandHeader;
use crate::ids::ConnectionId;

/// Establishes (or, on replay, re-establishes) a connection's identity and
/// client-level JMS options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub header: CommandHeader,
    pub connection_id: ConnectionId,
    pub client_id: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub manage_destinations: bool,
    pub client_master: bool,
    pub failover_reconnect: bool,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            connection_id: ConnectionId::new(String::new()),
            client_id: None,
            user_name: None,
            password: None,
            manage_destinations: true,
            client_master: true,
            failover_reconnect: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_manages_destinations_and_is_master() {
        let info = ConnectionInfo::default();
        assert!(info.manage_destinations);
        assert!(info.client_master);
        assert!(!info.failover_reconnect);
    }
}
