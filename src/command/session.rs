//! `SessionInfo`: opens a session within a connection.

use crate::command::CommandHeader;
use crate::ids::SessionId;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub header: CommandHeader,
    pub session_id: SessionId,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            session_id: SessionId {
                connection_id: crate::ids::ConnectionId::new(String::new()),
                value: 0,
            },
        }
    }
}
